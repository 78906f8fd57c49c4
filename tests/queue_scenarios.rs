use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use taskgate::{
    BoundedQueue, Event, EventKind, Progress, QueueConfig, QueueError, RuntimeError, Subscribe,
    SubmitOptions, Ticket, TimeoutAction,
};

fn queue(max_concurrent: usize, max_queue_size: usize) -> BoundedQueue {
    BoundedQueue::new(QueueConfig {
        max_concurrent,
        max_queue_size,
        timeout: Duration::ZERO,
        ..QueueConfig::default()
    })
}

/// Enqueues an operation that returns `value` once `gate` fires.
fn gated(q: &BoundedQueue, value: u32) -> (Ticket<u32, String>, oneshot::Sender<()>) {
    let (tx, rx) = oneshot::channel::<()>();
    let ticket = q
        .enqueue(
            move |_ctx: CancellationToken| async move {
                let _ = rx.await;
                Ok(value)
            },
            SubmitOptions::new(),
        )
        .unwrap();
    (ticket, tx)
}

fn recording() -> (SubmitOptions, Arc<Mutex<Vec<usize>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let opts = SubmitOptions::new().on_progress(move |p| sink.lock().unwrap().push(p.position));
    (opts, seen)
}

async fn settle_background() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn test_full_queue_rejects_without_running() {
    let q = queue(2, 1);
    let (a, ga) = gated(&q, 1);
    let (b, gb) = gated(&q, 2);
    let (c, gc) = gated(&q, 3);

    let ran = Arc::new(AtomicBool::new(false));
    let ran_d = Arc::clone(&ran);
    let d = q.enqueue(
        move |_ctx| async move {
            ran_d.store(true, Ordering::SeqCst);
            Ok::<u32, String>(4)
        },
        SubmitOptions::new(),
    );
    assert!(matches!(d, Err(QueueError::Full { capacity: 1 })));

    let s = q.stats();
    assert_eq!((s.running, s.queued, s.total_rejected, s.total_queued), (2, 1, 1, 3));

    for g in [ga, gb, gc] {
        g.send(()).unwrap();
    }
    assert_eq!(a.outcome().await.unwrap(), 1);
    assert_eq!(b.outcome().await.unwrap(), 2);
    assert_eq!(c.outcome().await.unwrap(), 3);
    assert!(!ran.load(Ordering::SeqCst));
    assert_eq!(q.stats().total_processed, 3);
}

#[tokio::test(start_paused = true)]
async fn test_full_queue_two_running_two_waiting() {
    let q = queue(2, 2);
    let mut admitted = Vec::new();
    for value in 0..4 {
        admitted.push(gated(&q, value));
    }

    let fifth = q.enqueue(|_ctx| async { Ok::<u32, String>(4) }, SubmitOptions::new());
    assert!(matches!(fifth, Err(QueueError::Full { capacity: 2 })));
    let s = q.stats();
    assert_eq!((s.running, s.queued, s.total_rejected), (2, 2, 1));

    for (value, (ticket, gate)) in admitted.into_iter().enumerate() {
        gate.send(()).unwrap();
        assert_eq!(ticket.outcome().await.unwrap(), value as u32);
    }
    assert_eq!(q.stats().total_processed, 4);
}

#[tokio::test]
async fn test_burst_within_capacity_all_succeed() {
    let q = queue(10, 200);
    let outcomes = futures::future::join_all(
        (0..10u32).map(|i| q.submit(move |_ctx| async move { Ok::<u32, String>(i) })),
    )
    .await;

    assert!(outcomes.iter().all(Result::is_ok));
    let s = q.stats();
    assert_eq!((s.total_processed, s.total_queued, s.total_rejected), (10, 10, 0));
    assert_eq!((s.running, s.queued), (0, 0));
}

type Observed = Option<(usize, usize, Result<Ticket<u32, String>, QueueError<String>>)>;

#[tokio::test(start_paused = true)]
async fn test_admitted_task_starts_before_anyone_observes_it() {
    let q = queue(2, 1);
    let observed: Arc<Mutex<Observed>> = Arc::new(Mutex::new(None));
    let reentry = Arc::new(Mutex::new(Some(q.clone())));

    let (observed_cb, reentry_cb) = (Arc::clone(&observed), Arc::clone(&reentry));
    let opts = SubmitOptions::new().on_progress(move |_| {
        let taken = reentry_cb.lock().unwrap().take();
        let Some(q) = taken else {
            return;
        };
        let s = q.stats();
        let second = q.enqueue(|_ctx| async { Ok::<u32, String>(2) }, SubmitOptions::new());
        *observed_cb.lock().unwrap() = Some((s.running, s.queued, second));
    });
    let first = q.enqueue(|_ctx| async { Ok::<u32, String>(1) }, opts).unwrap();

    let (running, queued, second) = observed.lock().unwrap().take().expect("fired on enqueue");
    assert_eq!((running, queued), (1, 0));
    let second = second.expect("a free slot admits the second task");

    assert_eq!(first.outcome().await.unwrap(), 1);
    assert_eq!(second.outcome().await.unwrap(), 2);
    assert_eq!(q.stats().total_rejected, 0);
}

#[tokio::test]
async fn test_panicking_progress_callback_is_contained() {
    let q = queue(1, 2);
    let (head, gate) = gated(&q, 0);

    let noisy = SubmitOptions::new().on_progress(|_| panic!("observer bug"));
    let waiter = q
        .enqueue(|_ctx| async { Ok::<u32, String>(1) }, noisy)
        .unwrap();
    let (after, g3) = gated(&q, 2);
    assert_eq!(after.position().map(|p| p.position), Some(2));

    gate.send(()).unwrap();
    g3.send(()).unwrap();
    assert_eq!(head.outcome().await.unwrap(), 0);
    assert_eq!(waiter.outcome().await.unwrap(), 1);
    assert_eq!(after.outcome().await.unwrap(), 2);

    let idle = queue(1, 1);
    let opts = SubmitOptions::new().on_progress(|_| panic!("observer bug"));
    let out = idle.submit_with(|_ctx| async { Ok::<u32, String>(7) }, opts).await;
    assert_eq!(out.unwrap(), 7);
    let s = idle.stats();
    assert_eq!((s.total_processed, s.running, s.queued), (1, 0, 0));
}

#[tokio::test(start_paused = true)]
async fn test_waiting_task_starts_after_head_settles() {
    let q = queue(1, 10);
    let a_done = Arc::new(AtomicBool::new(false));

    let (gate_tx, gate_rx) = oneshot::channel::<()>();
    let flag = Arc::clone(&a_done);
    let a = q
        .enqueue(
            move |_ctx| async move {
                let _ = gate_rx.await;
                flag.store(true, Ordering::SeqCst);
                Ok::<_, String>("a")
            },
            SubmitOptions::new(),
        )
        .unwrap();

    let (opts, seen) = recording();
    let flag = Arc::clone(&a_done);
    let b = q
        .enqueue(
            move |_ctx| async move {
                let order = if flag.load(Ordering::SeqCst) { "b after a" } else { "b early" };
                Ok::<_, String>(order)
            },
            opts,
        )
        .unwrap();

    assert_eq!(b.position().map(|p| (p.position, p.total, p.running)), Some((1, 1, 1)));
    assert_eq!(*seen.lock().unwrap(), vec![1]);

    gate_tx.send(()).unwrap();
    assert_eq!(a.outcome().await.unwrap(), "a");
    assert_eq!(b.outcome().await.unwrap(), "b after a");
}

#[tokio::test(start_paused = true)]
async fn test_timeout_frees_slot_and_counts_error() {
    let q = BoundedQueue::new(QueueConfig {
        max_concurrent: 1,
        timeout: Duration::from_millis(100),
        ..QueueConfig::default()
    });

    let started = tokio::time::Instant::now();
    let slow = q
        .enqueue(
            |_ctx| async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok::<u32, String>(1)
            },
            SubmitOptions::new(),
        )
        .unwrap();
    let next = q
        .enqueue(|_ctx| async { Ok::<u32, String>(2) }, SubmitOptions::new())
        .unwrap();

    match slow.outcome().await {
        Err(QueueError::Timeout { timeout }) => assert_eq!(timeout, Duration::from_millis(100)),
        other => panic!("expected timeout, got {other:?}"),
    }
    let waited = started.elapsed();
    assert!(waited >= Duration::from_millis(100), "settled early after {waited:?}");
    assert!(waited < Duration::from_secs(1), "held past the timeout: {waited:?}");
    let s = q.stats();
    assert_eq!((s.total_errors, s.total_timeouts), (1, 1));

    assert_eq!(next.outcome().await.unwrap(), 2);
    assert_eq!(q.stats().total_processed, 1);
    assert_eq!(q.stats().abandoned, 0);
}

#[tokio::test(start_paused = true)]
async fn test_detached_timeout_is_tracked_until_it_settles() {
    let q = BoundedQueue::new(QueueConfig {
        max_concurrent: 1,
        timeout: Duration::from_millis(100),
        timeout_action: TimeoutAction::Detach,
        ..QueueConfig::default()
    });
    let mut events = q.subscribe_events();
    let finished = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&finished);

    let out = q
        .submit(move |ctx| async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            flag.store(!ctx.is_cancelled(), Ordering::SeqCst);
            Ok::<(), String>(())
        })
        .await;
    assert!(matches!(out, Err(QueueError::Timeout { .. })));
    let s = q.stats();
    assert_eq!((s.running, s.abandoned), (0, 1));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(finished.load(Ordering::SeqCst));
    assert_eq!(q.stats().abandoned, 0);

    let mut kinds = Vec::new();
    while let Ok(ev) = events.try_recv() {
        kinds.push(ev.kind);
    }
    assert!(kinds.contains(&EventKind::TimeoutHit));
    assert_eq!(kinds.last(), Some(&EventKind::TaskAbandonedSettled));
}

#[tokio::test]
async fn test_operation_error_is_passed_through() {
    let q = queue(2, 2);
    let out = q.submit(|_ctx| async { Err::<(), _>("upstream said no".to_string()) }).await;
    match out {
        Err(QueueError::Failed(msg)) => assert_eq!(msg, "upstream said no"),
        other => panic!("unexpected {other:?}"),
    }
    let s = q.stats();
    assert_eq!((s.total_errors, s.total_processed, s.total_timeouts), (1, 0, 0));
}

#[tokio::test]
async fn test_panic_is_reported() {
    let q = queue(1, 1);
    let out = q
        .submit(|_ctx| async {
            if true {
                panic!("kaboom");
            }
            Ok::<(), String>(())
        })
        .await;
    match out {
        Err(QueueError::Panicked { message }) => assert!(message.contains("kaboom")),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(q.stats().total_errors, 1);
    assert_eq!(q.stats().running, 0);
}

#[tokio::test(start_paused = true)]
async fn test_every_started_task_is_accounted_once() {
    let q = BoundedQueue::new(QueueConfig {
        max_concurrent: 1,
        max_queue_size: 10,
        timeout: Duration::from_millis(100),
        ..QueueConfig::default()
    });
    let (head, gate) = gated(&q, 0);
    let (withdrawn, _gw) = gated(&q, 9);

    let mut tickets = Vec::new();
    for kind in ["ok", "ok", "err", "slow", "panic", "err", "ok"] {
        let ticket = q
            .enqueue(
                move |_ctx| async move {
                    match kind {
                        "err" => Err("refused".to_string()),
                        "slow" => {
                            tokio::time::sleep(Duration::from_secs(5)).await;
                            Ok(1)
                        }
                        "panic" => panic!("operation bug"),
                        _ => Ok(1u32),
                    }
                },
                SubmitOptions::new(),
            )
            .unwrap();
        tickets.push(ticket);
    }
    assert!(withdrawn.cancel());

    gate.send(()).unwrap();
    head.outcome().await.unwrap();
    for t in tickets {
        let _ = t.outcome().await;
    }

    let s = q.stats();
    assert_eq!(s.total_processed + s.total_errors, 8, "{s:?}");
    assert_eq!((s.total_processed, s.total_errors, s.total_timeouts), (4, 4, 1));
    assert_eq!((s.total_cancelled, s.total_queued, s.running, s.queued), (1, 9, 0, 0));
}

#[tokio::test(start_paused = true)]
async fn test_strict_fifo_start_order() {
    let q = queue(1, 10);
    let order = Arc::new(Mutex::new(Vec::new()));
    let (head, gate) = gated(&q, 0);

    let mut tickets = Vec::new();
    for id in 1..=5u32 {
        let order = Arc::clone(&order);
        tickets.push(
            q.enqueue(
                move |_ctx| async move {
                    order.lock().unwrap().push(id);
                    Ok::<u32, String>(id)
                },
                SubmitOptions::new(),
            )
            .unwrap(),
        );
    }
    gate.send(()).unwrap();
    head.outcome().await.unwrap();
    for t in tickets {
        t.outcome().await.unwrap();
    }
    assert_eq!(*order.lock().unwrap(), vec![1, 2, 3, 4, 5]);
}

#[tokio::test(start_paused = true)]
async fn test_positions_never_increase() {
    let q = queue(1, 10);
    let (head, gate) = gated(&q, 0);

    let mut waiting = Vec::new();
    for id in 1..=4u32 {
        let (opts, seen) = recording();
        let ticket = q
            .enqueue(
                move |_ctx| async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    Ok::<u32, String>(id)
                },
                opts,
            )
            .unwrap();
        waiting.push((ticket, seen));
    }

    gate.send(()).unwrap();
    head.outcome().await.unwrap();
    for (idx, (ticket, seen)) in waiting.into_iter().enumerate() {
        ticket.outcome().await.unwrap();
        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.first(), Some(&(idx + 1)), "task {idx} first rank");
        assert!(seen.windows(2).all(|w| w[1] <= w[0]), "task {idx} saw {seen:?}");
        assert_eq!(seen.last(), Some(&1), "task {idx} reached the head");
    }
}

#[tokio::test(start_paused = true)]
async fn test_cancel_waiting_ticket() {
    let q = queue(1, 10);
    let (head, gate) = gated(&q, 0);
    let (second, _g2) = gated(&q, 2);
    let (third, g3) = gated(&q, 3);

    assert!(!head.cancel(), "running task cannot be withdrawn");
    assert!(second.cancel());
    assert!(!second.cancel());
    assert_eq!(third.position().map(|p| (p.position, p.total)), Some((1, 1)));

    assert!(matches!(second.outcome().await, Err(QueueError::Cancelled)));
    gate.send(()).unwrap();
    g3.send(()).unwrap();
    assert_eq!(head.outcome().await.unwrap(), 0);
    assert_eq!(third.outcome().await.unwrap(), 3);

    let s = q.stats();
    assert_eq!((s.total_cancelled, s.total_processed, s.total_errors), (1, 2, 0));
}

#[tokio::test(start_paused = true)]
async fn test_dropped_ticket_is_skipped() {
    let q = queue(1, 10);
    let (head, gate) = gated(&q, 0);

    let ran = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&ran);
    let orphan = q
        .enqueue(
            move |_ctx| async move {
                flag.store(true, Ordering::SeqCst);
                Ok::<(), String>(())
            },
            SubmitOptions::new(),
        )
        .unwrap();
    drop(orphan);

    gate.send(()).unwrap();
    head.outcome().await.unwrap();
    settle_background().await;

    assert!(!ran.load(Ordering::SeqCst));
    let s = q.stats();
    assert_eq!((s.total_cancelled, s.queued, s.running), (1, 0, 0));
}

#[tokio::test(start_paused = true)]
async fn test_ticket_progress_transitions() {
    let q = queue(1, 10);
    let (head, gate) = gated(&q, 0);
    let (next, g2) = gated(&q, 1);

    assert_eq!(head.state(), Progress::Running);
    assert!(matches!(next.state(), Progress::Waiting(p) if p.position == 1));

    let mut rx = next.progress();
    gate.send(()).unwrap();
    head.outcome().await.unwrap();
    rx.wait_for(|p| *p == Progress::Running).await.unwrap();

    g2.send(()).unwrap();
    assert_eq!(next.outcome().await.unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_status_estimate() {
    let q = queue(1, 10);
    let (_head, _g) = gated(&q, 0);
    let (_b, _gb) = gated(&q, 1);
    let (_c, _gc) = gated(&q, 2);

    let st = q.status();
    assert!(!st.available);
    assert_eq!(st.position, 2);
    assert_eq!(st.estimated_wait_sec, 60);
}

#[tokio::test(start_paused = true)]
async fn test_graceful_shutdown_drains() {
    let q = queue(1, 10);
    let (head, gate) = gated(&q, 0);
    let (next, g2) = gated(&q, 1);

    let closer = q.clone();
    let shutdown = tokio::spawn(async move { closer.shutdown().await });
    settle_background().await;
    assert!(q.is_closed());
    assert!(matches!(
        q.submit(|_ctx| async { Ok::<(), String>(()) }).await,
        Err(QueueError::Closed)
    ));

    gate.send(()).unwrap();
    g2.send(()).unwrap();
    assert_eq!(head.outcome().await.unwrap(), 0);
    assert_eq!(next.outcome().await.unwrap(), 1);
    shutdown.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_grace_exceeded() {
    let q = BoundedQueue::new(QueueConfig {
        max_concurrent: 1,
        max_queue_size: 10,
        timeout: Duration::ZERO,
        grace: Duration::from_millis(50),
        ..QueueConfig::default()
    });
    let stuck = q
        .enqueue(
            |_ctx| std::future::pending::<Result<(), String>>(),
            SubmitOptions::new(),
        )
        .unwrap();
    let waiting = q
        .enqueue(|_ctx| async { Ok::<(), String>(()) }, SubmitOptions::new())
        .unwrap();

    match q.shutdown().await {
        Err(RuntimeError::GraceExceeded { running, waiting, .. }) => {
            assert_eq!((running, waiting), (1, 1));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(waiting.outcome().await, Err(QueueError::Closed)));
    assert!(matches!(stuck.outcome().await, Err(QueueError::Cancelled)));

    settle_background().await;
    let s = q.stats();
    assert_eq!((s.running, s.queued, s.total_cancelled), (0, 0, 1));
}

#[tokio::test]
async fn test_event_sequence_for_one_task() {
    let q = queue(1, 1);
    let mut rx = q.subscribe_events();
    q.submit(|_ctx| async { Ok::<(), String>(()) }).await.unwrap();

    let mut events: Vec<Event> = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        events.push(ev);
    }
    let kinds: Vec<_> = events.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![EventKind::TaskQueued, EventKind::TaskStarting, EventKind::TaskSucceeded]
    );
    assert!(events.iter().all(|e| e.task == events[0].task));
    assert!(events.windows(2).all(|w| w[0].seq < w[1].seq));
}

struct Recorder {
    tx: mpsc::UnboundedSender<EventKind>,
}

#[async_trait::async_trait]
impl Subscribe for Recorder {
    async fn on_event(&self, ev: &Event) {
        let _ = self.tx.send(ev.kind);
    }
}

#[tokio::test]
async fn test_subscribers_receive_events() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(Recorder { tx })];
    let q = BoundedQueue::builder(QueueConfig::default())
        .with_subscribers(subs)
        .build();

    q.submit(|_ctx| async { Ok::<(), String>(()) }).await.unwrap();

    let mut seen = Vec::new();
    while !seen.contains(&EventKind::TaskSucceeded) {
        let kind = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("subscriber received events")
            .expect("channel open");
        seen.push(kind);
    }
    assert_eq!(seen[0], EventKind::TaskQueued);
}
