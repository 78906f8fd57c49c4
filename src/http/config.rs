//! Gateway limits and rate-limit window.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::duration_ms;

/// Settings of the HTTP gateway.
///
/// Every field is optional when deserializing; durations are in milliseconds.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Longest accepted prompt, in characters.
    pub max_prompt_len: usize,
    /// Longest accepted base64 image payload, in characters.
    pub max_image_len: usize,
    /// Accepted image MIME types; anything else is treated as `fallback_mime`.
    pub mime_types: Vec<String>,
    /// MIME type used when the request names an unknown one.
    pub fallback_mime: String,
    /// Maximum accepted request body, in bytes.
    pub body_limit: usize,
    /// Requests one client may make per `rate_window`.
    pub rate_limit: usize,
    /// Sliding window of the per-client rate limit.
    #[serde(rename = "rate_window_ms", with = "duration_ms")]
    pub rate_window: Duration,
    /// How often idle clients are pruned from the rate limiter.
    #[serde(rename = "sweep_interval_ms", with = "duration_ms")]
    pub sweep_interval: Duration,
    /// Seconds suggested to clients refused because the queue is full.
    pub retry_after_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_prompt_len: 5_000,
            max_image_len: 35_000_000,
            mime_types: ["image/jpeg", "image/png", "image/webp"]
                .into_iter()
                .map(String::from)
                .collect(),
            fallback_mime: "image/jpeg".to_string(),
            body_limit: 36 * 1024 * 1024,
            rate_limit: 100,
            rate_window: Duration::from_secs(30 * 60),
            sweep_interval: Duration::from_secs(10 * 60),
            retry_after_secs: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json() {
        let cfg: GatewayConfig =
            serde_json::from_str(r#"{ "rate_limit": 5, "rate_window_ms": 1000 }"#).unwrap();
        assert_eq!(cfg.rate_limit, 5);
        assert_eq!(cfg.rate_window, Duration::from_secs(1));
        assert_eq!(cfg.max_prompt_len, 5_000);
        assert_eq!(cfg.fallback_mime, "image/jpeg");
    }
}
