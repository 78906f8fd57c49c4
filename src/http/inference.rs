//! The upstream behind the gateway.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

/// Body of `POST /api/generate`.
///
/// Missing fields deserialize as empty and are rejected by validation, so a client
/// gets a 400 naming the field rather than a generic decoding error.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct GenerateRequest {
    /// Base64-encoded source image.
    #[serde(alias = "imageData")]
    pub image_data: String,
    /// MIME type of `image_data`.
    #[serde(alias = "mimeType")]
    pub mime_type: String,
    /// Instruction for the model.
    pub prompt: String,
    /// Caller identity used for rate limiting; the peer IP stands in when absent.
    #[serde(alias = "userId")]
    pub user_id: Option<String>,
}

/// An image produced by the upstream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerateOutput {
    /// MIME type of `data`.
    pub mime_type: String,
    /// Base64-encoded image.
    pub data: String,
}

impl GenerateOutput {
    /// `data:` URL embedding the image.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

/// Failure reported by an [`Inference`] backend.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    /// Quota or rate limit of the upstream was hit.
    #[error("upstream rate limited: {0}")]
    RateLimited(String),
    /// Credentials were rejected.
    #[error("upstream rejected credentials: {0}")]
    Unauthorized(String),
    /// The request tripped a content-safety filter.
    #[error("blocked by safety filter: {0}")]
    SafetyBlocked(String),
    /// The upstream answered without any content.
    #[error("upstream returned no content")]
    NoContent,
    /// The upstream answered with text instead of an image.
    #[error("upstream returned text instead of an image")]
    TextOnly,
    /// Anything else.
    #[error("upstream error: {0}")]
    Other(String),
}

impl UpstreamError {
    /// Classifies an error known only by its message.
    ///
    /// ```
    /// use taskgate::http::UpstreamError;
    ///
    /// assert!(matches!(UpstreamError::classify("429 RESOURCE_EXHAUSTED"), UpstreamError::RateLimited(_)));
    /// assert!(matches!(UpstreamError::classify("API key not valid"), UpstreamError::Unauthorized(_)));
    /// assert!(matches!(UpstreamError::classify("connection reset"), UpstreamError::Other(_)));
    /// ```
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

        if has(&["429", "quota", "exhausted", "resource"]) {
            UpstreamError::RateLimited(message)
        } else if has(&["403", "api key", "permission"]) {
            UpstreamError::Unauthorized(message)
        } else if has(&["safety", "blocked"]) {
            UpstreamError::SafetyBlocked(message)
        } else {
            UpstreamError::Other(message)
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            UpstreamError::RateLimited(_) => "upstream_rate_limited",
            UpstreamError::Unauthorized(_) => "upstream_unauthorized",
            UpstreamError::SafetyBlocked(_) => "upstream_safety_blocked",
            UpstreamError::NoContent => "upstream_no_content",
            UpstreamError::TextOnly => "upstream_text_only",
            UpstreamError::Other(_) => "upstream_other",
        }
    }
}

/// Generates an image from an image and a prompt.
///
/// Implementations talk to the actual model API; the gateway only ever calls them
/// from inside a queue slot.
#[async_trait]
pub trait Inference: Send + Sync + 'static {
    /// Performs one generation.
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateOutput, UpstreamError>;
}
