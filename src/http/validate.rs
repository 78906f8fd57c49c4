//! Request validation.

use thiserror::Error;

use super::config::GatewayConfig;
use super::inference::GenerateRequest;

/// Why a generate request was refused before reaching the queue.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// `image_data` is empty.
    #[error("missing image data (image_data)")]
    MissingImage,
    /// `prompt` is empty.
    #[error("missing prompt")]
    MissingPrompt,
    /// `prompt` exceeds the configured length.
    #[error("prompt too long, limit is {max} characters")]
    PromptTooLong {
        /// Configured limit.
        max: usize,
    },
    /// `image_data` exceeds the configured length.
    #[error("image data too large, limit is {max} characters")]
    ImageTooLarge {
        /// Configured limit.
        max: usize,
    },
    /// The body is not a JSON generate request.
    #[error("malformed request body: {0}")]
    Malformed(String),
}

/// Checks `req` against the gateway limits and normalizes its MIME type.
pub(crate) fn validate(
    mut req: GenerateRequest,
    cfg: &GatewayConfig,
) -> Result<GenerateRequest, ValidationError> {
    if req.image_data.is_empty() {
        return Err(ValidationError::MissingImage);
    }
    if req.prompt.is_empty() {
        return Err(ValidationError::MissingPrompt);
    }
    if req.prompt.chars().count() > cfg.max_prompt_len {
        return Err(ValidationError::PromptTooLong {
            max: cfg.max_prompt_len,
        });
    }
    if req.image_data.len() > cfg.max_image_len {
        return Err(ValidationError::ImageTooLarge {
            max: cfg.max_image_len,
        });
    }
    if !cfg.mime_types.iter().any(|m| *m == req.mime_type) {
        req.mime_type = cfg.fallback_mime.clone();
    }
    Ok(req)
}
