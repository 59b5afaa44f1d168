//! Briefing generation.
//!
//! A [`BriefingGenerator`] turns a user's config into an HTML briefing.
//! The production implementation is [`GeminiGenerator`], which asks Gemini
//! to search the web and summarize the results.

mod gemini;
mod prompt;

pub use gemini::{GeminiGenerator, DEFAULT_GEMINI_BASE_URL, DEFAULT_GEMINI_MODEL};
pub use prompt::{build_prompt, PromptOptions, DEFAULT_HEADLINE_COUNT, DEFAULT_INDUSTRY, DEFAULT_LANGUAGE};

use async_trait::async_trait;
use thiserror::Error;

use crate::config::BriefingConfig;

/// Message reported when the service answered but produced no briefing.
pub const FALLBACK_MESSAGE: &str = "Failed to generate the news briefing.";

/// Errors from a generation attempt.
///
/// `Transport` and `Upstream` mean the call itself failed. `EmptyResponse`
/// and `InvalidResponse` mean the call succeeded but carried no usable
/// briefing; see [`GenerationError::is_content_failure`].
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Network, TLS, or timeout failure.
    #[error("generation request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("generation service returned {status}: {message}")]
    Upstream { status: u16, message: String },

    /// The response body was not the expected JSON document.
    #[error("{} (unreadable response: {})", FALLBACK_MESSAGE, .0)]
    InvalidResponse(String),

    /// The response had no candidate text.
    #[error("{}", FALLBACK_MESSAGE)]
    EmptyResponse,
}

impl GenerationError {
    /// True for failures where the service responded but the payload was
    /// unusable, as opposed to the request itself failing.
    #[must_use]
    pub fn is_content_failure(&self) -> bool {
        matches!(self, Self::EmptyResponse | Self::InvalidResponse(_))
    }
}

/// Produces the HTML briefing for one user.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BriefingGenerator: Send + Sync {
    /// Generate a briefing. One upstream request per call, no retries.
    async fn generate(&self, config: &BriefingConfig) -> Result<String, GenerationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_failures_are_distinguishable() {
        assert!(GenerationError::EmptyResponse.is_content_failure());
        assert!(GenerationError::InvalidResponse("eof".to_string()).is_content_failure());
        assert!(!GenerationError::Upstream {
            status: 503,
            message: "overloaded".to_string()
        }
        .is_content_failure());
    }

    #[test]
    fn test_empty_response_message_is_fallback() {
        assert_eq!(GenerationError::EmptyResponse.to_string(), FALLBACK_MESSAGE);
    }
}
