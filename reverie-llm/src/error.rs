//! LLM error types.

use thiserror::Error;

/// Errors that can occur during LLM operations.
///
/// [`LlmError::is_retryable`] splits them into transient failures the
/// service retries and fatal ones it returns immediately.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The backend answered with a non-success status.
    #[error("LLM backend returned HTTP {status}: {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// Request timed out.
    #[error("LLM request timed out: {0}")]
    Timeout(String),

    /// The backend could not be reached.
    #[error("LLM provider unavailable: {0}")]
    Unavailable(String),

    /// The request could not be built or sent for a non-transient reason.
    #[error("LLM request failed: {0}")]
    RequestFailed(String),

    /// LLM response did not have the expected shape.
    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    /// No backend is configured.
    #[error("No LLM provider configured")]
    NoProvider,

    /// Configuration error.
    #[error("LLM configuration error: {0}")]
    ConfigError(String),

    /// All retry attempts exhausted.
    #[error("All LLM retry attempts exhausted after {attempts} tries: {last_error}")]
    RetriesExhausted {
        /// Attempts made, including the first.
        attempts: u32,
        /// Message of the final failure.
        last_error: String,
    },
}

impl LlmError {
    /// Rate limiting, server errors, timeouts and unreachable backends.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            Self::Timeout(_) | Self::Unavailable(_) => true,
            Self::RequestFailed(_)
            | Self::ParseError(_)
            | Self::NoProvider
            | Self::ConfigError(_)
            | Self::RetriesExhausted { .. } => false,
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout(err.to_string())
        } else if err.is_connect() {
            LlmError::Unavailable(err.to_string())
        } else if err.is_decode() {
            LlmError::ParseError(err.to_string())
        } else {
            LlmError::RequestFailed(err.to_string())
        }
    }
}

impl From<LlmError> for reverie_core::ReverieError {
    fn from(err: LlmError) -> Self {
        Self::Cognition(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_split() {
        let http = |status| LlmError::Http {
            status,
            body: String::new(),
        };
        assert!(http(429).is_retryable());
        assert!(http(503).is_retryable());
        assert!(!http(400).is_retryable());
        assert!(!http(401).is_retryable());
        assert!(LlmError::Timeout("slow".into()).is_retryable());
        assert!(!LlmError::ParseError("bad".into()).is_retryable());
        assert!(!LlmError::NoProvider.is_retryable());
        assert!(
            !LlmError::RetriesExhausted {
                attempts: 4,
                last_error: "x".into()
            }
            .is_retryable()
        );
    }
}
