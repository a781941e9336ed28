//! Error types for generation calls

use http::StatusCode;
use thiserror::Error;

/// Arguments of one streamed tool call that could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to parse arguments of tool call {index} ({name}): {message}")]
pub struct ToolArgumentParseError {
    /// Accumulator slot of the call
    pub index: u32,
    /// Tool name, empty if never announced
    pub name: String,
    /// Raw argument text as received
    pub raw: String,
    /// Parser message
    pub message: String,
}

/// Errors that can occur during LLM operations
#[derive(Debug, Error)]
pub enum LlmError {
    /// Configuration is unusable for the selected provider
    #[error("configuration error: {0}")]
    Config(String),

    /// The request never produced an HTTP response
    #[error("transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// Upstream provider returned an error status
    #[error("upstream error ({status}): {message}")]
    Upstream { status: StatusCode, message: String },

    /// Error during streaming response
    #[error("streaming error: {0}")]
    Streaming(String),

    /// The caller cancelled the request
    #[error("request cancelled")]
    Cancelled,

    /// Request cannot be expressed in the vendor format
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Tool-call arguments from the vendor were malformed
    #[error(transparent)]
    ToolArgumentParse(#[from] ToolArgumentParseError),

    /// Unexpected internal error
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl LlmError {
    /// Transport failure carrying the underlying client error
    pub fn transport(source: reqwest::Error) -> Self {
        Self::Transport {
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Whether the transport client should retry after this error
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Upstream { status, .. } => *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error(),
            _ => false,
        }
    }

    /// Whether the error came from a timeout
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Transport { source, message } => {
                source.as_ref().is_some_and(reqwest::Error::is_timeout) || message.contains("timed out")
            }
            Self::Upstream { status, .. } => {
                *status == StatusCode::REQUEST_TIMEOUT || *status == StatusCode::GATEWAY_TIMEOUT
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upstream(status: StatusCode) -> LlmError {
        LlmError::Upstream {
            status,
            message: String::new(),
        }
    }

    #[test]
    fn retries_rate_limits_and_server_errors() {
        assert!(upstream(StatusCode::TOO_MANY_REQUESTS).is_retryable());
        assert!(upstream(StatusCode::BAD_GATEWAY).is_retryable());
        assert!(!upstream(StatusCode::BAD_REQUEST).is_retryable());
        assert!(!LlmError::Cancelled.is_retryable());
    }

    #[test]
    fn gateway_timeout_counts_as_timeout() {
        assert!(upstream(StatusCode::GATEWAY_TIMEOUT).is_timeout());
        assert!(!upstream(StatusCode::INTERNAL_SERVER_ERROR).is_timeout());
    }
}
