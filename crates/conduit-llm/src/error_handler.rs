//! Error classification, logging, and enrichment for pipeline failures

use std::sync::Arc;
use std::time::Duration;

use strum::{AsRefStr, Display};

use crate::error::LlmError;
use crate::provider::{Adapter, ProviderAdapter};
use crate::types::GenerateRequest;

/// Broad category of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// The caller cancelled the call
    Cancellation,
    /// No HTTP response was obtained
    Transport,
    /// The request or configuration was rejected before sending
    Validation,
    /// The vendor answered with an error status
    Upstream,
    Other,
}

/// Wraps every pipeline stage's failures
#[derive(Debug, Clone)]
pub struct ErrorHandler {
    adapter: Arc<ProviderAdapter>,
    timeout: Duration,
}

impl ErrorHandler {
    /// Create a handler consulting `adapter` for cancellation semantics
    pub const fn new(adapter: Arc<ProviderAdapter>, timeout: Duration) -> Self {
        Self { adapter, timeout }
    }

    /// Whether the failure is a cancellation the caller asked for
    ///
    /// Both must hold: the adapter classifies the error as a cancellation,
    /// and the request's own token has fired.
    pub fn should_suppress_error_logging(&self, error: &LlmError, request: &GenerateRequest) -> bool {
        self.adapter.is_cancellation(error) && request.is_cancelled()
    }

    /// Category of an error
    pub fn classify(&self, error: &LlmError) -> ErrorKind {
        if self.adapter.is_cancellation(error) {
            return ErrorKind::Cancellation;
        }

        match error {
            LlmError::Transport { .. } => ErrorKind::Transport,
            LlmError::Config(_) | LlmError::InvalidRequest(_) => ErrorKind::Validation,
            LlmError::Upstream { .. } => ErrorKind::Upstream,
            LlmError::Cancelled
            | LlmError::Streaming(_)
            | LlmError::ToolArgumentParse(_)
            | LlmError::Internal(_) => ErrorKind::Other,
        }
    }

    /// Log a failure (unless suppressed) and return it, enriched
    ///
    /// Timeouts get a hint appended; the original message and source
    /// are kept.
    pub fn handle(&self, error: LlmError, request: &GenerateRequest) -> LlmError {
        let kind = self.classify(&error);

        if self.should_suppress_error_logging(&error, request) {
            tracing::debug!(kind = %kind, "call cancelled by caller");
        } else {
            tracing::error!(
                kind = %kind,
                adapter = self.adapter.name(),
                prompt_id = request.prompt_id.as_deref().unwrap_or_default(),
                error = %error,
                "content generation failed"
            );
        }

        if error.is_timeout() {
            return self.with_timeout_hint(error);
        }
        error
    }

    fn with_timeout_hint(&self, error: LlmError) -> LlmError {
        let hint = format!(
            "request timed out after {}s; raise model.timeout or shorten the conversation",
            self.timeout.as_secs()
        );

        match error {
            LlmError::Transport { message, source } => LlmError::Transport {
                message: format!("{message} ({hint})"),
                source,
            },
            LlmError::Upstream { status, message } => LlmError::Upstream {
                status,
                message: format!("{message} ({hint})"),
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use conduit_config::{AuthType, ContentGeneratorConfig};
    use http::StatusCode;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::provider::AdapterOptions;

    fn handler(auth_type: AuthType) -> ErrorHandler {
        let adapter = ProviderAdapter::new(&ContentGeneratorConfig::new(auth_type), AdapterOptions::default()).unwrap();
        ErrorHandler::new(Arc::new(adapter), Duration::from_secs(90))
    }

    fn cancelled_request() -> GenerateRequest {
        let token = CancellationToken::new();
        token.cancel();
        GenerateRequest {
            cancellation: Some(token),
            ..GenerateRequest::default()
        }
    }

    #[test]
    fn suppresses_only_caller_cancellations() {
        let handler = handler(AuthType::OpenAi);

        assert!(handler.should_suppress_error_logging(&LlmError::Cancelled, &cancelled_request()));
        assert!(!handler.should_suppress_error_logging(&LlmError::Cancelled, &GenerateRequest::default()));
        assert!(!handler.should_suppress_error_logging(
            &LlmError::Streaming("reset".to_owned()),
            &cancelled_request()
        ));
    }

    #[test]
    fn gemini_cancelled_status_is_suppressed() {
        let handler = handler(AuthType::Gemini);
        let error = LlmError::Upstream {
            status: StatusCode::from_u16(499).unwrap(),
            message: "CANCELLED: aborted".to_owned(),
        };
        assert!(handler.should_suppress_error_logging(&error, &cancelled_request()));
        assert_eq!(handler.classify(&error), ErrorKind::Cancellation);
    }

    #[test]
    fn classifies_errors() {
        let handler = handler(AuthType::OpenAi);
        assert_eq!(handler.classify(&LlmError::Config("x".to_owned())), ErrorKind::Validation);
        assert_eq!(
            handler.classify(&LlmError::Upstream {
                status: StatusCode::BAD_REQUEST,
                message: String::new()
            }),
            ErrorKind::Upstream
        );
        assert_eq!(
            handler.classify(&LlmError::Transport {
                message: "refused".to_owned(),
                source: None
            }),
            ErrorKind::Transport
        );
        assert_eq!(handler.classify(&LlmError::Streaming("x".to_owned())), ErrorKind::Other);
    }

    #[test]
    fn timeout_gets_hint_and_keeps_message() {
        let handler = handler(AuthType::OpenAi);
        let error = handler.handle(
            LlmError::Transport {
                message: "operation timed out".to_owned(),
                source: None,
            },
            &GenerateRequest::default(),
        );

        let text = error.to_string();
        assert!(text.contains("operation timed out"));
        assert!(text.contains("90s"));
    }

    #[test]
    fn other_errors_pass_through() {
        let handler = handler(AuthType::OpenAi);
        let error = handler.handle(LlmError::InvalidRequest("bad".to_owned()), &GenerateRequest::default());
        assert_eq!(error.to_string(), "invalid request: bad");
    }
}
