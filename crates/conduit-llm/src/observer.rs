//! One completion-or-failure event per generation call

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error_handler::ErrorKind;
use crate::types::UsageMetadata;

/// What a call was
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallInfo {
    /// Identifier generated for the call
    pub request_id: String,
    /// User prompt the call served
    pub prompt_id: Option<String>,
    /// Model sent to the backend
    pub model: String,
    /// Adapter that served the call
    pub adapter: &'static str,
    /// Whether the response was streamed
    pub streaming: bool,
}

/// Outcome of one call
#[derive(Debug, Clone, PartialEq)]
pub enum CallEvent {
    /// The backend produced a full response
    Completed {
        info: CallInfo,
        duration: Duration,
        usage: Option<UsageMetadata>,
    },
    /// The call ended with an error, cancellation, or was abandoned
    Failed {
        info: CallInfo,
        duration: Duration,
        kind: ErrorKind,
        message: String,
    },
}

impl CallEvent {
    /// Call the event is about
    pub const fn info(&self) -> &CallInfo {
        match self {
            Self::Completed { info, .. } | Self::Failed { info, .. } => info,
        }
    }
}

/// Receiver of call events (telemetry sink)
pub trait CallObserver: Send + Sync {
    /// Called exactly once per call
    fn on_call(&self, event: CallEvent);
}

/// Emits the single event for a call; reports abandonment on drop
pub(crate) struct CallGuard {
    observer: Option<Arc<dyn CallObserver>>,
    info: Option<CallInfo>,
    started: Instant,
}

impl CallGuard {
    pub(crate) fn start(observer: Option<Arc<dyn CallObserver>>, info: CallInfo) -> Self {
        Self {
            observer,
            info: Some(info),
            started: Instant::now(),
        }
    }

    pub(crate) fn completed(&mut self, usage: Option<UsageMetadata>) {
        let duration = self.started.elapsed();
        self.emit(|info| CallEvent::Completed { info, duration, usage });
    }

    pub(crate) fn failed(&mut self, kind: ErrorKind, message: String) {
        let duration = self.started.elapsed();
        self.emit(|info| CallEvent::Failed {
            info,
            duration,
            kind,
            message,
        });
    }

    fn emit(&mut self, event: impl FnOnce(CallInfo) -> CallEvent) {
        let Some(info) = self.info.take() else {
            return;
        };

        tracing::debug!(request_id = %info.request_id, "call finished");

        if let Some(observer) = &self.observer {
            observer.on_call(event(info));
        }
    }
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        if self.info.is_some() {
            self.failed(ErrorKind::Cancellation, "call abandoned before completion".to_owned());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<CallEvent>>);

    impl CallObserver for Recorder {
        fn on_call(&self, event: CallEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    fn info() -> CallInfo {
        CallInfo {
            request_id: "r1".to_owned(),
            prompt_id: None,
            model: "m".to_owned(),
            adapter: "openai",
            streaming: true,
        }
    }

    #[test]
    fn emits_once() {
        let recorder = Arc::new(Recorder::default());
        let mut guard = CallGuard::start(Some(recorder.clone()), info());
        guard.completed(None);
        guard.failed(ErrorKind::Other, "late".to_owned());
        drop(guard);

        let events = recorder.0.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], CallEvent::Completed { .. }));
    }

    #[test]
    fn drop_reports_abandonment() {
        let recorder = Arc::new(Recorder::default());
        drop(CallGuard::start(Some(recorder.clone()), info()));

        let events = recorder.0.lock().unwrap();
        assert!(matches!(
            &events[0],
            CallEvent::Failed { kind: ErrorKind::Cancellation, .. }
        ));
        assert_eq!(events[0].info().request_id, "r1");
    }
}
