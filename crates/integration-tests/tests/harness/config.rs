//! Programmatic pipeline construction for integration tests

use std::sync::Arc;
use std::time::Duration;

use conduit_config::{AuthType, ContentGeneratorConfig, ProvenanceMap, ResolvedConfig};
use conduit_llm::{
    Adapter, CallEvent, CallObserver, ContentGenerationPipeline, CredentialsProvider, PipelineOptions,
};
use secrecy::SecretString;

/// Builder for pipelines pointed at a mock backend
pub struct ConfigBuilder {
    config: ContentGeneratorConfig,
    options: PipelineOptions,
    observer: Option<Arc<dyn CallObserver>>,
}

impl ConfigBuilder {
    /// Start from an auth type and base URL, with a test key and model
    pub fn new(auth_type: AuthType, base_url: &str) -> Self {
        let mut config = ContentGeneratorConfig::new(auth_type);
        config.model = "mock-model-1".to_owned();
        config.api_key = Some(SecretString::from("test-key"));
        config.base_url = Some(base_url.parse().expect("valid URL"));
        config.timeout = Duration::from_secs(10);

        Self {
            config,
            options: PipelineOptions::default(),
            observer: None,
        }
    }

    /// Set the configured model
    pub fn with_model(mut self, model: &str) -> Self {
        self.config.model = model.to_owned();
        self
    }

    /// Set the retry budget
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    /// Add a configured custom header
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.config.custom_headers.insert(name.to_owned(), value.to_owned());
        self
    }

    /// Set the session id handed to the adapter
    pub fn with_session_id(mut self, session_id: &str) -> Self {
        self.options.adapter.session_id = Some(session_id.to_owned());
        self
    }

    /// Set the dynamic credentials provider
    pub fn with_credentials(mut self, provider: Arc<dyn CredentialsProvider>) -> Self {
        self.options.adapter.credentials = Some(provider);
        self
    }

    /// Report calls to an observer
    pub fn with_observer(mut self, observer: Arc<dyn CallObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Build the pipeline with a short retry delay
    pub fn build(self) -> ContentGenerationPipeline {
        let pipeline = ContentGenerationPipeline::new(
            ResolvedConfig {
                config: self.config,
                provenance: ProvenanceMap::new(),
            },
            self.options,
        )
        .expect("pipeline builds");

        let client = pipeline
            .adapter()
            .build_client()
            .expect("client builds")
            .with_retry_delay(Duration::from_millis(5));
        let pipeline = pipeline.with_client(client);

        match self.observer {
            Some(observer) => pipeline.with_observer(observer),
            None => pipeline,
        }
    }
}

/// Observer recording every event
#[derive(Default)]
pub struct RecordingObserver {
    events: std::sync::Mutex<Vec<CallEvent>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<CallEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl CallObserver for RecordingObserver {
    fn on_call(&self, event: CallEvent) {
        self.events.lock().unwrap().push(event);
    }
}
