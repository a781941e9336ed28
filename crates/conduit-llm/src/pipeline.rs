//! Execution pipeline: one canonical call through adapter, converter, and transport

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;

use conduit_config::{ContentGeneratorConfig, ResolvedConfig};
use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures_util::{Stream, StreamExt};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::convert::anthropic::{AnthropicStreamState, to_anthropic_request};
use crate::convert::gemini::embed_request;
use crate::convert::openai::{OpenAiStreamState, to_openai_request};
use crate::convert::ConversionOptions;
use crate::error::LlmError;
use crate::error_handler::{ErrorHandler, ErrorKind};
use crate::observer::{CallGuard, CallInfo, CallObserver};
use crate::protocol::anthropic::{AnthropicResponse, AnthropicStreamEvent};
use crate::protocol::gemini::{GeminiEmbedResponse, GeminiRequest, GeminiResponse};
use crate::protocol::openai::{OpenAiResponse, OpenAiStreamChunk};
use crate::provider::{Adapter, AdapterOptions, ProviderAdapter, RequestContext, VendorClient, WireFormat};
use crate::types::{GenerateRequest, GenerateResponse, GenerationConfig, UsageMetadata};

/// Canonical increments of a streamed response
///
/// Finite and not restartable. Ends when the vendor stream ends, after a
/// single error, or after a single [`LlmError::Cancelled`].
pub type ResponseStream = Pin<Box<dyn Stream<Item = Result<GenerateResponse, LlmError>> + Send>>;

type SseStream = Pin<Box<dyn Stream<Item = Result<Event, EventStreamError<reqwest::Error>>> + Send>>;

/// Construction options for [`ContentGenerationPipeline`]
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Converter behaviour
    pub conversion: ConversionOptions,
    /// Collaborators handed to the adapter
    pub adapter: AdapterOptions,
}

/// Runs generation calls against the backend selected by the configuration
pub struct ContentGenerationPipeline {
    config: ContentGeneratorConfig,
    adapter: Arc<ProviderAdapter>,
    client: VendorClient,
    errors: ErrorHandler,
    conversion: ConversionOptions,
    observer: Option<Arc<dyn CallObserver>>,
}

impl std::fmt::Debug for ContentGenerationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentGenerationPipeline")
            .field("auth_type", &self.config.auth_type)
            .field("model", &self.config.model)
            .field("adapter", &self.adapter.name())
            .finish_non_exhaustive()
    }
}

/// A request prepared for the wire
struct Prepared {
    model: String,
    path: String,
    body: Value,
    context: RequestContext,
}

impl ContentGenerationPipeline {
    /// Build the adapter and transport client for a resolved configuration
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Config`] when the adapter or its client cannot
    /// be built.
    pub fn new(resolved: ResolvedConfig, options: PipelineOptions) -> Result<Self, LlmError> {
        let config = resolved.config;
        let adapter = Arc::new(ProviderAdapter::new(&config, options.adapter)?);
        let client = adapter.build_client()?;
        let errors = ErrorHandler::new(adapter.clone(), config.timeout);

        tracing::info!(
            auth_type = %config.auth_type,
            model = %config.model,
            adapter = adapter.name(),
            "content generation pipeline ready"
        );

        Ok(Self {
            config,
            adapter,
            client,
            errors,
            conversion: options.conversion,
            observer: None,
        })
    }

    /// Report every call to `observer`
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn CallObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Replace the transport client (for tuning retries)
    #[must_use]
    pub fn with_client(mut self, client: VendorClient) -> Self {
        self.client = client;
        self
    }

    /// Adapter serving this pipeline
    pub fn adapter(&self) -> &ProviderAdapter {
        &self.adapter
    }

    /// Effective configuration
    pub const fn config(&self) -> &ContentGeneratorConfig {
        &self.config
    }

    /// Generation parameters for a call
    ///
    /// Each field comes from the request, else the configuration, else
    /// the adapter default.
    pub fn effective_generation_config(&self, requested: &GenerationConfig) -> GenerationConfig {
        let fallback = self.adapter.default_generation_config();

        GenerationConfig {
            sampling: requested.sampling.clone().or(&self.config.sampling).or(&fallback.sampling),
            stop_sequences: if requested.stop_sequences.is_empty() {
                fallback.stop_sequences
            } else {
                requested.stop_sequences.clone()
            },
            seed: requested.seed.or(fallback.seed),
        }
    }

    /// Run one non-streaming call
    ///
    /// # Errors
    ///
    /// Returns the classified error of whichever stage failed, or
    /// [`LlmError::Cancelled`] when the request's token fires.
    pub async fn execute(&self, request: &GenerateRequest) -> Result<GenerateResponse, LlmError> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let model = self.model_for(request);
        let mut guard = CallGuard::start(self.observer.clone(), self.call_info(&request_id, request, &model, false));
        let span = tracing::info_span!("generate", request_id = %request_id, model = %model, adapter = self.adapter.name());

        let result = async {
            let prepared = self.prepare(request, request_id.clone(), false)?;
            tracing::debug!(path = %prepared.path, "sending request");
            self.send(request, &prepared).await
        }
        .instrument(span)
        .await;

        match result {
            Ok(response) => {
                guard.completed(response.usage_metadata);
                Ok(response)
            }
            Err(error) => {
                let error = self.errors.handle(error, request);
                guard.failed(self.errors.classify(&error), error.to_string());
                Err(error)
            }
        }
    }

    /// Start a streaming call
    ///
    /// The exchange is opened before returning; increments are pulled
    /// lazily from the returned stream.
    ///
    /// # Errors
    ///
    /// Returns the classified error when the exchange cannot be opened.
    pub async fn execute_stream(&self, request: &GenerateRequest) -> Result<ResponseStream, LlmError> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let model = self.model_for(request);
        let mut guard = CallGuard::start(self.observer.clone(), self.call_info(&request_id, request, &model, true));
        let span = tracing::info_span!(
            "generate_stream",
            request_id = %request_id,
            model = %model,
            adapter = self.adapter.name()
        );

        let opened = async {
            let prepared = self.prepare(request, request_id.clone(), true)?;
            tracing::debug!(path = %prepared.path, "opening stream");
            self.client
                .post(&prepared.path, &prepared.body, request.cancellation.as_ref())
                .await
        }
        .instrument(span.clone())
        .await;

        let response = match opened {
            Ok(response) => response,
            Err(error) => {
                let error = self.errors.handle(error, request);
                guard.failed(self.errors.classify(&error), error.to_string());
                return Err(error);
            }
        };

        let state = StreamState {
            events: Box::pin(response.bytes_stream().eventsource()),
            decoder: StreamDecoder::new(self.adapter.wire_format()),
            pending: VecDeque::new(),
            cancel: request.cancellation.clone(),
            origin: GenerateRequest {
                prompt_id: request.prompt_id.clone(),
                cancellation: request.cancellation.clone(),
                ..GenerateRequest::default()
            },
            errors: self.errors.clone(),
            guard,
            usage: None,
            done: false,
        };

        let stream = futures_util::stream::unfold(state, move |state| {
            let span = span.clone();
            async move { state.next().await }.instrument(span)
        });

        Ok(Box::pin(stream))
    }

    /// Embed a piece of text
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::InvalidRequest`] when the adapter has no
    /// embedding support, otherwise as for [`Self::execute`].
    pub async fn embed_content(&self, text: &str, model: &str) -> Result<Vec<f32>, LlmError> {
        let Some(path) = self.adapter.embed_endpoint(model).filter(|_| self.adapter.capabilities().embeddings) else {
            return Err(LlmError::InvalidRequest(format!(
                "{} does not support embeddings",
                self.adapter.name()
            )));
        };

        let request_id = uuid::Uuid::new_v4().to_string();
        let info = CallInfo {
            request_id: request_id.clone(),
            prompt_id: None,
            model: model.to_owned(),
            adapter: self.adapter.name(),
            streaming: false,
        };
        let mut guard = CallGuard::start(self.observer.clone(), info);

        let body = serde_json::to_value(embed_request(text)).map_err(|e| LlmError::Internal(e.into()))?;
        let result = self
            .client
            .post_json::<GeminiEmbedResponse>(&path, &body, None)
            .instrument(tracing::info_span!("embed", request_id = %request_id, model = %model))
            .await;

        match result {
            Ok(response) => {
                guard.completed(None);
                Ok(response.embedding.values)
            }
            Err(error) => {
                let error = self.errors.handle(error, &GenerateRequest::default());
                guard.failed(self.errors.classify(&error), error.to_string());
                Err(error)
            }
        }
    }

    fn model_for(&self, request: &GenerateRequest) -> String {
        request
            .model
            .clone()
            .filter(|model| !model.is_empty())
            .unwrap_or_else(|| self.config.model.clone())
    }

    fn call_info(&self, request_id: &str, request: &GenerateRequest, model: &str, streaming: bool) -> CallInfo {
        CallInfo {
            request_id: request_id.to_owned(),
            prompt_id: request.prompt_id.clone(),
            model: model.to_owned(),
            adapter: self.adapter.name(),
            streaming,
        }
    }

    fn prepare(&self, request: &GenerateRequest, request_id: String, stream: bool) -> Result<Prepared, LlmError> {
        if request.is_cancelled() {
            return Err(LlmError::Cancelled);
        }

        let model = self.model_for(request);
        if model.is_empty() {
            return Err(LlmError::InvalidRequest("no model configured".to_owned()));
        }
        if stream && !self.adapter.capabilities().streaming {
            return Err(LlmError::InvalidRequest(format!(
                "{} does not support streaming",
                self.adapter.name()
            )));
        }

        let mut effective = request.clone();
        effective.config = self.effective_generation_config(&request.config);

        let body = match self.adapter.wire_format() {
            WireFormat::ChatCompletions => {
                serde_json::to_value(to_openai_request(&effective, &model, stream, &self.conversion))
            }
            WireFormat::Messages => {
                serde_json::to_value(to_anthropic_request(&effective, &model, stream, &self.conversion))
            }
            WireFormat::GenerateContent => serde_json::to_value(GeminiRequest::from(&effective)),
        }
        .map_err(|e| LlmError::Internal(e.into()))?;

        let context = RequestContext {
            request_id,
            prompt_id: request.prompt_id.clone(),
        };

        Ok(Prepared {
            path: self.adapter.endpoint(&model, stream),
            body: self.adapter.build_request(body, &context),
            model,
            context,
        })
    }

    async fn send(&self, request: &GenerateRequest, prepared: &Prepared) -> Result<GenerateResponse, LlmError> {
        let cancel = request.cancellation.as_ref();
        let path = prepared.path.as_str();
        let body = &prepared.body;

        let mut response: GenerateResponse = match self.adapter.wire_format() {
            WireFormat::ChatCompletions => self.client.post_json::<OpenAiResponse>(path, body, cancel).await?.into(),
            WireFormat::Messages => self.client.post_json::<AnthropicResponse>(path, body, cancel).await?.into(),
            WireFormat::GenerateContent => self.client.post_json::<GeminiResponse>(path, body, cancel).await?.into(),
        };

        if response.model_version.is_none() {
            response.model_version = Some(prepared.model.clone());
        }
        tracing::debug!(
            request_id = %prepared.context.request_id,
            candidates = response.candidates.len(),
            "response received"
        );
        Ok(response)
    }
}

/// Wire-specific conversion of SSE payloads
enum StreamDecoder {
    OpenAi(OpenAiStreamState),
    Anthropic(AnthropicStreamState),
    Gemini,
}

impl StreamDecoder {
    fn new(wire: WireFormat) -> Self {
        match wire {
            WireFormat::ChatCompletions => Self::OpenAi(OpenAiStreamState::new()),
            WireFormat::Messages => Self::Anthropic(AnthropicStreamState::new()),
            WireFormat::GenerateContent => Self::Gemini,
        }
    }

    /// Convert one SSE payload; `Ok(None)` for keep-alives and empty chunks
    fn decode(&mut self, data: &str) -> Result<Option<GenerateResponse>, LlmError> {
        match self {
            Self::OpenAi(state) => match serde_json::from_str::<OpenAiStreamChunk>(data) {
                Ok(chunk) => Ok(state.process_chunk(chunk)),
                Err(e) => Err(vendor_stream_error(data).unwrap_or_else(|| {
                    LlmError::Streaming(format!("unparseable chunk: {e}"))
                })),
            },
            Self::Anthropic(state) => match serde_json::from_str::<AnthropicStreamEvent>(data) {
                Ok(event) => state.process_event(event),
                Err(e) => {
                    tracing::debug!(error = %e, data = %data, "skipping unknown Anthropic event");
                    Ok(None)
                }
            },
            Self::Gemini => match serde_json::from_str::<GeminiResponse>(data) {
                Ok(chunk) => Ok(Some(chunk.into())),
                Err(e) => Err(vendor_stream_error(data).unwrap_or_else(|| {
                    LlmError::Streaming(format!("unparseable chunk: {e}"))
                })),
            },
        }
    }

    fn finish(&mut self) -> Option<GenerateResponse> {
        match self {
            Self::OpenAi(state) => state.finish(),
            Self::Anthropic(state) => state.finish(),
            Self::Gemini => None,
        }
    }
}

/// Error object sent in place of a chunk
fn vendor_stream_error(data: &str) -> Option<LlmError> {
    crate::provider::transport::decode_upstream_error(data).map(LlmError::Streaming)
}

struct StreamState {
    events: SseStream,
    decoder: StreamDecoder,
    pending: VecDeque<GenerateResponse>,
    cancel: Option<CancellationToken>,
    /// Prompt id and token of the originating request, for the error handler
    origin: GenerateRequest,
    errors: ErrorHandler,
    guard: CallGuard,
    usage: Option<UsageMetadata>,
    done: bool,
}

enum Pulled {
    Cancelled,
    Event(Option<Result<Event, EventStreamError<reqwest::Error>>>),
}

impl StreamState {
    async fn next(mut self) -> Option<(Result<GenerateResponse, LlmError>, Self)> {
        loop {
            if let Some(increment) = self.pending.pop_front() {
                if increment.usage_metadata.is_some() {
                    self.usage = increment.usage_metadata;
                }
                return Some((Ok(increment), self));
            }

            if self.done {
                return None;
            }

            let pulled = match &self.cancel {
                Some(token) => tokio::select! {
                    () = token.cancelled() => Pulled::Cancelled,
                    event = self.events.next() => Pulled::Event(event),
                },
                None => Pulled::Event(self.events.next().await),
            };

            match pulled {
                Pulled::Cancelled => return Some((Err(self.fail(LlmError::Cancelled)), self)),
                Pulled::Event(None) => self.end(),
                Pulled::Event(Some(Err(e))) => {
                    let error = LlmError::Streaming(e.to_string());
                    return Some((Err(self.fail(error)), self));
                }
                Pulled::Event(Some(Ok(event))) => {
                    let data = event.data.trim();
                    if data.is_empty() {
                        continue;
                    }
                    if data == "[DONE]" {
                        self.end();
                        continue;
                    }

                    match self.decoder.decode(data) {
                        Ok(Some(increment)) => self.pending.push_back(increment),
                        Ok(None) => {}
                        Err(error) => return Some((Err(self.fail(error)), self)),
                    }
                }
            }
        }
    }

    /// Vendor stream finished: flush buffered calls and report completion
    fn end(&mut self) {
        if let Some(increment) = self.decoder.finish() {
            self.pending.push_back(increment);
        }

        let usage = self
            .pending
            .iter()
            .rev()
            .find_map(|increment| increment.usage_metadata)
            .or(self.usage);
        self.guard.completed(usage);
        self.done = true;
    }

    fn fail(&mut self, error: LlmError) -> LlmError {
        self.done = true;
        self.pending.clear();

        let error = self.errors.handle(error, &self.origin);
        let kind = if matches!(error, LlmError::Cancelled) {
            ErrorKind::Cancellation
        } else {
            self.errors.classify(&error)
        };
        self.guard.failed(kind, error.to_string());
        error
    }
}
