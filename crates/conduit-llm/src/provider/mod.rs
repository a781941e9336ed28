//! Provider adapters: per-vendor headers, client, and request shaping

pub mod anthropic;
pub mod dashscope;
pub mod gemini;
pub mod openai;
pub mod transport;

use std::sync::Arc;

use conduit_config::{AuthType, ContentGeneratorConfig};
use http::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use serde_json::Value;

pub use self::anthropic::AnthropicAdapter;
pub use self::dashscope::DashScopeAdapter;
pub use self::gemini::GeminiAdapter;
pub use self::openai::{OpenAiAdapter, OpenAiFlavor};
pub use self::transport::{
    AuthScheme, CredentialSource, Credentials, CredentialsProvider, VendorClient, VendorClientConfig,
};
use crate::error::LlmError;
use crate::types::GenerationConfig;

/// Capabilities advertised by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderCapabilities {
    /// Whether the provider supports streaming responses
    pub streaming: bool,
    /// Whether the provider serves text embeddings
    pub embeddings: bool,
}

/// Wire protocol spoken by an adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// `OpenAI` chat completions
    ChatCompletions,
    /// Anthropic messages
    Messages,
    /// Gemini `generateContent`
    GenerateContent,
}

/// Per-call values adapters may fold into the request body
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Identifier generated for this call
    pub request_id: String,
    /// Identifier of the user prompt the call serves
    pub prompt_id: Option<String>,
}

/// Collaborators supplied by the embedding application
#[derive(Clone, Default)]
pub struct AdapterOptions {
    /// Token source for auth types without a static key
    pub credentials: Option<Arc<dyn CredentialsProvider>>,
    /// Session identifier forwarded to backends that accept one
    pub session_id: Option<String>,
}

impl std::fmt::Debug for AdapterOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterOptions")
            .field("credentials", &self.credentials.is_some())
            .field("session_id", &self.session_id)
            .finish()
    }
}

/// Behaviour each vendor adapter provides
pub trait Adapter: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Advertised capabilities
    fn capabilities(&self) -> ProviderCapabilities;

    /// Wire protocol of the backend
    fn wire_format(&self) -> WireFormat;

    /// Headers sent with every request
    ///
    /// Built-in headers first, then adapter headers, then the configured
    /// custom headers, which win on collision.
    fn build_headers(&self) -> Result<HeaderMap, LlmError>;

    /// Transport client for the backend
    fn build_client(&self) -> Result<VendorClient, LlmError>;

    /// Path of the generation endpoint, relative to the base URL
    fn endpoint(&self, model: &str, stream: bool) -> String;

    /// Path of the embedding endpoint, when supported
    fn embed_endpoint(&self, _model: &str) -> Option<String> {
        None
    }

    /// Final request body, with adapter enhancements merged in
    fn build_request(&self, body: Value, _context: &RequestContext) -> Value {
        body
    }

    /// Generation parameters used when neither the request nor the
    /// configuration sets them
    fn default_generation_config(&self) -> GenerationConfig {
        GenerationConfig::default()
    }

    /// Whether an error means the call was cancelled
    fn is_cancellation(&self, error: &LlmError) -> bool {
        is_cancelled_error(error)
    }
}

/// Adapter chosen once from the auth type
#[derive(Debug)]
pub enum ProviderAdapter {
    OpenAi(OpenAiAdapter),
    DashScope(DashScopeAdapter),
    Anthropic(AnthropicAdapter),
    Gemini(GeminiAdapter),
}

impl ProviderAdapter {
    /// Select and construct the adapter for a configuration
    ///
    /// An `openai` configuration pointing at a `DashScope` endpoint gets the
    /// `DashScope` adapter.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Config`] when the adapter cannot be built from
    /// the configuration (for example Anthropic without a base URL).
    pub fn new(config: &ContentGeneratorConfig, options: AdapterOptions) -> Result<Self, LlmError> {
        let adapter = match config.auth_type {
            AuthType::QwenOAuth => Self::DashScope(DashScopeAdapter::new(config.clone(), options)),
            AuthType::OpenAi if config.base_url.as_ref().is_some_and(dashscope::is_dashscope_url) => {
                Self::DashScope(DashScopeAdapter::new(config.clone(), options))
            }
            AuthType::OpenAi => Self::OpenAi(OpenAiAdapter::new(config.clone())),
            AuthType::Anthropic => Self::Anthropic(AnthropicAdapter::new(config.clone())?),
            AuthType::Gemini | AuthType::VertexAi => Self::Gemini(GeminiAdapter::new(config.clone())),
        };

        tracing::debug!(auth_type = %config.auth_type, adapter = adapter.name(), "selected provider adapter");
        Ok(adapter)
    }

    fn inner(&self) -> &dyn Adapter {
        match self {
            Self::OpenAi(adapter) => adapter,
            Self::DashScope(adapter) => adapter,
            Self::Anthropic(adapter) => adapter,
            Self::Gemini(adapter) => adapter,
        }
    }
}

impl Adapter for ProviderAdapter {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn capabilities(&self) -> ProviderCapabilities {
        self.inner().capabilities()
    }

    fn wire_format(&self) -> WireFormat {
        self.inner().wire_format()
    }

    fn build_headers(&self) -> Result<HeaderMap, LlmError> {
        self.inner().build_headers()
    }

    fn build_client(&self) -> Result<VendorClient, LlmError> {
        self.inner().build_client()
    }

    fn endpoint(&self, model: &str, stream: bool) -> String {
        self.inner().endpoint(model, stream)
    }

    fn embed_endpoint(&self, model: &str) -> Option<String> {
        self.inner().embed_endpoint(model)
    }

    fn build_request(&self, body: Value, context: &RequestContext) -> Value {
        self.inner().build_request(body, context)
    }

    fn default_generation_config(&self) -> GenerationConfig {
        self.inner().default_generation_config()
    }

    fn is_cancellation(&self, error: &LlmError) -> bool {
        self.inner().is_cancellation(error)
    }
}

/// `User-Agent` sent to every backend
pub fn user_agent() -> String {
    format!(
        "conduit/{} ({}; {})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

/// Assemble request headers in precedence order
///
/// # Errors
///
/// Returns [`LlmError::Config`] for a custom header that is not a valid
/// HTTP header.
pub fn assemble_headers(
    config: &ContentGeneratorConfig,
    adapter_headers: impl IntoIterator<Item = (HeaderName, HeaderValue)>,
) -> Result<HeaderMap, LlmError> {
    let mut headers = HeaderMap::new();

    let agent = HeaderValue::from_str(&user_agent())
        .map_err(|e| LlmError::Config(format!("invalid user agent: {e}")))?;
    headers.insert(USER_AGENT, agent);

    for (name, value) in adapter_headers {
        headers.insert(name, value);
    }

    // Header names are case-insensitive, so insert replaces any built-in
    for (name, value) in &config.custom_headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| LlmError::Config(format!("invalid custom header name {name:?}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| LlmError::Config(format!("invalid value for custom header {name}: {e}")))?;
        headers.insert(name, value);
    }

    Ok(headers)
}

/// Merge adapter body enhancements into a serialized vendor request
///
/// Fields already present in `original` win. Keys listed in `overridable`
/// are deep-merged instead, with the enhancement winning on conflicts.
pub fn merge_body(mut original: Value, enhancements: Value, overridable: &[&str]) -> Value {
    if let (Value::Object(target), Value::Object(extra)) = (&mut original, enhancements) {
        for (key, value) in extra {
            match target.get_mut(&key) {
                None => {
                    target.insert(key, value);
                }
                Some(existing) if overridable.contains(&key.as_str()) => deep_merge(existing, value),
                Some(_) => {}
            }
        }
    }

    original
}

fn deep_merge(target: &mut Value, value: Value) {
    match (target, value) {
        (Value::Object(target), Value::Object(value)) => {
            for (key, value) in value {
                match target.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (target, value) => *target = value,
    }
}

/// Cancellation as reported by the transport or an `OpenAI`-compatible server
pub(crate) fn is_cancelled_error(error: &LlmError) -> bool {
    match error {
        LlmError::Cancelled => true,
        LlmError::Upstream { status, .. } => status.as_u16() == 499,
        _ => false,
    }
}
