//! `DashScope` adapter: `OpenAI`-compatible wire with Qwen-specific extras

use conduit_config::layer::DASHSCOPE_BASE_URL;
use conduit_config::{AuthType, ContentGeneratorConfig};
use http::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{Map, Value};
use url::Url;

use super::{
    Adapter, AdapterOptions, AuthScheme, CredentialSource, ProviderCapabilities, RequestContext, VendorClient,
    VendorClientConfig, WireFormat, assemble_headers, merge_body, user_agent,
};
use crate::error::LlmError;

/// Body keys the adapter may deep-merge into an existing value
const OVERRIDABLE_KEYS: &[&str] = &["metadata"];

/// Whether a base URL points at a `DashScope` endpoint
pub fn is_dashscope_url(url: &Url) -> bool {
    url.host_str().is_some_and(|host| host.contains("dashscope"))
}

/// Adapter for `DashScope`-served Qwen models
#[derive(Debug)]
pub struct DashScopeAdapter {
    config: ContentGeneratorConfig,
    options: AdapterOptions,
}

impl DashScopeAdapter {
    /// Create from the effective configuration
    pub const fn new(config: ContentGeneratorConfig, options: AdapterOptions) -> Self {
        Self { config, options }
    }

    fn credentials(&self) -> Result<CredentialSource, LlmError> {
        if self.config.auth_type == AuthType::QwenOAuth {
            return self
                .options
                .credentials
                .clone()
                .map(CredentialSource::Dynamic)
                .ok_or_else(|| LlmError::Config("qwen-oauth requires a credentials provider".to_owned()));
        }

        Ok(self
            .config
            .api_key
            .clone()
            .map_or(CredentialSource::None, CredentialSource::Static))
    }
}

impl Adapter for DashScopeAdapter {
    fn name(&self) -> &'static str {
        "dashscope"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            streaming: true,
            embeddings: false,
        }
    }

    fn wire_format(&self) -> WireFormat {
        WireFormat::ChatCompletions
    }

    fn build_headers(&self) -> Result<HeaderMap, LlmError> {
        let header = |value: &str| {
            HeaderValue::from_str(value).map_err(|e| LlmError::Config(format!("invalid DashScope header value: {e}")))
        };

        assemble_headers(
            &self.config,
            [
                (HeaderName::from_static("x-dashscope-cachecontrol"), HeaderValue::from_static("enable")),
                (HeaderName::from_static("x-dashscope-useragent"), header(&user_agent())?),
                (HeaderName::from_static("x-dashscope-authtype"), header(self.config.auth_type.as_ref())?),
            ],
        )
    }

    fn build_client(&self) -> Result<VendorClient, LlmError> {
        let base_url = match &self.config.base_url {
            Some(url) => url.clone(),
            None => Url::parse(DASHSCOPE_BASE_URL).map_err(|e| LlmError::Internal(e.into()))?,
        };

        VendorClient::new(VendorClientConfig {
            base_url,
            headers: self.build_headers()?,
            credentials: self.credentials()?,
            auth: AuthScheme::Bearer,
            timeout: self.config.timeout,
            proxy: self.config.proxy.clone(),
            max_retries: self.config.max_retries,
        })
    }

    fn endpoint(&self, _model: &str, _stream: bool) -> String {
        "chat/completions".to_owned()
    }

    fn build_request(&self, body: Value, context: &RequestContext) -> Value {
        let mut metadata = Map::new();
        if let Some(session_id) = &self.options.session_id {
            metadata.insert("sessionId".to_owned(), Value::String(session_id.clone()));
        }
        if let Some(prompt_id) = &context.prompt_id {
            metadata.insert("promptId".to_owned(), Value::String(prompt_id.clone()));
        }

        if metadata.is_empty() {
            return body;
        }

        let mut enhancements = Map::new();
        enhancements.insert("metadata".to_owned(), Value::Object(metadata));

        merge_body(body, Value::Object(enhancements), OVERRIDABLE_KEYS)
    }
}
