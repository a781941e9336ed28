//! Anthropic Messages API adapter

use conduit_config::ContentGeneratorConfig;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use url::Url;

use super::{
    Adapter, AuthScheme, CredentialSource, ProviderCapabilities, VendorClient, VendorClientConfig, WireFormat,
    assemble_headers,
};
use crate::convert::anthropic::DEFAULT_MAX_TOKENS;
use crate::error::LlmError;
use crate::types::GenerationConfig;

/// Anthropic API version header value
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API adapter
#[derive(Debug)]
pub struct AnthropicAdapter {
    config: ContentGeneratorConfig,
    base_url: Url,
}

impl AnthropicAdapter {
    /// Create from the effective configuration
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Config`] when no base URL is configured.
    pub fn new(config: ContentGeneratorConfig) -> Result<Self, LlmError> {
        let base_url = config
            .base_url
            .clone()
            .ok_or_else(|| LlmError::Config("anthropic requires a base URL (ANTHROPIC_BASE_URL)".to_owned()))?;

        Ok(Self { config, base_url })
    }
}

impl Adapter for AnthropicAdapter {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            streaming: true,
            embeddings: false,
        }
    }

    fn wire_format(&self) -> WireFormat {
        WireFormat::Messages
    }

    fn build_headers(&self) -> Result<HeaderMap, LlmError> {
        assemble_headers(
            &self.config,
            [(HeaderName::from_static("anthropic-version"), HeaderValue::from_static(ANTHROPIC_VERSION))],
        )
    }

    fn build_client(&self) -> Result<VendorClient, LlmError> {
        VendorClient::new(VendorClientConfig {
            base_url: self.base_url.clone(),
            headers: self.build_headers()?,
            credentials: self
                .config
                .api_key
                .clone()
                .map_or(CredentialSource::None, CredentialSource::Static),
            auth: AuthScheme::Header(HeaderName::from_static("x-api-key")),
            timeout: self.config.timeout,
            proxy: self.config.proxy.clone(),
            max_retries: self.config.max_retries,
        })
    }

    fn endpoint(&self, _model: &str, _stream: bool) -> String {
        "messages".to_owned()
    }

    fn default_generation_config(&self) -> GenerationConfig {
        let mut config = GenerationConfig::default();
        config.sampling.max_output_tokens = Some(DEFAULT_MAX_TOKENS);
        config
    }
}
