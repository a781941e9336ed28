//! Gemini `generateContent` adapter (Gemini API and Vertex AI keys)

use conduit_config::ContentGeneratorConfig;
use http::header::{HeaderMap, HeaderName};
use url::Url;

use super::{
    Adapter, AuthScheme, CredentialSource, ProviderCapabilities, VendorClient, VendorClientConfig, WireFormat,
    assemble_headers, is_cancelled_error,
};
use crate::error::LlmError;

/// Default Gemini API base URL
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini adapter
#[derive(Debug)]
pub struct GeminiAdapter {
    config: ContentGeneratorConfig,
}

impl GeminiAdapter {
    /// Create from the effective configuration
    pub const fn new(config: ContentGeneratorConfig) -> Self {
        Self { config }
    }
}

impl Adapter for GeminiAdapter {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            streaming: true,
            embeddings: true,
        }
    }

    fn wire_format(&self) -> WireFormat {
        WireFormat::GenerateContent
    }

    fn build_headers(&self) -> Result<HeaderMap, LlmError> {
        assemble_headers(&self.config, [])
    }

    fn build_client(&self) -> Result<VendorClient, LlmError> {
        let base_url = match &self.config.base_url {
            Some(url) => url.clone(),
            None => Url::parse(DEFAULT_BASE_URL).map_err(|e| LlmError::Internal(e.into()))?,
        };

        VendorClient::new(VendorClientConfig {
            base_url,
            headers: self.build_headers()?,
            credentials: self
                .config
                .api_key
                .clone()
                .map_or(CredentialSource::None, CredentialSource::Static),
            auth: AuthScheme::Header(HeaderName::from_static("x-goog-api-key")),
            timeout: self.config.timeout,
            proxy: self.config.proxy.clone(),
            max_retries: self.config.max_retries,
        })
    }

    fn endpoint(&self, model: &str, stream: bool) -> String {
        if stream {
            format!("models/{model}:streamGenerateContent?alt=sse")
        } else {
            format!("models/{model}:generateContent")
        }
    }

    fn embed_endpoint(&self, model: &str) -> Option<String> {
        Some(format!("models/{model}:embedContent"))
    }

    /// Gemini reports an aborted call with the `CANCELLED` status
    fn is_cancellation(&self, error: &LlmError) -> bool {
        match error {
            LlmError::Upstream { message, .. } if message.starts_with("CANCELLED") => true,
            other => is_cancelled_error(other),
        }
    }
}
