//! `OpenAI`-compatible adapter, with flavors for known compatible hosts

use conduit_config::ContentGeneratorConfig;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use url::Url;

use super::{
    Adapter, AuthScheme, CredentialSource, ProviderCapabilities, RequestContext, VendorClient, VendorClientConfig,
    WireFormat, assemble_headers,
};
use crate::error::LlmError;

/// Default `OpenAI` API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Referer sent to `OpenRouter` for app attribution
const OPENROUTER_REFERER: &str = "https://github.com/conduit-dev/conduit";

/// Title sent to `OpenRouter` for app attribution
const OPENROUTER_TITLE: &str = "Conduit";

/// Compatible-server quirks keyed off the base URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenAiFlavor {
    #[default]
    Default,
    /// `openrouter.ai`: attribution headers
    OpenRouter,
    /// `deepseek.com`: text-only block arrays must be plain strings
    DeepSeek,
}

impl OpenAiFlavor {
    /// Flavor for a base URL
    pub fn detect(base_url: Option<&Url>) -> Self {
        let Some(host) = base_url.and_then(Url::host_str) else {
            return Self::Default;
        };

        if host.ends_with("openrouter.ai") {
            Self::OpenRouter
        } else if host.ends_with("deepseek.com") {
            Self::DeepSeek
        } else {
            Self::Default
        }
    }
}

/// `OpenAI`-compatible chat completions adapter
#[derive(Debug)]
pub struct OpenAiAdapter {
    config: ContentGeneratorConfig,
    flavor: OpenAiFlavor,
}

impl OpenAiAdapter {
    /// Create from the effective configuration
    pub fn new(config: ContentGeneratorConfig) -> Self {
        let flavor = OpenAiFlavor::detect(config.base_url.as_ref());
        Self { config, flavor }
    }

    /// Detected flavor
    pub const fn flavor(&self) -> OpenAiFlavor {
        self.flavor
    }
}

impl Adapter for OpenAiAdapter {
    fn name(&self) -> &'static str {
        match self.flavor {
            OpenAiFlavor::Default => "openai",
            OpenAiFlavor::OpenRouter => "openrouter",
            OpenAiFlavor::DeepSeek => "deepseek",
        }
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
        let extra = match self.flavor {
            OpenAiFlavor::OpenRouter => vec![
                (HeaderName::from_static("http-referer"), HeaderValue::from_static(OPENROUTER_REFERER)),
                (HeaderName::from_static("x-title"), HeaderValue::from_static(OPENROUTER_TITLE)),
            ],
            OpenAiFlavor::Default | OpenAiFlavor::DeepSeek => Vec::new(),
        };

        assemble_headers(&self.config, extra)
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
            auth: AuthScheme::Bearer,
            timeout: self.config.timeout,
            proxy: self.config.proxy.clone(),
            max_retries: self.config.max_retries,
        })
    }

    fn endpoint(&self, _model: &str, _stream: bool) -> String {
        "chat/completions".to_owned()
    }

    fn build_request(&self, mut body: Value, _context: &RequestContext) -> Value {
        if self.flavor == OpenAiFlavor::DeepSeek {
            flatten_text_blocks(&mut body);
        }
        body
    }
}

/// Replace text-only content block arrays with their concatenated text
///
/// Tool messages are flattened too; an empty array becomes `""`.
pub fn flatten_text_blocks(body: &mut Value) {
    let Some(messages) = body.get_mut("messages").and_then(Value::as_array_mut) else {
        return;
    };

    for message in messages {
        let Some(content) = message.get_mut("content") else {
            continue;
        };
        let Some(blocks) = content.as_array() else {
            continue;
        };

        let text: Option<String> = blocks
            .iter()
            .map(|block| {
                (block.get("type").and_then(Value::as_str) == Some("text"))
                    .then(|| block.get("text").and_then(Value::as_str))
                    .flatten()
            })
            .collect();

        if let Some(text) = text {
            *content = Value::String(text);
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn adapter(base_url: &str) -> OpenAiAdapter {
        let mut config = ContentGeneratorConfig::new(conduit_config::AuthType::OpenAi);
        config.base_url = Some(Url::parse(base_url).unwrap());
        OpenAiAdapter::new(config)
    }

    #[test]
    fn detects_flavor_from_host() {
        assert_eq!(adapter("https://openrouter.ai/api/v1").flavor(), OpenAiFlavor::OpenRouter);
        assert_eq!(adapter("https://api.deepseek.com/v1").flavor(), OpenAiFlavor::DeepSeek);
        assert_eq!(adapter("http://localhost:8000/v1").flavor(), OpenAiFlavor::Default);
    }

    #[test]
    fn openrouter_adds_attribution() {
        let headers = adapter("https://openrouter.ai/api/v1").build_headers().unwrap();
        assert_eq!(headers.get("http-referer").unwrap(), OPENROUTER_REFERER);
        assert_eq!(headers.get("x-title").unwrap(), OPENROUTER_TITLE);
    }

    #[test]
    fn deepseek_flattens_text_only_arrays() {
        let body = json!({
            "messages": [
                {"role": "tool", "tool_call_id": "c", "content": [{"type": "text", "text": "a"}, {"type": "text", "text": "b"}]},
                {"role": "user", "content": [{"type": "text", "text": "x"}, {"type": "image_url", "image_url": {"url": "u"}}]},
                {"role": "assistant", "content": "plain"}
            ]
        });

        let body = adapter("https://api.deepseek.com").build_request(body, &RequestContext::default());

        assert_eq!(body["messages"][0]["content"], json!("ab"));
        assert!(body["messages"][1]["content"].is_array());
        assert_eq!(body["messages"][2]["content"], json!("plain"));
    }

    #[test]
    fn default_flavor_leaves_body_alone() {
        let body = json!({"messages": [{"role": "tool", "content": [{"type": "text", "text": "a"}]}]});
        let out = adapter("https://api.openai.com/v1").build_request(body.clone(), &RequestContext::default());
        assert_eq!(out, body);
    }
}
