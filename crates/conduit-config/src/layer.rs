//! Configuration layers and their precedence merge

use std::collections::BTreeMap;
use std::time::Duration;

use indexmap::IndexMap;
use secrecy::SecretString;
use url::Url;

use crate::auth::AuthType;
use crate::generation::SamplingParams;
use crate::provenance::{ConfigField, Provenance, ProvenanceKind, ProvenanceMap};

/// Default request timeout applied by every provider
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Default number of transport retries
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default model served through Qwen OAuth
pub const QWEN_OAUTH_DEFAULT_MODEL: &str = "coder-model";

/// `DashScope` compatible-mode endpoint used by Qwen OAuth
pub const DASHSCOPE_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";

/// Default Gemini model
pub const GEMINI_DEFAULT_MODEL: &str = "gemini-2.5-pro";

/// One source of configuration values
///
/// Every field is optional; `details` records where inside the source a
/// field came from (a settings path, variable name, or flag).
#[derive(Debug, Clone, Default)]
pub struct ConfigLayer {
    pub model: Option<String>,
    pub api_key: Option<SecretString>,
    pub base_url: Option<Url>,
    pub timeout: Option<Duration>,
    pub max_retries: Option<u32>,
    pub custom_headers: Option<IndexMap<String, String>>,
    pub sampling: SamplingParams,
    pub details: BTreeMap<ConfigField, String>,
}

impl ConfigLayer {
    /// Build the environment layer for an auth type from the process environment
    pub fn from_env(auth_type: AuthType) -> Self {
        Self::from_env_with(auth_type, |name| std::env::var(name).ok())
    }

    /// Build the environment layer using a custom variable lookup
    ///
    /// Empty variables count as unset. A base URL that does not parse is
    /// ignored with a warning.
    pub fn from_env_with(auth_type: AuthType, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |name: Option<&'static str>| {
            name.and_then(|name| lookup(name).filter(|v| !v.trim().is_empty()).map(|v| (name, v)))
        };

        let mut layer = Self::default();

        if let Some((name, value)) = read(auth_type.api_key_env_var()) {
            layer.api_key = Some(SecretString::from(value));
            layer.note(ConfigField::ApiKey, name);
        }

        if let Some((name, value)) = read(auth_type.model_env_var()) {
            layer.model = Some(value);
            layer.note(ConfigField::Model, name);
        }

        if let Some((name, value)) = read(auth_type.base_url_env_var()) {
            match Url::parse(&value) {
                Ok(url) => {
                    layer.base_url = Some(url);
                    layer.note(ConfigField::BaseUrl, name);
                }
                Err(e) => {
                    tracing::warn!(variable = name, error = %e, "ignoring unparseable base URL from environment");
                }
            }
        }

        layer
    }

    /// Defaults a provider declares for an auth type
    pub fn provider_defaults(auth_type: AuthType) -> Self {
        let mut layer = Self {
            timeout: Some(DEFAULT_TIMEOUT),
            max_retries: Some(DEFAULT_MAX_RETRIES),
            ..Self::default()
        };

        match auth_type {
            AuthType::QwenOAuth => {
                layer.model = Some(QWEN_OAUTH_DEFAULT_MODEL.to_owned());
                layer.base_url = Url::parse(DASHSCOPE_BASE_URL).ok();
            }
            AuthType::Gemini | AuthType::VertexAi => {
                layer.model = Some(GEMINI_DEFAULT_MODEL.to_owned());
            }
            AuthType::OpenAi | AuthType::Anthropic => {}
        }

        layer
    }

    /// Record where a field came from inside this layer
    pub fn note(&mut self, field: ConfigField, detail: impl Into<String>) {
        self.details.insert(field, detail.into());
    }

    /// Whether this layer holds a value for `field`
    pub const fn has(&self, field: ConfigField) -> bool {
        match field {
            ConfigField::Model => self.model.is_some(),
            ConfigField::ApiKey => self.api_key.is_some(),
            ConfigField::BaseUrl => self.base_url.is_some(),
            ConfigField::Timeout => self.timeout.is_some(),
            ConfigField::MaxRetries => self.max_retries.is_some(),
            ConfigField::CustomHeaders => self.custom_headers.is_some(),
            ConfigField::Temperature => self.sampling.temperature.is_some(),
            ConfigField::TopP => self.sampling.top_p.is_some(),
            ConfigField::TopK => self.sampling.top_k.is_some(),
            ConfigField::PresencePenalty => self.sampling.presence_penalty.is_some(),
            ConfigField::FrequencyPenalty => self.sampling.frequency_penalty.is_some(),
            ConfigField::MaxOutputTokens => self.sampling.max_output_tokens.is_some(),
            ConfigField::ReasoningEffort => self.sampling.reasoning_effort.is_some(),
            ConfigField::AuthType | ConfigField::Proxy => false,
        }
    }

    /// Copy a single field from `other`, returning whether a value was present
    pub fn copy_field(&mut self, other: &Self, field: ConfigField) -> bool {
        let copied = match field {
            ConfigField::Model => copy(&mut self.model, &other.model),
            ConfigField::ApiKey => copy(&mut self.api_key, &other.api_key),
            ConfigField::BaseUrl => copy(&mut self.base_url, &other.base_url),
            ConfigField::Timeout => copy(&mut self.timeout, &other.timeout),
            ConfigField::MaxRetries => copy(&mut self.max_retries, &other.max_retries),
            ConfigField::CustomHeaders => copy(&mut self.custom_headers, &other.custom_headers),
            ConfigField::Temperature => copy(&mut self.sampling.temperature, &other.sampling.temperature),
            ConfigField::TopP => copy(&mut self.sampling.top_p, &other.sampling.top_p),
            ConfigField::TopK => copy(&mut self.sampling.top_k, &other.sampling.top_k),
            ConfigField::PresencePenalty => copy(&mut self.sampling.presence_penalty, &other.sampling.presence_penalty),
            ConfigField::FrequencyPenalty => {
                copy(&mut self.sampling.frequency_penalty, &other.sampling.frequency_penalty)
            }
            ConfigField::MaxOutputTokens => {
                copy(&mut self.sampling.max_output_tokens, &other.sampling.max_output_tokens)
            }
            ConfigField::ReasoningEffort => copy(&mut self.sampling.reasoning_effort, &other.sampling.reasoning_effort),
            ConfigField::AuthType | ConfigField::Proxy => false,
        };

        if copied && let Some(detail) = other.details.get(&field) {
            self.details.insert(field, detail.clone());
        }

        copied
    }
}

fn copy<T: Clone>(target: &mut Option<T>, source: &Option<T>) -> bool {
    match source {
        Some(value) => {
            *target = Some(value.clone());
            true
        }
        None => false,
    }
}

/// All configuration sources for one session, ordered by precedence
#[derive(Debug, Clone, Default)]
pub struct LayeredSources {
    /// Explicit command-line or per-call overrides
    pub cli: ConfigLayer,
    /// Session settings file
    pub settings: ConfigLayer,
    /// Environment-derived values
    pub env: ConfigLayer,
    /// Provider-declared defaults
    pub provider_default: ConfigLayer,
}

impl LayeredSources {
    /// Merge the layers field by field
    ///
    /// Returns the merged base layer together with the seed provenance
    /// naming the layer each value came from.
    pub fn merge(&self) -> (ConfigLayer, ProvenanceMap) {
        let ordered = [
            (&self.cli, ProvenanceKind::Cli),
            (&self.settings, ProvenanceKind::Settings),
            (&self.env, ProvenanceKind::Env),
            (&self.provider_default, ProvenanceKind::ProviderDefault),
        ];

        let mut base = ConfigLayer::default();
        let mut provenance = ProvenanceMap::new();

        for field in ConfigField::all() {
            for (layer, kind) in ordered {
                if base.copy_field(layer, field) {
                    let seed = match layer.details.get(&field) {
                        Some(detail) => Provenance::with_detail(kind, detail.clone()),
                        None => Provenance::new(kind),
                    };
                    provenance.record(field, seed);
                    break;
                }
            }
        }

        (base, provenance)
    }
}
