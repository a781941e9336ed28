use indexmap::IndexMap;
use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

use crate::auth::AuthType;
use crate::generation::SamplingParams;
use crate::layer::ConfigLayer;
use crate::logging::LoggingConfig;
use crate::provenance::ConfigField;

/// Top-level settings file
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Settings {
    /// Auth type selected for the session
    #[serde(default)]
    pub auth_type: Option<AuthType>,
    /// Model and generation settings
    #[serde(default)]
    pub model: ModelSettings,
    /// Outbound HTTP proxy
    #[serde(default)]
    pub proxy: Option<Url>,
    /// Require credentials and model to be set explicitly for the provider
    #[serde(default)]
    pub strict_model_provider: bool,
    /// Log output configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// The `[model]` section
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ModelSettings {
    /// Model identifier
    #[serde(default)]
    pub name: Option<String>,
    /// API key, usually `{{ env.VAR }}`
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Base URL override
    #[serde(default)]
    pub base_url: Option<Url>,
    /// Request timeout as a human duration (`"90s"`, `"2m"`)
    #[serde(default)]
    pub timeout: Option<String>,
    /// Transport retries
    #[serde(default)]
    pub max_retries: Option<u32>,
    /// Extra headers sent with every request
    #[serde(default)]
    pub custom_headers: Option<IndexMap<String, String>>,
    /// Default sampling parameters
    #[serde(default)]
    pub generation_config: SamplingParams,
}

impl Settings {
    /// Convert the settings into the settings layer of the resolver
    ///
    /// Every present field is noted with its settings path so the
    /// resolved provenance can point back at it.
    ///
    /// # Errors
    ///
    /// Returns an error if the timeout is not a valid duration.
    pub fn to_layer(&self) -> anyhow::Result<ConfigLayer> {
        let model = &self.model;
        let mut layer = ConfigLayer {
            model: model.name.clone(),
            api_key: model.api_key.clone(),
            base_url: model.base_url.clone(),
            max_retries: model.max_retries,
            custom_headers: model.custom_headers.clone(),
            sampling: model.generation_config.clone(),
            ..ConfigLayer::default()
        };

        if let Some(timeout) = &model.timeout {
            let parsed = duration_str::parse(timeout)
                .map_err(|e| anyhow::anyhow!("invalid model.timeout '{timeout}': {e}"))?;
            layer.timeout = Some(parsed);
        }

        for field in ConfigField::all() {
            if !layer.has(field) {
                continue;
            }
            let path = match field {
                ConfigField::Model => "model.name".to_owned(),
                _ => format!("model.{field}"),
            };
            layer.note(field, path);
        }

        Ok(layer)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use secrecy::ExposeSecret;

    use super::*;
    use crate::generation::ReasoningEffort;

    #[test]
    fn parses_full_settings() {
        let raw = dedent(
            r#"
            authType = "anthropic"
            proxy = "http://proxy.local:8080"

            [model]
            name = "claude-sonnet"
            apiKey = "sk-ant"
            baseUrl = "https://api.anthropic.com"
            timeout = "90s"
            maxRetries = 5

            [model.customHeaders]
            X-Team = "platform"

            [model.generationConfig]
            temperature = 0.3
            reasoningEffort = "high"

            [logging]
            filter = "debug"
            format = "json"
            "#,
        );

        let settings: Settings = toml::from_str(&raw).unwrap();
        assert_eq!(settings.auth_type, Some(AuthType::Anthropic));
        assert_eq!(settings.model.name.as_deref(), Some("claude-sonnet"));
        assert_eq!(
            settings.model.generation_config.reasoning_effort,
            Some(ReasoningEffort::High)
        );

        let layer = settings.to_layer().unwrap();
        assert_eq!(layer.timeout, Some(Duration::from_secs(90)));
        assert_eq!(layer.max_retries, Some(5));
        assert_eq!(layer.api_key.as_ref().map(ExposeSecret::expose_secret), Some("sk-ant"));
        assert_eq!(
            layer.details.get(&ConfigField::Temperature).map(String::as_str),
            Some("model.generationConfig.temperature")
        );
        assert_eq!(layer.details.get(&ConfigField::Model).map(String::as_str), Some("model.name"));
        assert!(!layer.details.contains_key(&ConfigField::TopP));
    }

    #[test]
    fn rejects_unknown_keys() {
        let result: Result<Settings, _> = toml::from_str("[model]\nnmae = \"typo\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn invalid_timeout_fails_layer_conversion() {
        let settings: Settings = toml::from_str("[model]\ntimeout = \"soon\"\n").unwrap();
        let err = settings.to_layer().unwrap_err();
        assert!(err.to_string().contains("invalid model.timeout"));
    }

    fn dedent(text: &str) -> String {
        text.lines().map(str::trim_start).collect::<Vec<_>>().join("\n")
    }
}
