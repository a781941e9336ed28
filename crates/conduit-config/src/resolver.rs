//! Effective configuration resolution with provenance

use std::time::Duration;

use indexmap::IndexMap;
use secrecy::SecretString;
use url::Url;

use crate::auth::AuthType;
use crate::generation::SamplingParams;
use crate::layer::{ConfigLayer, DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT};
use crate::provenance::{ConfigField, Provenance, ProvenanceKind, ProvenanceMap};
use crate::validation::{ConfigErrors, validate};

/// Effective configuration a content generator is built from
#[derive(Debug, Clone)]
pub struct ContentGeneratorConfig {
    /// Auth type selecting the provider adapter
    pub auth_type: AuthType,
    /// Model identifier sent to the backend
    pub model: String,
    /// Static API key (absent for dynamically refreshed tokens)
    pub api_key: Option<SecretString>,
    /// Backend base URL override
    pub base_url: Option<Url>,
    /// Per-request timeout
    pub timeout: Duration,
    /// Transport-level retries performed by the client
    pub max_retries: u32,
    /// Headers added to every request, winning over built-in headers
    pub custom_headers: IndexMap<String, String>,
    /// Default sampling parameters
    pub sampling: SamplingParams,
    /// Outbound HTTP proxy
    pub proxy: Option<Url>,
}

impl ContentGeneratorConfig {
    /// Empty configuration for an auth type with transport defaults
    pub fn new(auth_type: AuthType) -> Self {
        Self {
            auth_type,
            model: String::new(),
            api_key: None,
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            custom_headers: IndexMap::new(),
            sampling: SamplingParams::default(),
            proxy: None,
        }
    }
}

/// Resolved configuration together with the source of every field
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: ContentGeneratorConfig,
    pub provenance: ProvenanceMap,
}

/// Knobs for a resolution pass
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Require credentials and model to be configured for the chosen provider
    pub strict_model_provider: bool,
    /// Proxy computed by the caller (for example from the process environment)
    pub proxy: Option<Url>,
}

/// Resolve the effective configuration for one auth type
///
/// Precedence, lowest first: `base` with its `seed` provenance, then the
/// explicit generation fields, then computed fields (`authType`, `proxy`).
/// Every field is settled exactly once, so its provenance never changes
/// within the pass. A value from `base` without a seed entry is tagged
/// [`ProvenanceKind::Unknown`].
pub fn resolve(
    base: &ConfigLayer,
    auth_type: AuthType,
    explicit: &SamplingParams,
    seed: &ProvenanceMap,
    options: &ResolveOptions,
) -> ResolvedConfig {
    let explicit_layer = ConfigLayer {
        sampling: explicit.clone(),
        ..ConfigLayer::default()
    };

    let mut merged = ConfigLayer::default();
    let mut provenance = ProvenanceMap::new();

    for field in ConfigField::all() {
        if field.is_computed() {
            let present = match field {
                ConfigField::AuthType => true,
                _ => options.proxy.is_some(),
            };
            if present {
                provenance.record(field, Provenance::new(ProvenanceKind::Computed));
            }
            continue;
        }

        if field.is_generation() && merged.copy_field(&explicit_layer, field) {
            provenance.record(field, Provenance::with_detail(ProvenanceKind::Cli, "generationConfig"));
            continue;
        }

        if merged.copy_field(base, field) {
            let source = seed
                .get(field)
                .cloned()
                .unwrap_or_else(|| Provenance::new(ProvenanceKind::Unknown));
            provenance.record(field, source);
        }
    }

    let mut config = ContentGeneratorConfig::new(auth_type);
    config.model = merged.model.unwrap_or_default();
    config.api_key = merged.api_key;
    config.base_url = merged.base_url;
    if let Some(timeout) = merged.timeout {
        config.timeout = timeout;
    }
    if let Some(max_retries) = merged.max_retries {
        config.max_retries = max_retries;
    }
    config.custom_headers = merged.custom_headers.unwrap_or_default();
    config.sampling = merged.sampling;
    config.proxy.clone_from(&options.proxy);

    tracing::debug!(
        auth_type = %auth_type,
        model = %config.model,
        fields = provenance.len(),
        "resolved content generator configuration"
    );

    ResolvedConfig { config, provenance }
}

/// Resolve and then validate in one step
///
/// # Errors
///
/// Returns every validation problem found in the resolved configuration.
pub fn resolve_and_validate(
    base: &ConfigLayer,
    auth_type: AuthType,
    explicit: &SamplingParams,
    seed: &ProvenanceMap,
    options: &ResolveOptions,
) -> Result<ResolvedConfig, ConfigErrors> {
    let resolved = resolve(base, auth_type, explicit, seed, options);
    validate(&resolved.config, options.strict_model_provider)?;
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;
    use crate::validation::ConfigValidationError;

    fn base_with_model(model: &str) -> (ConfigLayer, ProvenanceMap) {
        let mut base = ConfigLayer::default();
        base.model = Some(model.to_owned());
        base.sampling.temperature = Some(0.7);
        base.sampling.top_p = Some(0.8);

        let seed = [
            (ConfigField::Model, Provenance::with_detail(ProvenanceKind::Settings, "model.name")),
            (
                ConfigField::Temperature,
                Provenance::with_detail(ProvenanceKind::Settings, "model.generationConfig.temperature"),
            ),
        ]
        .into_iter()
        .collect();

        (base, seed)
    }

    #[test]
    fn explicit_generation_overrides_seeded_values() {
        let (base, seed) = base_with_model("qwen3-coder-plus");
        let explicit = SamplingParams {
            temperature: Some(0.1),
            ..SamplingParams::default()
        };

        let resolved = resolve(&base, AuthType::OpenAi, &explicit, &seed, &ResolveOptions::default());

        assert_eq!(resolved.config.sampling.temperature, Some(0.1));
        assert_eq!(resolved.config.sampling.top_p, Some(0.8));
        assert_eq!(
            resolved.provenance.get(ConfigField::Temperature).map(|p| p.kind),
            Some(ProvenanceKind::Cli)
        );
        assert_eq!(
            resolved.provenance.get(ConfigField::Model),
            Some(&Provenance::with_detail(ProvenanceKind::Settings, "model.name"))
        );
    }

    #[test]
    fn unseeded_values_are_tagged_unknown() {
        let (base, seed) = base_with_model("m");
        let resolved = resolve(
            &base,
            AuthType::OpenAi,
            &SamplingParams::default(),
            &seed,
            &ResolveOptions::default(),
        );

        assert_eq!(
            resolved.provenance.get(ConfigField::TopP).map(|p| p.kind),
            Some(ProvenanceKind::Unknown)
        );
    }

    #[test]
    fn computed_fields_are_marked_computed() {
        let (base, seed) = base_with_model("m");
        let options = ResolveOptions {
            strict_model_provider: false,
            proxy: Some(Url::parse("http://proxy.local:3128").unwrap()),
        };

        let resolved = resolve(&base, AuthType::Gemini, &SamplingParams::default(), &seed, &options);

        assert_eq!(resolved.config.auth_type, AuthType::Gemini);
        assert_eq!(resolved.config.proxy.as_ref().map(Url::as_str), Some("http://proxy.local:3128/"));
        assert_eq!(
            resolved.provenance.get(ConfigField::AuthType).map(|p| p.kind),
            Some(ProvenanceKind::Computed)
        );
        assert_eq!(
            resolved.provenance.get(ConfigField::Proxy).map(|p| p.kind),
            Some(ProvenanceKind::Computed)
        );
    }

    #[test]
    fn missing_fields_fall_back_to_transport_defaults() {
        let resolved = resolve(
            &ConfigLayer::default(),
            AuthType::OpenAi,
            &SamplingParams::default(),
            &ProvenanceMap::new(),
            &ResolveOptions::default(),
        );

        assert_eq!(resolved.config.timeout, DEFAULT_TIMEOUT);
        assert_eq!(resolved.config.max_retries, DEFAULT_MAX_RETRIES);
        assert!(resolved.provenance.get(ConfigField::Timeout).is_none());
    }

    #[test]
    fn lenient_missing_key_yields_single_error() {
        let (base, seed) = base_with_model("gpt-4o");
        let err = resolve_and_validate(
            &base,
            AuthType::OpenAi,
            &SamplingParams::default(),
            &seed,
            &ResolveOptions::default(),
        )
        .unwrap_err();

        assert_eq!(
            err.errors(),
            &[ConfigValidationError::MissingApiKey {
                auth_type: AuthType::OpenAi,
                env_var: "OPENAI_API_KEY",
            }]
        );
    }

    #[test]
    fn valid_configuration_passes() {
        let (mut base, seed) = base_with_model("gpt-4o");
        base.api_key = Some(SecretString::from("sk-live"));

        let resolved = resolve_and_validate(
            &base,
            AuthType::OpenAi,
            &SamplingParams::default(),
            &seed,
            &ResolveOptions::default(),
        )
        .unwrap();

        assert_eq!(
            resolved.config.api_key.as_ref().map(ExposeSecret::expose_secret),
            Some("sk-live")
        );
    }
}
