//! Configuration validation, collecting every problem before any network call

use std::fmt;

use secrecy::ExposeSecret;
use thiserror::Error;

use crate::auth::AuthType;
use crate::resolver::ContentGeneratorConfig;

/// A single problem found while validating resolved configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigValidationError {
    /// No API key and the default variable for the auth type is unset
    #[error("missing API key for auth type '{auth_type}': set {env_var} or configure an API key")]
    MissingApiKey { auth_type: AuthType, env_var: &'static str },

    /// No API key while strict model-provider mode is enabled
    #[error("missing credentials for auth type '{auth_type}': an API key must be configured explicitly for the selected model provider")]
    StrictMissingCredentials { auth_type: AuthType },

    /// No model id and the default variable for the auth type is unset
    #[error("missing model for auth type '{auth_type}': set {env_var} or configure a model")]
    MissingModel { auth_type: AuthType, env_var: &'static str },

    /// No model id while strict model-provider mode is enabled
    #[error("missing model for auth type '{auth_type}': a model must be configured explicitly for the selected model provider")]
    StrictMissingModel { auth_type: AuthType },

    /// The auth type needs an explicit base URL
    #[error("missing base URL for auth type '{auth_type}': set {env_var} or configure a base URL")]
    MissingBaseUrl { auth_type: AuthType, env_var: &'static str },
}

/// Every validation problem found in one pass
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct ConfigErrors(pub Vec<ConfigValidationError>);

impl ConfigErrors {
    /// Individual errors in discovery order
    pub fn errors(&self) -> &[ConfigValidationError] {
        &self.0
    }
}

impl fmt::Display for ConfigErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "invalid model configuration: {}", messages.join("; "))
    }
}

/// Check that the fields required by the auth type are present
///
/// Pure: reads nothing but `config`. All applicable errors are collected
/// rather than stopping at the first one.
///
/// # Errors
///
/// Returns every [`ConfigValidationError`] that applies.
pub fn validate(config: &ContentGeneratorConfig, strict_model_provider: bool) -> Result<(), ConfigErrors> {
    let auth_type = config.auth_type;

    if auth_type.uses_dynamic_token() {
        return Ok(());
    }

    let mut errors = Vec::new();

    let has_key = config
        .api_key
        .as_ref()
        .is_some_and(|key| !key.expose_secret().trim().is_empty());

    if !has_key {
        errors.push(match (strict_model_provider, auth_type.api_key_env_var()) {
            (false, Some(env_var)) => ConfigValidationError::MissingApiKey { auth_type, env_var },
            _ => ConfigValidationError::StrictMissingCredentials { auth_type },
        });
    }

    if config.model.trim().is_empty() {
        errors.push(match (strict_model_provider, auth_type.model_env_var()) {
            (false, Some(env_var)) => ConfigValidationError::MissingModel { auth_type, env_var },
            _ => ConfigValidationError::StrictMissingModel { auth_type },
        });
    }

    if auth_type.requires_base_url()
        && config.base_url.is_none()
        && let Some(env_var) = auth_type.base_url_env_var()
    {
        errors.push(ConfigValidationError::MissingBaseUrl { auth_type, env_var });
    }

    if errors.is_empty() { Ok(()) } else { Err(ConfigErrors(errors)) }
}
