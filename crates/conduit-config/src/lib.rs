#![allow(clippy::must_use_candidate)]

//! Configuration for conduit: settings file, layered sources, and the
//! resolver producing the effective content-generator configuration.

pub mod auth;
pub mod cache;
mod env;
pub mod generation;
pub mod layer;
mod loader;
pub mod logging;
pub mod provenance;
pub mod resolver;
pub mod settings;
pub mod validation;

pub use auth::AuthType;
pub use cache::ConfigCache;
pub use env::{EnvExpansionError, expand_env, expand_env_with};
pub use generation::{ReasoningEffort, SamplingParams};
pub use layer::{ConfigLayer, LayeredSources};
pub use logging::{LogFormat, LoggingConfig};
pub use provenance::{ConfigField, Provenance, ProvenanceKind, ProvenanceMap};
pub use resolver::{ContentGeneratorConfig, ResolveOptions, ResolvedConfig, resolve, resolve_and_validate};
pub use settings::{ModelSettings, Settings};
pub use validation::{ConfigErrors, ConfigValidationError, validate};
