//! Per-field provenance for resolved configuration

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use strum::{AsRefStr, Display, EnumIter, IntoEnumIterator};

/// A configuration field that takes part in resolution
///
/// Resolution walks this fixed list and merges every field on its own,
/// so each one ends up with exactly one provenance entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Display, AsRefStr, EnumIter)]
pub enum ConfigField {
    #[strum(serialize = "authType")]
    #[serde(rename = "authType")]
    AuthType,
    #[strum(serialize = "model")]
    #[serde(rename = "model")]
    Model,
    #[strum(serialize = "apiKey")]
    #[serde(rename = "apiKey")]
    ApiKey,
    #[strum(serialize = "baseUrl")]
    #[serde(rename = "baseUrl")]
    BaseUrl,
    #[strum(serialize = "timeout")]
    #[serde(rename = "timeout")]
    Timeout,
    #[strum(serialize = "maxRetries")]
    #[serde(rename = "maxRetries")]
    MaxRetries,
    #[strum(serialize = "customHeaders")]
    #[serde(rename = "customHeaders")]
    CustomHeaders,
    #[strum(serialize = "proxy")]
    #[serde(rename = "proxy")]
    Proxy,
    #[strum(serialize = "generationConfig.temperature")]
    #[serde(rename = "generationConfig.temperature")]
    Temperature,
    #[strum(serialize = "generationConfig.topP")]
    #[serde(rename = "generationConfig.topP")]
    TopP,
    #[strum(serialize = "generationConfig.topK")]
    #[serde(rename = "generationConfig.topK")]
    TopK,
    #[strum(serialize = "generationConfig.presencePenalty")]
    #[serde(rename = "generationConfig.presencePenalty")]
    PresencePenalty,
    #[strum(serialize = "generationConfig.frequencyPenalty")]
    #[serde(rename = "generationConfig.frequencyPenalty")]
    FrequencyPenalty,
    #[strum(serialize = "generationConfig.maxOutputTokens")]
    #[serde(rename = "generationConfig.maxOutputTokens")]
    MaxOutputTokens,
    #[strum(serialize = "generationConfig.reasoningEffort")]
    #[serde(rename = "generationConfig.reasoningEffort")]
    ReasoningEffort,
}

impl ConfigField {
    /// Every resolvable field, in resolution order
    pub fn all() -> impl Iterator<Item = Self> {
        Self::iter()
    }

    /// Fields the resolver always computes itself
    pub const fn is_computed(self) -> bool {
        matches!(self, Self::AuthType | Self::Proxy)
    }

    /// Fields that belong to the generation config block
    pub const fn is_generation(self) -> bool {
        matches!(
            self,
            Self::Temperature
                | Self::TopP
                | Self::TopK
                | Self::PresencePenalty
                | Self::FrequencyPenalty
                | Self::MaxOutputTokens
                | Self::ReasoningEffort
        )
    }
}

/// Which configuration layer supplied a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, AsRefStr)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ProvenanceKind {
    /// Session settings file
    Settings,
    /// Explicit command-line or per-call override
    Cli,
    /// Environment variable
    Env,
    /// Derived by the resolver
    Computed,
    /// Default declared by the provider
    ProviderDefault,
    /// Value present without a known source
    Unknown,
}

/// Source of one resolved field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Provenance {
    /// Layer kind
    pub kind: ProvenanceKind,
    /// Human-readable pointer into that layer (setting path, variable name, flag)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Provenance {
    /// Provenance without detail
    pub const fn new(kind: ProvenanceKind) -> Self {
        Self { kind, detail: None }
    }

    /// Provenance pointing at a specific key inside the layer
    pub fn with_detail(kind: ProvenanceKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: Some(detail.into()),
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{} ({detail})", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// Provenance of every resolved field
///
/// Entries are write-once: the first recorded source for a field stands
/// for the rest of the resolution pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ProvenanceMap {
    entries: BTreeMap<ConfigField, Provenance>,
}

impl ProvenanceMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the source of a field unless one is already recorded
    ///
    /// Returns `false` when the field already had a provenance.
    pub fn record(&mut self, field: ConfigField, provenance: Provenance) -> bool {
        if self.entries.contains_key(&field) {
            return false;
        }
        self.entries.insert(field, provenance);
        true
    }

    /// Provenance of a field, if resolved
    pub fn get(&self, field: ConfigField) -> Option<&Provenance> {
        self.entries.get(&field)
    }

    /// Iterate recorded entries in field order
    pub fn iter(&self) -> impl Iterator<Item = (ConfigField, &Provenance)> {
        self.entries.iter().map(|(field, provenance)| (*field, provenance))
    }

    /// Number of recorded fields
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been recorded yet
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(ConfigField, Provenance)> for ProvenanceMap {
    fn from_iter<T: IntoIterator<Item = (ConfigField, Provenance)>>(iter: T) -> Self {
        let mut map = Self::new();
        for (field, provenance) in iter {
            map.record(field, provenance);
        }
        map
    }
}
