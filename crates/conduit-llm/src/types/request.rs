use conduit_config::{ReasoningEffort, SamplingParams};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::content::Content;

/// Backend-agnostic generation request
#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    /// Model override; the configured model is used when absent
    pub model: Option<String>,
    /// Conversation turns, oldest first
    pub contents: Vec<Content>,
    /// System prompt
    pub system_instruction: Option<String>,
    /// Tools the model may call
    pub tools: Vec<FunctionDeclaration>,
    /// Per-request generation parameters
    pub config: GenerationConfig,
    /// Identifier of the user prompt this call serves
    pub prompt_id: Option<String>,
    /// Token the caller cancels to abort the call
    pub cancellation: Option<CancellationToken>,
}

impl GenerateRequest {
    /// Request over the given turns
    pub fn new(contents: Vec<Content>) -> Self {
        Self {
            contents,
            ..Self::default()
        }
    }

    /// Whether the caller has cancelled this request
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.as_ref().is_some_and(CancellationToken::is_cancelled)
    }
}

/// Generation parameters
///
/// Unset fields fall back to the effective configuration and then to the
/// provider defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Sampling and length parameters
    #[serde(default)]
    pub sampling: SamplingParams,
    /// Sequences that stop generation
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,
    /// Seed for deterministic sampling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl GenerationConfig {
    /// Reasoning effort, if any was requested
    pub const fn reasoning_effort(&self) -> Option<ReasoningEffort> {
        self.sampling.reasoning_effort
    }
}

/// A tool the model may call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDeclaration {
    /// Tool name
    pub name: String,
    /// What the tool does
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON schema of the arguments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}
