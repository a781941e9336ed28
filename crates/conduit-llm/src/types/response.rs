use serde::{Deserialize, Serialize};

use super::content::{Content, FunctionCall, Part};

/// Backend-agnostic generation response
///
/// Also used for each increment of a streamed response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    /// Vendor response identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_id: Option<String>,
    /// Model that served the call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    /// Generated candidates
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    /// Token accounting for the whole response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<UsageMetadata>,
}

impl GenerateResponse {
    /// Concatenated text of the first candidate
    pub fn text(&self) -> String {
        self.candidates.first().map(|c| c.content.text()).unwrap_or_default()
    }

    /// Function calls of the first candidate
    pub fn function_calls(&self) -> Vec<&FunctionCall> {
        self.candidates
            .first()
            .map(|c| c.content.function_calls().collect())
            .unwrap_or_default()
    }

    /// Parts of the first candidate
    pub fn parts(&self) -> &[Part] {
        self.candidates.first().map_or(&[], |c| c.content.parts.as_slice())
    }

    /// Finish reason of the first candidate
    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.candidates.first().and_then(|c| c.finish_reason)
    }
}

/// One generated alternative
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    /// Position among the candidates
    #[serde(default)]
    pub index: u32,
    /// Generated turn
    pub content: Content,
    /// Why generation stopped, absent on intermediate increments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

/// Why generation stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinishReason {
    /// Natural end or stop sequence
    Stop,
    /// Output token limit reached
    MaxTokens,
    /// Blocked by a content filter
    Safety,
    /// The model produced an unusable tool call
    MalformedFunctionCall,
    /// Anything else
    Other,
}

/// Token accounting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    /// Input tokens
    #[serde(default)]
    pub prompt_token_count: u32,
    /// Output tokens
    #[serde(default)]
    pub candidates_token_count: u32,
    /// Reasoning tokens, included in the output count by most vendors
    #[serde(default)]
    pub thoughts_token_count: u32,
    /// Input tokens served from a prompt cache
    #[serde(default)]
    pub cached_content_token_count: u32,
    /// Total tokens billed
    #[serde(default)]
    pub total_token_count: u32,
}
