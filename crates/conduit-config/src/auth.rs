use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Authentication scheme used to reach a model backend
///
/// The auth type selects both the credential rules applied during
/// validation and the provider adapter that will serve the calls.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString, AsRefStr, EnumIter,
)]
pub enum AuthType {
    /// `OpenAI`-compatible chat completions with a static API key
    #[serde(rename = "openai")]
    #[strum(serialize = "openai")]
    OpenAi,
    /// Qwen OAuth, `DashScope`-compatible endpoint with refreshed tokens
    #[serde(rename = "qwen-oauth")]
    #[strum(serialize = "qwen-oauth")]
    QwenOAuth,
    /// Gemini API key
    #[serde(rename = "gemini")]
    #[strum(serialize = "gemini")]
    Gemini,
    /// Vertex AI with a Google API key
    #[serde(rename = "vertex-ai")]
    #[strum(serialize = "vertex-ai")]
    VertexAi,
    /// Anthropic-compatible messages API
    #[serde(rename = "anthropic")]
    #[strum(serialize = "anthropic")]
    Anthropic,
}

impl AuthType {
    /// Whether credentials come from a token refreshed out of band
    ///
    /// Such auth types skip the API key and model presence checks.
    pub const fn uses_dynamic_token(self) -> bool {
        matches!(self, Self::QwenOAuth)
    }

    /// Environment variable that conventionally holds the API key
    pub const fn api_key_env_var(self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("OPENAI_API_KEY"),
            Self::Gemini => Some("GEMINI_API_KEY"),
            Self::VertexAi => Some("GOOGLE_API_KEY"),
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
            Self::QwenOAuth => None,
        }
    }

    /// Environment variable that conventionally holds the model id
    pub const fn model_env_var(self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("OPENAI_MODEL"),
            Self::Gemini => Some("GEMINI_MODEL"),
            Self::VertexAi => Some("GOOGLE_MODEL"),
            Self::Anthropic => Some("ANTHROPIC_MODEL"),
            Self::QwenOAuth => None,
        }
    }

    /// Environment variable that conventionally holds the base URL
    pub const fn base_url_env_var(self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("OPENAI_BASE_URL"),
            Self::Anthropic => Some("ANTHROPIC_BASE_URL"),
            Self::Gemini | Self::VertexAi | Self::QwenOAuth => None,
        }
    }

    /// Whether this auth type cannot work without an explicit base URL
    pub const fn requires_base_url(self) -> bool {
        matches!(self, Self::Anthropic)
    }
}
