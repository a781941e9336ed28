//! Conversation turns and their parts

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Author of a content turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The user, including tool results sent back to the model
    User,
    /// The model
    Model,
}

/// One turn of a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    /// Who produced the turn
    pub role: Role,
    /// Ordered parts of the turn
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    /// A user turn
    pub const fn user(parts: Vec<Part>) -> Self {
        Self { role: Role::User, parts }
    }

    /// A model turn
    pub const fn model(parts: Vec<Part>) -> Self {
        Self { role: Role::Model, parts }
    }

    /// Concatenated text of all plain text parts
    pub fn text(&self) -> String {
        self.parts.iter().filter_map(Part::as_text).collect()
    }

    /// Function calls in this turn, in order
    pub fn function_calls(&self) -> impl Iterator<Item = &FunctionCall> {
        self.parts.iter().filter_map(|part| match part {
            Part::FunctionCall(call) => Some(call),
            _ => None,
        })
    }
}

/// One typed fragment of a content turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Part {
    /// Plain text
    Text { text: String },
    /// Reasoning text the model produced before answering
    Thought { text: String },
    /// A tool invocation requested by the model
    FunctionCall(FunctionCall),
    /// The result of a tool invocation
    FunctionResponse(FunctionResponse),
    /// Base64-encoded media carried inline
    InlineData(Blob),
    /// Media referenced by URI
    FileData(FileData),
}

impl Part {
    /// A plain text part
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// A thought part
    pub fn thought(text: impl Into<String>) -> Self {
        Self::Thought { text: text.into() }
    }

    /// Text of a plain text part
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// A tool invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCall {
    /// Call identifier pairing the call with its response
    pub id: String,
    /// Tool name
    pub name: String,
    /// Parsed arguments
    #[serde(default)]
    pub args: Map<String, Value>,
    /// Set when streamed arguments could not be parsed; `args` is then empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args_error: Option<String>,
}

impl FunctionCall {
    /// A well-formed call
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
            args_error: None,
        }
    }
}

/// The result of a tool invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionResponse {
    /// Identifier of the call this answers
    pub id: String,
    /// Tool name
    pub name: String,
    /// Structured result, conventionally with `output`, `error` or `data`
    #[serde(default)]
    pub response: Map<String, Value>,
    /// Media produced by the tool
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parts: Vec<Part>,
}

impl FunctionResponse {
    /// Text summarising the response
    ///
    /// Takes `error`, then `output`, then `data`; otherwise the JSON of a
    /// non-empty response. Returns `None` when nothing textual is present.
    pub fn text(&self) -> Option<String> {
        for key in ["error", "output", "data"] {
            match self.response.get(key) {
                Some(Value::String(text)) => return Some(text.clone()),
                Some(Value::Null) | None => {}
                Some(other) => return Some(other.to_string()),
            }
        }

        if self.response.is_empty() {
            None
        } else {
            Some(Value::Object(self.response.clone()).to_string())
        }
    }

    /// Media parts attached to the response
    pub fn media(&self) -> impl Iterator<Item = &Part> {
        self.parts
            .iter()
            .filter(|part| matches!(part, Part::InlineData(_) | Part::FileData(_)))
    }
}

/// Inline media
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    /// MIME type, for example `image/png`
    pub mime_type: String,
    /// Base64 payload
    pub data: String,
    /// Name shown to users, such as the original file name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Media referenced by URI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileData {
    /// MIME type
    pub mime_type: String,
    /// Location of the file
    pub file_uri: String,
    /// Name shown to users
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn response(value: Value) -> FunctionResponse {
        FunctionResponse {
            id: "call_1".to_owned(),
            name: "shell".to_owned(),
            response: value.as_object().cloned().unwrap_or_default(),
            parts: Vec::new(),
        }
    }

    #[test]
    fn error_takes_precedence_over_output() {
        let r = response(json!({"output": "partial", "error": "Command failed"}));
        assert_eq!(r.text().as_deref(), Some("Command failed"));
    }

    #[test]
    fn data_is_used_after_output() {
        assert_eq!(response(json!({"data": "d"})).text().as_deref(), Some("d"));
        assert_eq!(response(json!({"output": "o", "data": "d"})).text().as_deref(), Some("o"));
    }

    #[test]
    fn other_fields_serialize_as_json() {
        let r = response(json!({"exitCode": 0}));
        assert_eq!(r.text().as_deref(), Some(r#"{"exitCode":0}"#));
        assert_eq!(response(json!({})).text(), None);
    }

    #[test]
    fn parts_use_type_tag() {
        let part = Part::InlineData(Blob {
            mime_type: "image/png".to_owned(),
            data: "AAAA".to_owned(),
            display_name: None,
        });
        let value = serde_json::to_value(&part).unwrap();
        assert_eq!(value, json!({"type": "inlineData", "mimeType": "image/png", "data": "AAAA"}));
        assert_eq!(serde_json::from_value::<Part>(value).unwrap(), part);
    }
}
