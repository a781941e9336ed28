//! Conversion between canonical types and the Gemini `generateContent` format
//!
//! The canonical model follows Gemini closely, so parts map one to one.

use conduit_config::ReasoningEffort;

use crate::protocol::gemini::{
    GeminiCandidate, GeminiContent, GeminiEmbedRequest, GeminiFileData, GeminiFunctionCall, GeminiFunctionDeclaration,
    GeminiFunctionResponse, GeminiGenerationConfig, GeminiInlineData, GeminiPart, GeminiRequest, GeminiResponse,
    GeminiThinkingConfig, GeminiTool, GeminiUsageMetadata,
};
use crate::types::{
    Blob, Candidate, Content, FileData, FinishReason, FunctionCall, FunctionResponse, GenerateRequest,
    GenerateResponse, GenerationConfig, Part, Role, UsageMetadata,
};

// -- Outbound: canonical request -> Gemini wire request --

impl From<&GenerateRequest> for GeminiRequest {
    fn from(request: &GenerateRequest) -> Self {
        let system_instruction = request
            .system_instruction
            .as_deref()
            .filter(|text| !text.is_empty())
            .map(|text| GeminiContent {
                role: None,
                parts: vec![GeminiPart {
                    text: Some(text.to_owned()),
                    ..GeminiPart::default()
                }],
            });

        let tools = (!request.tools.is_empty()).then(|| {
            vec![GeminiTool {
                function_declarations: request
                    .tools
                    .iter()
                    .map(|tool| GeminiFunctionDeclaration {
                        name: tool.name.clone(),
                        description: tool.description.clone(),
                        parameters: tool.parameters.clone(),
                    })
                    .collect(),
            }]
        });

        Self {
            contents: request.contents.iter().map(Into::into).collect(),
            system_instruction,
            generation_config: generation_config(&request.config),
            tools,
        }
    }
}

impl From<&Content> for GeminiContent {
    fn from(content: &Content) -> Self {
        let role = match content.role {
            Role::User => "user",
            Role::Model => "model",
        };

        Self {
            role: Some(role.to_owned()),
            parts: content.parts.iter().flat_map(part_to_gemini).collect(),
        }
    }
}

/// Wire parts for one canonical part
///
/// A function response carrying media becomes the response part followed
/// by one part per media item.
fn part_to_gemini(part: &Part) -> Vec<GeminiPart> {
    let single = match part {
        Part::Text { text } => GeminiPart {
            text: Some(text.clone()),
            ..GeminiPart::default()
        },
        Part::Thought { text } => GeminiPart {
            text: Some(text.clone()),
            thought: Some(true),
            ..GeminiPart::default()
        },
        Part::InlineData(blob) => GeminiPart {
            inline_data: Some(GeminiInlineData {
                mime_type: blob.mime_type.clone(),
                data: blob.data.clone(),
                display_name: blob.display_name.clone(),
            }),
            ..GeminiPart::default()
        },
        Part::FileData(file) => GeminiPart {
            file_data: Some(GeminiFileData {
                mime_type: file.mime_type.clone(),
                file_uri: file.file_uri.clone(),
                display_name: file.display_name.clone(),
            }),
            ..GeminiPart::default()
        },
        Part::FunctionCall(call) => GeminiPart {
            function_call: Some(GeminiFunctionCall {
                id: Some(call.id.clone()).filter(|id| !id.is_empty()),
                name: call.name.clone(),
                args: call.args.clone(),
            }),
            ..GeminiPart::default()
        },
        Part::FunctionResponse(response) => {
            let mut parts = vec![GeminiPart {
                function_response: Some(GeminiFunctionResponse {
                    id: Some(response.id.clone()).filter(|id| !id.is_empty()),
                    name: response.name.clone(),
                    response: response.response.clone(),
                }),
                ..GeminiPart::default()
            }];
            parts.extend(response.media().flat_map(part_to_gemini));
            return parts;
        }
    };

    vec![single]
}

fn generation_config(config: &GenerationConfig) -> Option<GeminiGenerationConfig> {
    let sampling = &config.sampling;

    let thinking_config = match sampling.reasoning_effort {
        None => None,
        Some(ReasoningEffort::Disabled) => Some(GeminiThinkingConfig {
            include_thoughts: None,
            thinking_budget: Some(0),
        }),
        Some(effort) => Some(GeminiThinkingConfig {
            include_thoughts: Some(true),
            thinking_budget: effort.budget_tokens(),
        }),
    };

    let wire = GeminiGenerationConfig {
        temperature: sampling.temperature,
        top_p: sampling.top_p,
        top_k: sampling.top_k,
        max_output_tokens: sampling.max_output_tokens,
        presence_penalty: sampling.presence_penalty,
        frequency_penalty: sampling.frequency_penalty,
        stop_sequences: (!config.stop_sequences.is_empty()).then(|| config.stop_sequences.clone()),
        seed: config.seed,
        thinking_config,
    };

    let empty = wire.temperature.is_none()
        && wire.top_p.is_none()
        && wire.top_k.is_none()
        && wire.max_output_tokens.is_none()
        && wire.presence_penalty.is_none()
        && wire.frequency_penalty.is_none()
        && wire.stop_sequences.is_none()
        && wire.seed.is_none()
        && wire.thinking_config.is_none();

    (!empty).then_some(wire)
}

/// `embedContent` request for a piece of text
pub fn embed_request(text: &str) -> GeminiEmbedRequest {
    GeminiEmbedRequest {
        content: GeminiContent {
            role: None,
            parts: vec![GeminiPart {
                text: Some(text.to_owned()),
                ..GeminiPart::default()
            }],
        },
    }
}

// -- Inbound: Gemini wire response -> canonical response --

/// Also used for stream increments: Gemini streams whole parts per event,
/// so no cross-event state is needed.
impl From<GeminiResponse> for GenerateResponse {
    fn from(response: GeminiResponse) -> Self {
        Self {
            response_id: response.response_id,
            model_version: response.model_version,
            candidates: (0_u32..)
                .zip(response.candidates)
                .map(|(position, candidate)| candidate_to_canonical(candidate, position))
                .collect(),
            usage_metadata: response.usage_metadata.as_ref().map(Into::into),
        }
    }
}

fn candidate_to_canonical(candidate: GeminiCandidate, position: u32) -> Candidate {
    let role = match candidate.content.role.as_deref() {
        Some("user") => Role::User,
        _ => Role::Model,
    };

    Candidate {
        index: candidate.index.unwrap_or(position),
        content: Content {
            role,
            parts: candidate.content.parts.into_iter().filter_map(part_to_canonical).collect(),
        },
        finish_reason: candidate.finish_reason.as_deref().map(parse_finish_reason),
    }
}

fn part_to_canonical(part: GeminiPart) -> Option<Part> {
    if let Some(call) = part.function_call {
        let id = call
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));
        return Some(Part::FunctionCall(FunctionCall::new(id, call.name, call.args)));
    }

    if let Some(response) = part.function_response {
        return Some(Part::FunctionResponse(FunctionResponse {
            id: response.id.unwrap_or_default(),
            name: response.name,
            response: response.response,
            parts: Vec::new(),
        }));
    }

    if let Some(data) = part.inline_data {
        return Some(Part::InlineData(Blob {
            mime_type: data.mime_type,
            data: data.data,
            display_name: data.display_name,
        }));
    }

    if let Some(file) = part.file_data {
        return Some(Part::FileData(FileData {
            mime_type: file.mime_type,
            file_uri: file.file_uri,
            display_name: file.display_name,
        }));
    }

    let text = part.text.filter(|text| !text.is_empty())?;
    if part.thought == Some(true) {
        Some(Part::thought(text))
    } else {
        Some(Part::text(text))
    }
}

impl From<&GeminiUsageMetadata> for UsageMetadata {
    fn from(usage: &GeminiUsageMetadata) -> Self {
        Self {
            prompt_token_count: usage.prompt_token_count,
            candidates_token_count: usage.candidates_token_count,
            thoughts_token_count: usage.thoughts_token_count,
            cached_content_token_count: usage.cached_content_token_count,
            total_token_count: usage.total_token_count,
        }
    }
}

/// Map a Gemini finish reason
pub fn parse_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "STOP" => FinishReason::Stop,
        "MAX_TOKENS" => FinishReason::MaxTokens,
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII" | "IMAGE_SAFETY" => {
            FinishReason::Safety
        }
        "MALFORMED_FUNCTION_CALL" => FinishReason::MalformedFunctionCall,
        _ => FinishReason::Other,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parts_map_one_to_one() {
        let mut request = GenerateRequest::new(vec![
            Content::user(vec![Part::text("hi")]),
            Content::model(vec![
                Part::thought("plan"),
                Part::FunctionCall(FunctionCall::new(
                    "c1",
                    "read",
                    json!({"path": "a"}).as_object().cloned().unwrap(),
                )),
            ]),
        ]);
        request.system_instruction = Some("sys".to_owned());

        let wire = serde_json::to_value(GeminiRequest::from(&request)).unwrap();

        assert_eq!(wire["systemInstruction"], json!({"parts": [{"text": "sys"}]}));
        assert_eq!(wire["contents"][0], json!({"role": "user", "parts": [{"text": "hi"}]}));
        assert_eq!(
            wire["contents"][1]["parts"],
            json!([
                {"text": "plan", "thought": true},
                {"functionCall": {"id": "c1", "name": "read", "args": {"path": "a"}}}
            ])
        );
        assert!(wire.get("generationConfig").is_none());
    }

    #[test]
    fn function_response_media_follows_response() {
        let request = GenerateRequest::new(vec![Content::user(vec![Part::FunctionResponse(FunctionResponse {
            id: "c1".to_owned(),
            name: "shot".to_owned(),
            response: json!({"output": "ok"}).as_object().cloned().unwrap(),
            parts: vec![Part::InlineData(Blob {
                mime_type: "image/png".to_owned(),
                data: "AA".to_owned(),
                display_name: None,
            })],
        })])]);

        let wire = GeminiRequest::from(&request);
        let parts = &wire.contents[0].parts;
        assert_eq!(parts.len(), 2);
        assert!(parts[0].function_response.is_some());
        assert_eq!(parts[1].inline_data.as_ref().unwrap().mime_type, "image/png");
    }

    #[test]
    fn reasoning_effort_sets_thinking_budget() {
        let mut request = GenerateRequest::default();
        request.config.sampling.reasoning_effort = Some(ReasoningEffort::Medium);
        let config = GeminiRequest::from(&request).generation_config.unwrap();
        assert_eq!(
            config.thinking_config,
            Some(GeminiThinkingConfig {
                include_thoughts: Some(true),
                thinking_budget: Some(8192),
            })
        );

        request.config.sampling.reasoning_effort = Some(ReasoningEffort::Disabled);
        let config = GeminiRequest::from(&request).generation_config.unwrap();
        assert_eq!(config.thinking_config.unwrap().thinking_budget, Some(0));
    }

    #[test]
    fn response_maps_thoughts_and_calls() {
        let response: GeminiResponse = serde_json::from_value(json!({
            "responseId": "r1",
            "modelVersion": "gemini-2.5-pro",
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"text": "hmm", "thought": true},
                    {"text": "done"},
                    {"functionCall": {"name": "ls", "args": {}}}
                ]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 5, "candidatesTokenCount": 3, "thoughtsTokenCount": 1, "totalTokenCount": 9}
        }))
        .unwrap();

        let canonical = GenerateResponse::from(response);
        let parts = canonical.parts();
        assert_eq!(parts[0], Part::thought("hmm"));
        assert_eq!(parts[1], Part::text("done"));
        let Part::FunctionCall(call) = &parts[2] else {
            panic!("expected a function call");
        };
        assert!(call.id.starts_with("call_"));
        assert_eq!(canonical.finish_reason(), Some(FinishReason::Stop));
        assert_eq!(canonical.usage_metadata.unwrap().thoughts_token_count, 1);
        assert_eq!(canonical.response_id.as_deref(), Some("r1"));
    }

    #[test]
    fn finish_reasons() {
        assert_eq!(parse_finish_reason("MAX_TOKENS"), FinishReason::MaxTokens);
        assert_eq!(parse_finish_reason("RECITATION"), FinishReason::Safety);
        assert_eq!(
            parse_finish_reason("MALFORMED_FUNCTION_CALL"),
            FinishReason::MalformedFunctionCall
        );
        assert_eq!(parse_finish_reason("FINISH_REASON_UNSPECIFIED"), FinishReason::Other);
    }
}
