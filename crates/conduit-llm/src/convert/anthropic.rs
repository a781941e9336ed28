//! Conversion between canonical types and the Anthropic Messages format

use std::collections::{HashMap, HashSet};

use conduit_config::ReasoningEffort;
use serde_json::{Value, json};

use super::media::{self, MediaCategory};
use super::schema::normalize_schema;
use super::{ConversionOptions, OrphanToolCallPolicy};
use crate::accumulator::{FinalizedToolCall, ToolCallAccumulator};
use crate::error::LlmError;
use crate::protocol::anthropic::{
    AnthropicContentBlock, AnthropicMessage, AnthropicRequest, AnthropicResponse, AnthropicSource,
    AnthropicStreamContentBlock, AnthropicStreamDelta, AnthropicStreamEvent, AnthropicThinking, AnthropicTool,
    AnthropicUsage,
};
use crate::types::{
    Candidate, Content, FinishReason, FunctionCall, FunctionDeclaration, GenerateRequest, GenerateResponse, Part,
    Role, UsageMetadata,
};

/// Default max tokens when not specified (Anthropic requires this field)
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

const USER: &str = "user";
const ASSISTANT: &str = "assistant";

// -- Outbound: canonical request -> Anthropic wire request --

/// Build the Messages request for a canonical request
pub fn to_anthropic_request(
    request: &GenerateRequest,
    model: &str,
    stream: bool,
    options: &ConversionOptions,
) -> AnthropicRequest {
    let sampling = &request.config.sampling;

    let thinking = match sampling.reasoning_effort {
        None => None,
        Some(ReasoningEffort::Disabled) => Some(AnthropicThinking::Disabled),
        Some(effort) => effort
            .budget_tokens()
            .map(|budget_tokens| AnthropicThinking::Enabled { budget_tokens }),
    };

    // The thinking budget counts against max_tokens and must stay below it
    let mut max_tokens = sampling.max_output_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
    if let Some(AnthropicThinking::Enabled { budget_tokens }) = thinking
        && max_tokens <= budget_tokens
    {
        max_tokens = budget_tokens + DEFAULT_MAX_TOKENS;
    }

    AnthropicRequest {
        model: model.to_owned(),
        max_tokens,
        system: request.system_instruction.clone().filter(|s| !s.is_empty()),
        messages: contents_to_anthropic_messages(&request.contents, options),
        temperature: sampling.temperature,
        top_p: sampling.top_p,
        top_k: sampling.top_k,
        stop_sequences: (!request.config.stop_sequences.is_empty()).then(|| request.config.stop_sequences.clone()),
        stream: stream.then_some(true),
        tools: (!request.tools.is_empty()).then(|| request.tools.iter().map(Into::into).collect()),
        thinking,
    }
}

impl From<&FunctionDeclaration> for AnthropicTool {
    fn from(declaration: &FunctionDeclaration) -> Self {
        Self {
            name: declaration.name.clone(),
            description: declaration.description.clone(),
            input_schema: declaration
                .parameters
                .as_ref()
                .map_or_else(|| json!({"type": "object", "properties": {}}), normalize_schema),
        }
    }
}

/// Convert canonical turns into Messages API messages
///
/// Consecutive same-role turns merge into one message. Every `tool_use`
/// is answered in the following user message, according to the orphan
/// policy.
pub fn contents_to_anthropic_messages(contents: &[Content], options: &ConversionOptions) -> Vec<AnthropicMessage> {
    let mut messages: Vec<AnthropicMessage> = Vec::new();

    for content in contents {
        let role = match content.role {
            Role::User => USER,
            Role::Model => ASSISTANT,
        };
        let blocks: Vec<AnthropicContentBlock> = content.parts.iter().filter_map(part_to_block).collect();

        if blocks.is_empty() {
            continue;
        }

        match messages.last_mut() {
            Some(last) if last.role == role => last.content.extend(blocks),
            _ => messages.push(AnthropicMessage {
                role: role.to_owned(),
                content: blocks,
            }),
        }
    }

    pair_tool_results(messages, options.orphan_tool_calls)
}

fn part_to_block(part: &Part) -> Option<AnthropicContentBlock> {
    match part {
        Part::Text { text } if text.is_empty() => None,
        Part::Text { text } => Some(AnthropicContentBlock::Text { text: text.clone() }),
        Part::Thought { text } => Some(AnthropicContentBlock::Thinking {
            thinking: text.clone(),
            signature: None,
        }),
        Part::FunctionCall(call) => Some(AnthropicContentBlock::ToolUse {
            id: call.id.clone(),
            name: call.name.clone(),
            input: Value::Object(call.args.clone()),
        }),
        Part::FunctionResponse(response) => {
            let mut content: Vec<AnthropicContentBlock> = response
                .text()
                .map(|text| AnthropicContentBlock::Text { text })
                .into_iter()
                .collect();
            content.extend(response.media().filter_map(media_block));

            Some(AnthropicContentBlock::ToolResult {
                tool_use_id: response.id.clone(),
                content,
                is_error: response.response.contains_key("error").then_some(true),
            })
        }
        Part::InlineData(_) | Part::FileData(_) => media_block(part),
    }
}

fn media_block(part: &Part) -> Option<AnthropicContentBlock> {
    let (mime_type, source, display_name) = match part {
        Part::InlineData(blob) => (
            &blob.mime_type,
            AnthropicSource::Base64 {
                media_type: blob.mime_type.clone(),
                data: blob.data.clone(),
            },
            &blob.display_name,
        ),
        Part::FileData(file) => (
            &file.mime_type,
            AnthropicSource::Url {
                url: file.file_uri.clone(),
            },
            &file.display_name,
        ),
        _ => return None,
    };

    let block = match MediaCategory::classify(mime_type) {
        MediaCategory::Image => AnthropicContentBlock::Image { source },
        MediaCategory::Document => AnthropicContentBlock::Document {
            source,
            title: display_name.clone(),
        },
        MediaCategory::Audio | MediaCategory::Video | MediaCategory::Unsupported => {
            tracing::debug!(mime_type = %mime_type, "describing media the messages API cannot take as text");
            AnthropicContentBlock::Text {
                text: media::unsupported_description(mime_type, display_name.as_deref()),
            }
        }
    };

    Some(block)
}

fn pair_tool_results(messages: Vec<AnthropicMessage>, policy: OrphanToolCallPolicy) -> Vec<AnthropicMessage> {
    let mut paired: Vec<AnthropicMessage> = Vec::with_capacity(messages.len());
    let mut pending: Vec<String> = Vec::new();
    let mut answered: HashSet<String> = HashSet::new();

    for mut message in messages {
        if message.role == USER {
            message.content.retain(|block| match block {
                AnthropicContentBlock::ToolResult { tool_use_id, .. } => {
                    if answered.insert(tool_use_id.clone()) {
                        true
                    } else {
                        tracing::warn!(call_id = %tool_use_id, "dropping duplicate tool result");
                        false
                    }
                }
                _ => true,
            });

            let answered_here: HashSet<&str> = message
                .content
                .iter()
                .filter_map(|block| match block {
                    AnthropicContentBlock::ToolResult { tool_use_id, .. } => Some(tool_use_id.as_str()),
                    _ => None,
                })
                .collect();
            pending.retain(|id| !answered_here.contains(id.as_str()));

            let mut synthesized = synthesize_results(&mut pending, &mut answered, policy);
            if !synthesized.is_empty() {
                synthesized.append(&mut message.content);
                message.content = synthesized;
            }

            if !message.content.is_empty() {
                paired.push(message);
            }
            continue;
        }

        let synthesized = synthesize_results(&mut pending, &mut answered, policy);
        if !synthesized.is_empty() {
            paired.push(AnthropicMessage {
                role: USER.to_owned(),
                content: synthesized,
            });
        }

        pending.extend(message.content.iter().filter_map(|block| match block {
            AnthropicContentBlock::ToolUse { id, .. } => Some(id.clone()),
            _ => None,
        }));
        paired.push(message);
    }

    let synthesized = synthesize_results(&mut pending, &mut answered, policy);
    if !synthesized.is_empty() {
        paired.push(AnthropicMessage {
            role: USER.to_owned(),
            content: synthesized,
        });
    }

    paired
}

fn synthesize_results(
    pending: &mut Vec<String>,
    answered: &mut HashSet<String>,
    policy: OrphanToolCallPolicy,
) -> Vec<AnthropicContentBlock> {
    if policy == OrphanToolCallPolicy::Preserve {
        pending.clear();
        return Vec::new();
    }

    pending
        .drain(..)
        .map(|id| {
            tracing::debug!(call_id = %id, "synthesizing empty result for unanswered tool use");
            answered.insert(id.clone());
            AnthropicContentBlock::ToolResult {
                tool_use_id: id,
                content: Vec::new(),
                is_error: None,
            }
        })
        .collect()
}

// -- Inbound: Anthropic wire response -> canonical response --

impl From<AnthropicResponse> for GenerateResponse {
    fn from(response: AnthropicResponse) -> Self {
        let parts = response.content.into_iter().filter_map(block_to_part).collect();

        Self {
            response_id: Some(response.id).filter(|id| !id.is_empty()),
            model_version: Some(response.model).filter(|model| !model.is_empty()),
            candidates: vec![Candidate {
                index: 0,
                content: Content::model(parts),
                finish_reason: response.stop_reason.as_deref().map(parse_stop_reason),
            }],
            usage_metadata: Some((&response.usage).into()),
        }
    }
}

fn block_to_part(block: AnthropicContentBlock) -> Option<Part> {
    match block {
        AnthropicContentBlock::Text { text } if text.is_empty() => None,
        AnthropicContentBlock::Text { text } => Some(Part::text(text)),
        AnthropicContentBlock::Thinking { thinking, .. } => Some(Part::thought(thinking)),
        AnthropicContentBlock::ToolUse { id, name, input } => Some(Part::FunctionCall(match input {
            Value::Object(args) => FunctionCall::new(id, name, args),
            other => FunctionCall {
                args_error: Some(format!("expected a JSON object, got {other}")),
                ..FunctionCall::new(id, name, serde_json::Map::new())
            },
        })),
        AnthropicContentBlock::Image { .. }
        | AnthropicContentBlock::Document { .. }
        | AnthropicContentBlock::ToolResult { .. } => {
            tracing::debug!("ignoring input-only block in response");
            None
        }
    }
}

impl From<&AnthropicUsage> for UsageMetadata {
    fn from(usage: &AnthropicUsage) -> Self {
        let cached = usage.cache_read_input_tokens.unwrap_or_default();
        Self {
            prompt_token_count: usage.input_tokens + cached,
            candidates_token_count: usage.output_tokens,
            thoughts_token_count: 0,
            cached_content_token_count: cached,
            total_token_count: usage.input_tokens + cached + usage.output_tokens,
        }
    }
}

/// Map a Messages API stop reason
pub fn parse_stop_reason(reason: &str) -> FinishReason {
    match reason {
        "end_turn" | "stop_sequence" | "tool_use" | "pause_turn" => FinishReason::Stop,
        "max_tokens" => FinishReason::MaxTokens,
        "refusal" => FinishReason::Safety,
        _ => FinishReason::Other,
    }
}

// -- Stream conversion --

/// Per-stream state turning Messages API events into canonical increments
///
/// The content block index is shared across block types, so tool-use
/// blocks get their own sequential index in the accumulator.
#[derive(Debug, Default)]
pub struct AnthropicStreamState {
    accumulator: ToolCallAccumulator,
    /// Content block index to accumulator index
    tool_blocks: HashMap<u32, u32>,
    next_tool_index: u32,
    response_id: Option<String>,
    model: Option<String>,
    usage: AnthropicUsage,
}

impl AnthropicStreamState {
    /// Create state for one stream
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert one event; `Ok(None)` when it carries nothing to forward
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Streaming`] for an `error` event.
    pub fn process_event(&mut self, event: AnthropicStreamEvent) -> Result<Option<GenerateResponse>, LlmError> {
        match event {
            AnthropicStreamEvent::MessageStart { message } => {
                self.response_id = Some(message.id).filter(|id| !id.is_empty());
                self.model = Some(message.model).filter(|model| !model.is_empty());
                if let Some(usage) = message.usage {
                    self.usage = usage;
                }
                Ok(None)
            }

            AnthropicStreamEvent::ContentBlockStart { index, content_block } => match content_block {
                AnthropicStreamContentBlock::ToolUse { id, name } => {
                    let slot = self.next_tool_index;
                    self.next_tool_index += 1;
                    self.tool_blocks.insert(index, slot);
                    self.accumulator.add_chunk(slot, "", Some(&id), Some(&name));
                    Ok(None)
                }
                AnthropicStreamContentBlock::Text { text } => Ok(self.part(Part::text(text))),
                AnthropicStreamContentBlock::Thinking { thinking } => Ok(self.part(Part::thought(thinking))),
            },

            AnthropicStreamEvent::ContentBlockDelta { index, delta } => match delta {
                AnthropicStreamDelta::TextDelta { text } => Ok(self.part(Part::text(text))),
                AnthropicStreamDelta::ThinkingDelta { thinking } => Ok(self.part(Part::thought(thinking))),
                AnthropicStreamDelta::SignatureDelta { .. } => Ok(None),
                AnthropicStreamDelta::InputJsonDelta { partial_json } => {
                    match self.tool_blocks.get(&index) {
                        Some(&slot) => {
                            self.accumulator.add_chunk(slot, &partial_json, None, None);
                        }
                        None => tracing::warn!(index, "input JSON for a block that is not a tool use"),
                    }
                    Ok(None)
                }
            },

            AnthropicStreamEvent::MessageDelta { delta, usage } => {
                if let Some(usage) = usage {
                    self.usage.output_tokens = usage.output_tokens;
                    if usage.input_tokens > 0 {
                        self.usage.input_tokens = usage.input_tokens;
                    }
                }

                let finish_reason = delta.stop_reason.as_deref().map(parse_stop_reason);
                let parts = self.drain_tool_calls();

                Ok(Some(self.increment(
                    Candidate {
                        index: 0,
                        content: Content::model(parts),
                        finish_reason,
                    },
                    Some((&self.usage).into()),
                )))
            }

            AnthropicStreamEvent::ContentBlockStop { .. }
            | AnthropicStreamEvent::MessageStop
            | AnthropicStreamEvent::Ping => Ok(None),

            AnthropicStreamEvent::Error { error } => Err(LlmError::Streaming(format!(
                "{}: {}",
                error.error_type, error.message
            ))),
        }
    }

    /// Flush calls still buffered when the stream ends early
    pub fn finish(&mut self) -> Option<GenerateResponse> {
        let parts = self.drain_tool_calls();
        if parts.is_empty() {
            return None;
        }

        Some(self.increment(
            Candidate {
                index: 0,
                content: Content::model(parts),
                finish_reason: Some(FinishReason::Stop),
            },
            None,
        ))
    }

    fn part(&self, part: Part) -> Option<GenerateResponse> {
        if part.as_text().is_some_and(str::is_empty) || matches!(&part, Part::Thought { text } if text.is_empty()) {
            return None;
        }

        Some(self.increment(
            Candidate {
                index: 0,
                content: Content::model(vec![part]),
                finish_reason: None,
            },
            None,
        ))
    }

    fn drain_tool_calls(&mut self) -> Vec<Part> {
        if self.accumulator.is_empty() {
            return Vec::new();
        }

        let parts = self
            .accumulator
            .finalize()
            .into_iter()
            .map(FinalizedToolCall::into_part)
            .collect();
        self.accumulator.reset();
        self.tool_blocks.clear();
        parts
    }

    fn increment(&self, candidate: Candidate, usage_metadata: Option<UsageMetadata>) -> GenerateResponse {
        GenerateResponse {
            response_id: self.response_id.clone(),
            model_version: self.model.clone(),
            candidates: vec![candidate],
            usage_metadata,
        }
    }
}
