//! Conversion between canonical types and the `OpenAI` chat-completions format

use std::collections::{HashMap, HashSet};

use conduit_config::ReasoningEffort;
use serde_json::{Map, Value};

use super::media::{self, MediaCategory};
use super::schema::normalize_schema;
use super::{ConversionOptions, OrphanToolCallPolicy, append_reasoning, join_reasoning};
use crate::accumulator::{FinalizedToolCall, ToolCallAccumulator};
use crate::protocol::openai::{
    OpenAiChoice, OpenAiContent, OpenAiContentPart, OpenAiFile, OpenAiFunction, OpenAiFunctionCall, OpenAiImageUrl,
    OpenAiInputAudio, OpenAiMessage, OpenAiRequest, OpenAiResponse, OpenAiStreamChunk, OpenAiStreamOptions, OpenAiTool,
    OpenAiToolCall, OpenAiUsage, OpenAiVideoUrl,
};
use crate::types::{
    Blob, Candidate, Content, FileData, FinishReason, FunctionCall, FunctionDeclaration, FunctionResponse,
    GenerateRequest, GenerateResponse, Part, Role, UsageMetadata,
};

const SYSTEM: &str = "system";
const USER: &str = "user";
const ASSISTANT: &str = "assistant";
const TOOL: &str = "tool";

// -- Outbound: canonical request -> OpenAI wire request --

/// Build the chat-completions request for a canonical request
///
/// `model` is the already resolved model id; generation parameters are
/// read from `request.config` as given.
pub fn to_openai_request(
    request: &GenerateRequest,
    model: &str,
    stream: bool,
    options: &ConversionOptions,
) -> OpenAiRequest {
    let sampling = &request.config.sampling;

    let reasoning_effort = match sampling.reasoning_effort {
        Some(ReasoningEffort::Disabled) | None => None,
        Some(effort) => Some(effort.as_ref().to_owned()),
    };

    OpenAiRequest {
        model: model.to_owned(),
        messages: contents_to_openai_messages(request.system_instruction.as_deref(), &request.contents, options),
        temperature: sampling.temperature,
        top_p: sampling.top_p,
        top_k: sampling.top_k,
        max_tokens: sampling.max_output_tokens,
        stop: (!request.config.stop_sequences.is_empty()).then(|| request.config.stop_sequences.clone()),
        frequency_penalty: sampling.frequency_penalty,
        presence_penalty: sampling.presence_penalty,
        seed: request.config.seed,
        reasoning_effort,
        stream: stream.then_some(true),
        tools: (!request.tools.is_empty()).then(|| request.tools.iter().map(Into::into).collect()),
        stream_options: stream.then_some(OpenAiStreamOptions { include_usage: true }),
    }
}

impl From<&FunctionDeclaration> for OpenAiTool {
    fn from(declaration: &FunctionDeclaration) -> Self {
        Self {
            tool_type: "function".to_owned(),
            function: OpenAiFunction {
                name: declaration.name.clone(),
                description: declaration.description.clone(),
                parameters: declaration.parameters.as_ref().map(normalize_schema),
            },
        }
    }
}

/// Convert canonical turns into chat-completions messages
///
/// Runs three passes: translate each turn, merge consecutive same-role
/// non-tool messages, then pair every tool call with exactly one reply.
pub fn contents_to_openai_messages(
    system_instruction: Option<&str>,
    contents: &[Content],
    options: &ConversionOptions,
) -> Vec<OpenAiMessage> {
    let mut drafts = Vec::new();

    if let Some(system) = system_instruction.filter(|s| !s.is_empty()) {
        drafts.push(Draft::new(SYSTEM).with_text(system));
    }

    for content in contents {
        match content.role {
            Role::User => translate_user_turn(content, &mut drafts),
            Role::Model => translate_model_turn(content, &mut drafts),
        }
    }

    let merged = merge_same_role(drafts);
    let paired = pair_tool_calls(merged, options.orphan_tool_calls);

    paired.into_iter().map(Draft::into_message).collect()
}

/// Message under construction
#[derive(Debug)]
struct Draft {
    role: &'static str,
    blocks: Vec<OpenAiContentPart>,
    reasoning: Option<String>,
    tool_calls: Vec<OpenAiToolCall>,
    tool_call_id: Option<String>,
}

impl Draft {
    const fn new(role: &'static str) -> Self {
        Self {
            role,
            blocks: Vec::new(),
            reasoning: None,
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    fn with_text(mut self, text: &str) -> Self {
        self.blocks.push(OpenAiContentPart::Text { text: text.to_owned() });
        self
    }

    fn is_empty(&self) -> bool {
        self.blocks.is_empty() && self.reasoning.is_none() && self.tool_calls.is_empty()
    }

    fn tool_reply(id: &str, blocks: Vec<OpenAiContentPart>) -> Self {
        Self {
            tool_call_id: Some(id.to_owned()),
            blocks,
            ..Self::new(TOOL)
        }
    }

    fn absorb(&mut self, other: Self) {
        self.blocks.extend(other.blocks);
        self.tool_calls.extend(other.tool_calls);
        self.reasoning = append_reasoning(self.reasoning.take(), other.reasoning);
    }

    fn into_message(self) -> OpenAiMessage {
        let text_only = self
            .blocks
            .iter()
            .all(|block| matches!(block, OpenAiContentPart::Text { .. }));

        // Tool replies keep their block array; other roles collapse plain text to a string
        let content = if self.role == TOOL {
            Some(OpenAiContent::Parts(self.blocks))
        } else if self.blocks.is_empty() {
            None
        } else if text_only {
            let text = self
                .blocks
                .into_iter()
                .filter_map(|block| match block {
                    OpenAiContentPart::Text { text } => Some(text),
                    _ => None,
                })
                .collect();
            Some(OpenAiContent::Text(text))
        } else {
            Some(OpenAiContent::Parts(self.blocks))
        };

        OpenAiMessage {
            role: self.role.to_owned(),
            content,
            tool_calls: (!self.tool_calls.is_empty()).then_some(self.tool_calls),
            tool_call_id: self.tool_call_id,
            reasoning_content: self.reasoning,
            reasoning: None,
        }
    }
}

fn translate_user_turn(content: &Content, drafts: &mut Vec<Draft>) {
    let mut user = Draft::new(USER);

    for part in &content.parts {
        match part {
            Part::FunctionResponse(response) => {
                drafts.push(Draft::tool_reply(&response.id, tool_reply_blocks(response)));
            }
            Part::Text { text } | Part::Thought { text } => {
                user.blocks.push(OpenAiContentPart::Text { text: text.clone() });
            }
            Part::InlineData(_) | Part::FileData(_) => {
                if let Some(block) = media_block(part) {
                    user.blocks.push(block);
                }
            }
            Part::FunctionCall(call) => {
                tracing::warn!(call_id = %call.id, "dropping function call found in a user turn");
            }
        }
    }

    if !user.is_empty() {
        drafts.push(user);
    }
}

fn translate_model_turn(content: &Content, drafts: &mut Vec<Draft>) {
    let mut assistant = Draft::new(ASSISTANT);

    for part in &content.parts {
        match part {
            Part::Text { text } => assistant.blocks.push(OpenAiContentPart::Text { text: text.clone() }),
            Part::Thought { text } => {
                assistant.reasoning = append_reasoning(assistant.reasoning.take(), Some(text.clone()));
            }
            Part::FunctionCall(call) => assistant.tool_calls.push(OpenAiToolCall {
                id: call.id.clone(),
                tool_type: "function".to_owned(),
                function: OpenAiFunctionCall {
                    name: call.name.clone(),
                    arguments: Value::Object(call.args.clone()).to_string(),
                },
            }),
            Part::InlineData(_) | Part::FileData(_) => {
                if let Some(block) = media_block(part) {
                    assistant.blocks.push(block);
                }
            }
            Part::FunctionResponse(response) => {
                tracing::warn!(call_id = %response.id, "dropping function response found in a model turn");
            }
        }
    }

    if !assistant.is_empty() {
        drafts.push(assistant);
    }
}

/// Content blocks of a tool reply: text first, then media
///
/// A reply without text or media still gets one empty text block, since
/// every tool call needs a non-empty reply.
fn tool_reply_blocks(response: &FunctionResponse) -> Vec<OpenAiContentPart> {
    let mut blocks: Vec<OpenAiContentPart> = response
        .text()
        .map(|text| OpenAiContentPart::Text { text })
        .into_iter()
        .collect();

    blocks.extend(response.media().filter_map(media_block));

    if blocks.is_empty() {
        blocks.push(OpenAiContentPart::Text { text: String::new() });
    }

    blocks
}

/// Embed a media part according to its MIME category
fn media_block(part: &Part) -> Option<OpenAiContentPart> {
    let (mime_type, location, display_name, inline) = match part {
        Part::InlineData(Blob {
            mime_type,
            data,
            display_name,
        }) => (mime_type, data, display_name, true),
        Part::FileData(FileData {
            mime_type,
            file_uri,
            display_name,
        }) => (mime_type, file_uri, display_name, false),
        _ => return None,
    };

    let url = || {
        if inline {
            media::data_uri(mime_type, location)
        } else {
            location.clone()
        }
    };

    let block = match MediaCategory::classify(mime_type) {
        MediaCategory::Image => OpenAiContentPart::ImageUrl {
            image_url: OpenAiImageUrl { url: url(), detail: None },
        },
        MediaCategory::Document => OpenAiContentPart::File {
            file: OpenAiFile {
                filename: display_name.clone(),
                file_data: url(),
            },
        },
        MediaCategory::Audio if inline => OpenAiContentPart::InputAudio {
            input_audio: OpenAiInputAudio {
                data: location.clone(),
                format: media::audio_format(mime_type),
            },
        },
        // input_audio only takes base64 data, so a remote file cannot be sent by reference
        MediaCategory::Audio => {
            tracing::debug!(mime_type = %mime_type, "describing remote audio as text");
            OpenAiContentPart::Text {
                text: media::unsupported_description(mime_type, display_name.as_deref()),
            }
        }
        MediaCategory::Video => OpenAiContentPart::VideoUrl {
            video_url: OpenAiVideoUrl { url: url() },
        },
        MediaCategory::Unsupported => {
            tracing::debug!(mime_type = %mime_type, "describing unsupported media as text");
            OpenAiContentPart::Text {
                text: media::unsupported_description(mime_type, display_name.as_deref()),
            }
        }
    };

    Some(block)
}

fn merge_same_role(drafts: Vec<Draft>) -> Vec<Draft> {
    let mut merged: Vec<Draft> = Vec::with_capacity(drafts.len());

    for draft in drafts {
        match merged.last_mut() {
            Some(last) if last.role == draft.role && draft.role != TOOL => last.absorb(draft),
            _ => merged.push(draft),
        }
    }

    merged
}

fn pair_tool_calls(drafts: Vec<Draft>, policy: OrphanToolCallPolicy) -> Vec<Draft> {
    let mut paired = Vec::with_capacity(drafts.len());
    let mut pending: Vec<String> = Vec::new();
    let mut answered: HashSet<String> = HashSet::new();

    for draft in drafts {
        if draft.role == TOOL {
            let id = draft.tool_call_id.clone().unwrap_or_default();

            if !answered.insert(id.clone()) {
                tracing::warn!(call_id = %id, "dropping duplicate tool reply");
                continue;
            }

            pending.retain(|pending_id| *pending_id != id);
            paired.push(draft);
            continue;
        }

        close_orphans(&mut pending, &mut answered, &mut paired, policy);

        if draft.role == ASSISTANT {
            pending.extend(draft.tool_calls.iter().map(|call| call.id.clone()));
        }
        paired.push(draft);
    }

    close_orphans(&mut pending, &mut answered, &mut paired, policy);
    paired
}

fn close_orphans(
    pending: &mut Vec<String>,
    answered: &mut HashSet<String>,
    out: &mut Vec<Draft>,
    policy: OrphanToolCallPolicy,
) {
    for id in pending.drain(..) {
        match policy {
            OrphanToolCallPolicy::SynthesizeEmptyReply => {
                tracing::debug!(call_id = %id, "synthesizing empty reply for unanswered tool call");
                answered.insert(id.clone());
                out.push(Draft::tool_reply(&id, vec![OpenAiContentPart::Text { text: String::new() }]));
            }
            OrphanToolCallPolicy::Preserve => {
                tracing::debug!(call_id = %id, "leaving tool call without reply");
            }
        }
    }
}

// -- Inbound: OpenAI wire messages -> canonical turns --

/// Convert chat-completions messages back into canonical turns
///
/// Returns the system prompt separately. Tool replies become function
/// responses in a user turn, named after the call they answer.
pub fn openai_messages_to_contents(messages: &[OpenAiMessage]) -> (Option<String>, Vec<Content>) {
    let mut system: Option<String> = None;
    let mut contents: Vec<Content> = Vec::new();
    let mut call_names: HashMap<String, String> = HashMap::new();

    for message in messages {
        match message.role.as_str() {
            SYSTEM => {
                let text = message.content.as_ref().map(content_text).unwrap_or_default();
                system = Some(system.map_or_else(|| text.clone(), |existing| existing + &text));
            }
            ASSISTANT => {
                let mut parts = Vec::new();

                if let Some(reasoning) =
                    join_reasoning(message.reasoning_content.clone(), message.reasoning.clone())
                {
                    parts.push(Part::thought(reasoning));
                }

                parts.extend(message.content.as_ref().map(content_parts).unwrap_or_default());

                for call in message.tool_calls.iter().flatten() {
                    call_names.insert(call.id.clone(), call.function.name.clone());
                }
                parts.extend(parse_tool_calls(message.tool_calls.as_deref().unwrap_or_default()));

                contents.push(Content::model(parts));
            }
            TOOL => {
                let id = message.tool_call_id.clone().unwrap_or_default();
                let (text, media): (Vec<Part>, Vec<Part>) = message
                    .content
                    .as_ref()
                    .map(content_parts)
                    .unwrap_or_default()
                    .into_iter()
                    .partition(|part| matches!(part, Part::Text { .. }));

                let output: String = text.iter().filter_map(Part::as_text).collect();
                let mut response = Map::new();
                response.insert("output".to_owned(), Value::String(output));

                let part = Part::FunctionResponse(FunctionResponse {
                    name: call_names.get(&id).cloned().unwrap_or_default(),
                    id,
                    response,
                    parts: media,
                });

                match contents.last_mut() {
                    Some(last)
                        if last.role == Role::User
                            && last.parts.iter().all(|p| matches!(p, Part::FunctionResponse(_))) =>
                    {
                        last.parts.push(part);
                    }
                    _ => contents.push(Content::user(vec![part])),
                }
            }
            _ => {
                let parts = message.content.as_ref().map(content_parts).unwrap_or_default();
                contents.push(Content::user(parts));
            }
        }
    }

    (system, contents)
}

fn content_text(content: &OpenAiContent) -> String {
    match content {
        OpenAiContent::Text(text) => text.clone(),
        OpenAiContent::Parts(parts) => parts
            .iter()
            .filter_map(|part| match part {
                OpenAiContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect(),
    }
}

fn content_parts(content: &OpenAiContent) -> Vec<Part> {
    match content {
        OpenAiContent::Text(text) if text.is_empty() => Vec::new(),
        OpenAiContent::Text(text) => vec![Part::text(text.clone())],
        OpenAiContent::Parts(parts) => parts.iter().map(block_to_part).collect(),
    }
}

fn block_to_part(block: &OpenAiContentPart) -> Part {
    match block {
        OpenAiContentPart::Text { text } => Part::text(text.clone()),
        OpenAiContentPart::ImageUrl { image_url } => url_to_part(&image_url.url, "image/*", None),
        OpenAiContentPart::VideoUrl { video_url } => url_to_part(&video_url.url, "video/*", None),
        OpenAiContentPart::File { file } => url_to_part(&file.file_data, "application/pdf", file.filename.clone()),
        OpenAiContentPart::InputAudio { input_audio } => Part::InlineData(Blob {
            mime_type: format!("audio/{}", input_audio.format),
            data: input_audio.data.clone(),
            display_name: None,
        }),
    }
}

/// Inline data for a `data:` URI, file data for anything else
fn url_to_part(url: &str, fallback_mime: &str, display_name: Option<String>) -> Part {
    if let Some(rest) = url.strip_prefix("data:")
        && let Some((header, data)) = rest.split_once(',')
    {
        let mime_type = header.strip_suffix(";base64").unwrap_or(header);
        return Part::InlineData(Blob {
            mime_type: mime_type.to_owned(),
            data: data.to_owned(),
            display_name,
        });
    }

    Part::FileData(FileData {
        mime_type: fallback_mime.to_owned(),
        file_uri: url.to_owned(),
        display_name,
    })
}

fn parse_tool_calls(calls: &[OpenAiToolCall]) -> Vec<Part> {
    if calls.is_empty() {
        return Vec::new();
    }

    let mut accumulator = ToolCallAccumulator::new();
    for (index, call) in (0_u32..).zip(calls) {
        accumulator.add_chunk(
            index,
            &call.function.arguments,
            Some(&call.id),
            Some(&call.function.name),
        );
    }

    accumulator
        .finalize()
        .into_iter()
        .map(FinalizedToolCall::into_part)
        .collect()
}

// -- Inbound: OpenAI wire response -> canonical response --

impl From<OpenAiResponse> for GenerateResponse {
    fn from(response: OpenAiResponse) -> Self {
        Self {
            response_id: Some(response.id).filter(|id| !id.is_empty()),
            model_version: Some(response.model).filter(|model| !model.is_empty()),
            candidates: response.choices.into_iter().map(Into::into).collect(),
            usage_metadata: response.usage.as_ref().map(Into::into),
        }
    }
}

impl From<OpenAiChoice> for Candidate {
    fn from(choice: OpenAiChoice) -> Self {
        let message = choice.message;
        let mut parts = Vec::new();

        if let Some(reasoning) = join_reasoning(message.reasoning_content, message.reasoning) {
            parts.push(Part::thought(reasoning));
        }
        if let Some(text) = message.content.filter(|text| !text.is_empty()) {
            parts.push(Part::text(text));
        }
        parts.extend(parse_tool_calls(message.tool_calls.as_deref().unwrap_or_default()));

        Self {
            index: choice.index,
            content: Content::model(parts),
            finish_reason: choice.finish_reason.as_deref().map(parse_finish_reason),
        }
    }
}

impl From<&OpenAiUsage> for UsageMetadata {
    fn from(usage: &OpenAiUsage) -> Self {
        let cached = usage
            .prompt_tokens_details
            .as_ref()
            .map(|details| details.cached_tokens)
            .or(usage.cached_tokens)
            .unwrap_or_default();

        Self {
            prompt_token_count: usage.prompt_tokens,
            candidates_token_count: usage.completion_tokens,
            thoughts_token_count: usage
                .completion_tokens_details
                .as_ref()
                .map(|details| details.reasoning_tokens)
                .unwrap_or_default(),
            cached_content_token_count: cached,
            total_token_count: usage.total_tokens,
        }
    }
}

/// Map a chat-completions finish reason
pub fn parse_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "stop" | "tool_calls" | "function_call" => FinishReason::Stop,
        "length" => FinishReason::MaxTokens,
        "content_filter" => FinishReason::Safety,
        _ => FinishReason::Other,
    }
}

// -- Stream conversion --

/// Per-stream state turning chat-completions chunks into canonical increments
///
/// Text and reasoning pass through as they arrive. Tool-call fragments are
/// held in the accumulator and emitted as complete calls once the choice
/// finishes or the stream ends.
#[derive(Debug, Default)]
pub struct OpenAiStreamState {
    accumulator: ToolCallAccumulator,
    response_id: Option<String>,
    model: Option<String>,
}

impl OpenAiStreamState {
    /// Create state for one stream
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert one chunk; `None` when the chunk carries nothing
    pub fn process_chunk(&mut self, chunk: OpenAiStreamChunk) -> Option<GenerateResponse> {
        if self.response_id.is_none() && !chunk.id.is_empty() {
            self.response_id = Some(chunk.id.clone());
        }
        if self.model.is_none() && !chunk.model.is_empty() {
            self.model = Some(chunk.model.clone());
        }

        let mut candidates = Vec::new();

        for choice in chunk.choices {
            let delta = choice.delta;
            let mut parts = Vec::new();

            if let Some(reasoning) = join_reasoning(delta.reasoning_content, delta.reasoning) {
                parts.push(Part::thought(reasoning));
            }
            if let Some(text) = delta.content.filter(|text| !text.is_empty()) {
                parts.push(Part::text(text));
            }

            for call in delta.tool_calls.into_iter().flatten() {
                let (name, arguments) = call
                    .function
                    .map(|f| (f.name, f.arguments.unwrap_or_default()))
                    .unwrap_or_default();
                self.accumulator
                    .add_chunk(call.index, &arguments, call.id.as_deref(), name.as_deref());
            }

            let finish_reason = choice.finish_reason.as_deref().map(parse_finish_reason);
            if finish_reason.is_some() {
                parts.extend(self.drain_tool_calls());
            }

            if parts.is_empty() && finish_reason.is_none() {
                continue;
            }

            candidates.push(Candidate {
                index: choice.index,
                content: Content::model(parts),
                finish_reason,
            });
        }

        let usage_metadata = chunk.usage.as_ref().map(UsageMetadata::from);

        if candidates.is_empty() && usage_metadata.is_none() {
            return None;
        }

        Some(self.increment(candidates, usage_metadata))
    }

    /// Flush calls still buffered when the stream ends without a finish reason
    pub fn finish(&mut self) -> Option<GenerateResponse> {
        let parts = self.drain_tool_calls();
        if parts.is_empty() {
            return None;
        }

        let candidate = Candidate {
            index: 0,
            content: Content::model(parts),
            finish_reason: Some(FinishReason::Stop),
        };
        Some(self.increment(vec![candidate], None))
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
        parts
    }

    fn increment(&self, candidates: Vec<Candidate>, usage_metadata: Option<UsageMetadata>) -> GenerateResponse {
        GenerateResponse {
            response_id: self.response_id.clone(),
            model_version: self.model.clone(),
            candidates,
            usage_metadata,
        }
    }
}
