//! Mock vendor backend for integration tests
//!
//! Serves canned `OpenAI`-compatible, Anthropic, and Gemini responses
//! (plain and SSE) and records every request it receives.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use futures_util::StreamExt;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

/// Tool call every backend returns when the request carries tools
pub const TOOL_NAME: &str = "get_weather";

/// Arguments of the canned tool call, split into streaming fragments
const TOOL_ARGS_FRAGMENTS: [&str; 3] = [r#"{"locat"#, r#"ion":"San Fr"#, r#"ancisco"}"#];

/// How the mock behaves
#[derive(Debug, Clone)]
pub struct MockOptions {
    /// Number of requests to fail before succeeding
    pub fail_count: u32,
    /// Status returned for failed requests
    pub fail_status: StatusCode,
    /// Send the first stream chunk and then hang (plain replies just hang)
    pub stall: bool,
    /// Text content of replies
    pub text: String,
}

impl Default for MockOptions {
    fn default() -> Self {
        Self {
            fail_count: 0,
            fail_status: StatusCode::INTERNAL_SERVER_ERROR,
            stall: false,
            text: "Hello from mock LLM".to_owned(),
        }
    }
}

/// A request as the mock saw it
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub headers: HeaderMap,
    pub body: Value,
}

/// Mock backend listening on a random local port
pub struct MockLlm {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockLlmState>,
}

struct MockLlmState {
    request_count: AtomicU32,
    fail_count: AtomicU32,
    options: MockOptions,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockLlm {
    /// Start a mock with default behaviour
    pub async fn start() -> anyhow::Result<Self> {
        Self::start_with(MockOptions::default()).await
    }

    /// Start a mock that fails the first `n` requests with `status`
    pub async fn start_failing(n: u32, status: StatusCode) -> anyhow::Result<Self> {
        Self::start_with(MockOptions {
            fail_count: n,
            fail_status: status,
            ..MockOptions::default()
        })
        .await
    }

    /// Start a mock that never finishes its replies
    pub async fn start_stalled() -> anyhow::Result<Self> {
        Self::start_with(MockOptions {
            stall: true,
            ..MockOptions::default()
        })
        .await
    }

    pub async fn start_with(options: MockOptions) -> anyhow::Result<Self> {
        let state = Arc::new(MockLlmState {
            request_count: AtomicU32::new(0),
            fail_count: AtomicU32::new(options.fail_count),
            options,
            requests: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/v1/chat/completions", routing::post(handle_chat_completions))
            .route("/v1/messages", routing::post(handle_messages))
            .route("/v1beta/models/{action}", routing::post(handle_gemini))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self { addr, shutdown, state })
    }

    /// Base URL for the chat completions and Messages backends
    pub fn base_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    /// Base URL for the Gemini backend
    pub fn gemini_base_url(&self) -> String {
        format!("http://{}/v1beta", self.addr)
    }

    /// Number of requests received, failed ones included
    pub fn request_count(&self) -> u32 {
        self.state.request_count.load(Ordering::Relaxed)
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    /// Most recent request
    pub fn last_request(&self) -> RecordedRequest {
        self.requests().pop().expect("no request received")
    }
}

impl Drop for MockLlm {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl MockLlmState {
    /// Record the request and return the injected failure, if any
    fn receive(&self, path: String, headers: HeaderMap, body: Value) -> Option<Response> {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        self.requests.lock().unwrap().push(RecordedRequest { path, headers, body });

        let remaining = self.fail_count.load(Ordering::Relaxed);
        if remaining == 0 {
            return None;
        }
        self.fail_count.fetch_sub(1, Ordering::Relaxed);

        Some(
            (
                self.options.fail_status,
                Json(json!({
                    "error": {
                        "message": "mock server intentional failure",
                        "type": "server_error"
                    }
                })),
            )
                .into_response(),
        )
    }

    fn words(&self) -> Vec<String> {
        self.options.text.split_whitespace().map(|w| format!("{w} ")).collect()
    }
}

fn has_tools(body: &Value) -> bool {
    body.get("tools").and_then(Value::as_array).is_some_and(|tools| !tools.is_empty())
}

fn tool_args() -> Value {
    json!({"location": "San Francisco"})
}

/// SSE response from pre-rendered events; stalls after the first when asked
fn sse(events: Vec<String>, stall: bool) -> Response {
    let body = if stall {
        let first = events.into_iter().next().unwrap_or_default();
        let stream = futures_util::stream::iter([Ok::<_, Infallible>(first)]).chain(futures_util::stream::pending());
        Body::from_stream(stream)
    } else {
        Body::from(events.concat())
    };

    (StatusCode::OK, [(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
}

async fn stall_forever() {
    tokio::time::sleep(Duration::from_secs(3600)).await;
}

fn data_event(value: &Value) -> String {
    format!("data: {value}\n\n")
}

fn named_event(name: &str, value: &Value) -> String {
    format!("event: {name}\ndata: {value}\n\n")
}

// -- Chat completions --

async fn handle_chat_completions(
    State(state): State<Arc<MockLlmState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Some(failure) = state.receive("/v1/chat/completions".to_owned(), headers, body.clone()) {
        return failure;
    }

    let model = body["model"].as_str().unwrap_or_default().to_owned();
    let tools = has_tools(&body);

    if body["stream"].as_bool().unwrap_or(false) {
        return sse(chat_completion_chunks(&state, &model, tools), state.options.stall);
    }
    if state.options.stall {
        stall_forever().await;
    }

    let (message, finish_reason) = if tools {
        (
            json!({
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_test_123",
                    "type": "function",
                    "function": {"name": TOOL_NAME, "arguments": tool_args().to_string()}
                }]
            }),
            "tool_calls",
        )
    } else {
        (json!({"role": "assistant", "content": state.options.text}), "stop")
    };

    Json(json!({
        "id": "chatcmpl-test-123",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": model,
        "choices": [{"index": 0, "message": message, "finish_reason": finish_reason}],
        "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
    }))
    .into_response()
}

fn chat_completion_chunks(state: &MockLlmState, model: &str, tools: bool) -> Vec<String> {
    let chunk = |delta: Value, finish_reason: Value| {
        data_event(&json!({
            "id": "chatcmpl-test-stream",
            "object": "chat.completion.chunk",
            "model": model,
            "choices": [{"index": 0, "delta": delta, "finish_reason": finish_reason}]
        }))
    };

    let mut events = vec![chunk(json!({"role": "assistant", "content": ""}), Value::Null)];

    if tools {
        events.push(chunk(
            json!({"tool_calls": [{
                "index": 0,
                "id": "call_test_stream",
                "type": "function",
                "function": {"name": TOOL_NAME, "arguments": ""}
            }]}),
            Value::Null,
        ));
        for fragment in TOOL_ARGS_FRAGMENTS {
            events.push(chunk(
                json!({"tool_calls": [{"index": 0, "function": {"arguments": fragment}}]}),
                Value::Null,
            ));
        }
        events.push(chunk(json!({}), json!("tool_calls")));
    } else {
        for word in state.words() {
            events.push(chunk(json!({"content": word}), Value::Null));
        }
        events.push(chunk(json!({}), json!("stop")));
    }

    events.push(data_event(&json!({
        "id": "chatcmpl-test-stream",
        "model": model,
        "choices": [],
        "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
    })));
    events.push("data: [DONE]\n\n".to_owned());
    events
}

// -- Messages --

async fn handle_messages(State(state): State<Arc<MockLlmState>>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if let Some(failure) = state.receive("/v1/messages".to_owned(), headers, body.clone()) {
        return failure;
    }

    let model = body["model"].as_str().unwrap_or_default().to_owned();
    let tools = has_tools(&body);

    if body["stream"].as_bool().unwrap_or(false) {
        return sse(message_events(&state, &model, tools), state.options.stall);
    }
    if state.options.stall {
        stall_forever().await;
    }

    let (content, stop_reason) = if tools {
        (
            json!([{"type": "tool_use", "id": "toolu_test_1", "name": TOOL_NAME, "input": tool_args()}]),
            "tool_use",
        )
    } else {
        (json!([{"type": "text", "text": state.options.text}]), "end_turn")
    };

    Json(json!({
        "id": "msg_test_1",
        "type": "message",
        "role": "assistant",
        "model": model,
        "content": content,
        "stop_reason": stop_reason,
        "usage": {"input_tokens": 10, "output_tokens": 5}
    }))
    .into_response()
}

fn message_events(state: &MockLlmState, model: &str, tools: bool) -> Vec<String> {
    let mut events = vec![named_event(
        "message_start",
        &json!({
            "type": "message_start",
            "message": {"id": "msg_test_stream", "model": model, "usage": {"input_tokens": 10, "output_tokens": 1}}
        }),
    )];

    if tools {
        events.push(named_event(
            "content_block_start",
            &json!({
                "type": "content_block_start",
                "index": 0,
                "content_block": {"type": "tool_use", "id": "toolu_test_stream", "name": TOOL_NAME, "input": {}}
            }),
        ));
        for fragment in TOOL_ARGS_FRAGMENTS {
            events.push(named_event(
                "content_block_delta",
                &json!({
                    "type": "content_block_delta",
                    "index": 0,
                    "delta": {"type": "input_json_delta", "partial_json": fragment}
                }),
            ));
        }
    } else {
        events.push(named_event(
            "content_block_start",
            &json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
        ));
        for word in state.words() {
            events.push(named_event(
                "content_block_delta",
                &json!({
                    "type": "content_block_delta",
                    "index": 0,
                    "delta": {"type": "text_delta", "text": word}
                }),
            ));
        }
    }

    events.push(named_event("ping", &json!({"type": "ping"})));
    events.push(named_event(
        "content_block_stop",
        &json!({"type": "content_block_stop", "index": 0}),
    ));
    events.push(named_event(
        "message_delta",
        &json!({
            "type": "message_delta",
            "delta": {"stop_reason": if tools { "tool_use" } else { "end_turn" }},
            "usage": {"output_tokens": 5}
        }),
    ));
    events.push(named_event("message_stop", &json!({"type": "message_stop"})));
    events
}

// -- Gemini --

async fn handle_gemini(
    State(state): State<Arc<MockLlmState>>,
    Path(action): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Some(failure) = state.receive(format!("/v1beta/models/{action}"), headers, body.clone()) {
        return failure;
    }

    let Some((model, method)) = action.split_once(':') else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let usage = json!({"promptTokenCount": 10, "candidatesTokenCount": 5, "totalTokenCount": 15});
    let tools = has_tools(&body);

    match method {
        "embedContent" => Json(json!({"embedding": {"values": [0.1, 0.2, 0.3]}})).into_response(),
        "streamGenerateContent" => {
            let mut events = Vec::new();
            if tools {
                events.push(data_event(&json!({
                    "candidates": [{
                        "content": {"role": "model", "parts": [{"functionCall": {"name": TOOL_NAME, "args": tool_args()}}]},
                        "finishReason": "STOP",
                        "index": 0
                    }],
                    "usageMetadata": usage,
                    "modelVersion": model
                })));
            } else {
                let words = state.words();
                let last = words.len().saturating_sub(1);
                for (i, word) in words.into_iter().enumerate() {
                    let mut chunk = json!({
                        "candidates": [{"content": {"role": "model", "parts": [{"text": word}]}, "index": 0}],
                        "modelVersion": model
                    });
                    if i == last {
                        chunk["candidates"][0]["finishReason"] = json!("STOP");
                        chunk["usageMetadata"] = usage.clone();
                    }
                    events.push(data_event(&chunk));
                }
            }
            sse(events, state.options.stall)
        }
        "generateContent" => {
            if state.options.stall {
                stall_forever().await;
            }

            let parts = if tools {
                json!([{"functionCall": {"name": TOOL_NAME, "args": tool_args()}}])
            } else {
                json!([{"text": state.options.text}])
            };

            Json(json!({
                "candidates": [{"content": {"role": "model", "parts": parts}, "finishReason": "STOP", "index": 0}],
                "usageMetadata": usage,
                "modelVersion": model
            }))
            .into_response()
        }
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}
