mod harness;

use std::sync::Arc;

use conduit_config::AuthType;
use conduit_llm::{
    CallEvent, Content, FinishReason, FunctionDeclaration, GenerateRequest, LlmError, Part,
};
use harness::config::{ConfigBuilder, RecordingObserver};
use harness::mock_llm::{MockLlm, TOOL_NAME};

fn hello() -> GenerateRequest {
    GenerateRequest::new(vec![Content::user(vec![Part::text("Hello")])])
}

fn weather_request() -> GenerateRequest {
    let mut request = GenerateRequest::new(vec![Content::user(vec![Part::text("What is the weather?")])]);
    request.tools = vec![FunctionDeclaration {
        name: TOOL_NAME.to_owned(),
        description: Some("Get current weather".to_owned()),
        parameters: Some(serde_json::json!({
            "type": "object",
            "properties": {"location": {"type": "string"}}
        })),
    }];
    request
}

#[tokio::test]
async fn openai_generation_returns_text_and_usage() {
    let mock = MockLlm::start().await.unwrap();
    let pipeline = ConfigBuilder::new(AuthType::OpenAi, &mock.base_url()).build();

    let response = pipeline.execute(&hello()).await.unwrap();

    assert_eq!(response.text(), "Hello from mock LLM");
    assert_eq!(response.finish_reason(), Some(FinishReason::Stop));
    let usage = response.usage_metadata.unwrap();
    assert_eq!(usage.prompt_token_count, 10);
    assert_eq!(usage.total_token_count, 15);

    let request = mock.last_request();
    assert_eq!(request.body["model"], "mock-model-1");
    assert_eq!(request.body["messages"][0]["role"], "user");
    assert_eq!(request.body["messages"][0]["content"], "Hello");
    assert_eq!(request.headers["authorization"], "Bearer test-key");
    assert!(
        request.headers["user-agent"].to_str().unwrap().starts_with("conduit/"),
        "unexpected user agent"
    );
}

#[tokio::test]
async fn openai_tool_calls_are_parsed() {
    let mock = MockLlm::start().await.unwrap();
    let pipeline = ConfigBuilder::new(AuthType::OpenAi, &mock.base_url()).build();

    let response = pipeline.execute(&weather_request()).await.unwrap();

    let calls = response.function_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].id, "call_test_123");
    assert_eq!(calls[0].name, TOOL_NAME);
    assert_eq!(calls[0].args["location"], "San Francisco");

    let request = mock.last_request();
    assert_eq!(request.body["tools"][0]["type"], "function");
    assert_eq!(request.body["tools"][0]["function"]["name"], TOOL_NAME);
}

#[tokio::test]
async fn request_model_overrides_configured_model() {
    let mock = MockLlm::start().await.unwrap();
    let pipeline = ConfigBuilder::new(AuthType::OpenAi, &mock.base_url()).build();

    let mut request = hello();
    request.model = Some("other-model".to_owned());
    pipeline.execute(&request).await.unwrap();

    assert_eq!(mock.last_request().body["model"], "other-model");
}

#[tokio::test]
async fn custom_headers_override_built_in_headers() {
    let mock = MockLlm::start().await.unwrap();
    let pipeline = ConfigBuilder::new(AuthType::OpenAi, &mock.base_url())
        .with_header("User-Agent", "custom-agent")
        .with_header("x-team", "tools")
        .build();

    pipeline.execute(&hello()).await.unwrap();

    let request = mock.last_request();
    assert_eq!(request.headers["user-agent"], "custom-agent");
    assert_eq!(request.headers["x-team"], "tools");
}

#[tokio::test]
async fn anthropic_generation_uses_messages_api() {
    let mock = MockLlm::start().await.unwrap();
    let pipeline = ConfigBuilder::new(AuthType::Anthropic, &mock.base_url()).build();

    let mut request = hello();
    request.system_instruction = Some("Be brief".to_owned());
    let response = pipeline.execute(&request).await.unwrap();

    assert_eq!(response.text(), "Hello from mock LLM");
    assert_eq!(response.finish_reason(), Some(FinishReason::Stop));

    let recorded = mock.last_request();
    assert_eq!(recorded.path, "/v1/messages");
    assert_eq!(recorded.headers["x-api-key"], "test-key");
    assert_eq!(recorded.headers["anthropic-version"], "2023-06-01");
    assert_eq!(recorded.body["max_tokens"], 4096);
    assert_eq!(recorded.body["system"], "Be brief");
}

#[tokio::test]
async fn anthropic_tool_use_becomes_function_call() {
    let mock = MockLlm::start().await.unwrap();
    let pipeline = ConfigBuilder::new(AuthType::Anthropic, &mock.base_url()).build();

    let response = pipeline.execute(&weather_request()).await.unwrap();

    let calls = response.function_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].id, "toolu_test_1");
    assert_eq!(calls[0].args["location"], "San Francisco");
    assert_eq!(mock.last_request().body["tools"][0]["name"], TOOL_NAME);
}

#[tokio::test]
async fn gemini_generation_uses_model_path() {
    let mock = MockLlm::start().await.unwrap();
    let pipeline = ConfigBuilder::new(AuthType::Gemini, &mock.gemini_base_url()).build();

    let response = pipeline.execute(&hello()).await.unwrap();

    assert_eq!(response.text(), "Hello from mock LLM");
    assert_eq!(response.usage_metadata.unwrap().candidates_token_count, 5);

    let recorded = mock.last_request();
    assert_eq!(recorded.path, "/v1beta/models/mock-model-1:generateContent");
    assert_eq!(recorded.headers["x-goog-api-key"], "test-key");
    assert_eq!(recorded.body["contents"][0]["parts"][0]["text"], "Hello");
}

#[tokio::test]
async fn gemini_function_calls_get_ids() {
    let mock = MockLlm::start().await.unwrap();
    let pipeline = ConfigBuilder::new(AuthType::Gemini, &mock.gemini_base_url()).build();

    let response = pipeline.execute(&weather_request()).await.unwrap();

    let calls = response.function_calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].id.starts_with("call_"));
    assert_eq!(calls[0].name, TOOL_NAME);
}

#[tokio::test]
async fn gemini_embeddings() {
    let mock = MockLlm::start().await.unwrap();
    let pipeline = ConfigBuilder::new(AuthType::Gemini, &mock.gemini_base_url()).build();

    let values = pipeline.embed_content("hello", "text-embedding-004").await.unwrap();

    assert_eq!(values, vec![0.1, 0.2, 0.3]);
    let recorded = mock.last_request();
    assert_eq!(recorded.path, "/v1beta/models/text-embedding-004:embedContent");
    assert_eq!(recorded.body["content"]["parts"][0]["text"], "hello");
}

#[tokio::test]
async fn upstream_errors_keep_status_and_message() {
    let mock = MockLlm::start_failing(1, axum::http::StatusCode::BAD_REQUEST).await.unwrap();
    let pipeline = ConfigBuilder::new(AuthType::OpenAi, &mock.base_url()).build();

    let err = pipeline.execute(&hello()).await.unwrap_err();

    match err {
        LlmError::Upstream { status, message } => {
            assert_eq!(status, 400);
            assert!(message.contains("mock server intentional failure"));
        }
        other => panic!("expected upstream error, got {other:?}"),
    }
    assert_eq!(mock.request_count(), 1);
}

#[tokio::test]
async fn observer_sees_one_event_per_call() {
    let mock = MockLlm::start().await.unwrap();
    let observer = Arc::new(RecordingObserver::default());
    let pipeline = ConfigBuilder::new(AuthType::OpenAi, &mock.base_url())
        .with_observer(observer.clone())
        .build();

    let mut request = hello();
    request.prompt_id = Some("prompt-1".to_owned());
    pipeline.execute(&request).await.unwrap();

    let events = observer.events();
    assert_eq!(events.len(), 1);
    match &events[0] {
        CallEvent::Completed { info, usage, .. } => {
            assert_eq!(info.prompt_id.as_deref(), Some("prompt-1"));
            assert_eq!(info.model, "mock-model-1");
            assert!(!info.streaming);
            assert_eq!(usage.unwrap().total_token_count, 15);
        }
        other => panic!("expected completion, got {other:?}"),
    }
}
