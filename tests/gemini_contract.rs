//! Contract tests for the Gemini binding against a mock HTTP server.
//!
//! These exercise the real HTTP client and SSE decoding:
//! - request shape (path, key header, system instruction, tools)
//! - streamed text and function calls
//! - client-side history across exchanges
//! - HTTP error mapping

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use buddy::action_log::ActionLog;
use buddy::chat::gemini::GeminiService;
use buddy::chat::{
    MockToolExecutor, ModelService, ModelSession, RemoteChatClient, SessionSetup, ToolRegistry,
    TurnPayload,
};
use buddy::config::ChatConfig;
use buddy::error::BuddyError;
use futures_util::StreamExt;
use serde_json::{Value, json};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ENDPOINT: &str = "/v1beta/models/gemini-test:streamGenerateContent";

fn chat_config(server: &MockServer) -> ChatConfig {
    ChatConfig {
        model: "gemini-test".into(),
        base_url: server.uri(),
        api_key: Some("test-key".into()),
        ..ChatConfig::default()
    }
}

fn sse(events: &[Value]) -> String {
    events.iter().map(|e| format!("data: {e}\r\n\r\n")).collect()
}

fn text_event(text: &str) -> Value {
    json!({"candidates": [{"content": {"role": "model", "parts": [{"text": text}]}}]})
}

fn sse_response(events: &[Value]) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(sse(events), "text/event-stream")
}

async fn request_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}

fn client(server: &MockServer) -> RemoteChatClient {
    let config = chat_config(server);
    let service = Arc::new(GeminiService::from_config(&config).unwrap());
    let executor = Arc::new(MockToolExecutor::new(ToolRegistry::builtin(), Duration::ZERO));
    RemoteChatClient::new(service, &config, executor)
}

#[tokio::test]
async fn streams_text_with_expected_request_shape() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .and(query_param("alt", "sse"))
        .and(header("x-goog-api-key", "test-key"))
        .respond_with(sse_response(&[text_event("Hel"), text_event("lo!")]))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let fragments: Vec<String> = client
        .send("hi buddy", &[], Arc::new(ActionLog::new(5)))
        .map(|r| r.unwrap())
        .collect()
        .await;
    assert_eq!(fragments, vec!["Hel", "lo!"]);

    let body = &request_bodies(&server).await[0];
    assert!(
        body["systemInstruction"]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .starts_with("You are Buddy")
    );
    assert_eq!(
        body["contents"],
        json!([{"role": "user", "parts": [{"text": "hi buddy"}]}])
    );
    let declarations = body["tools"][0]["functionDeclarations"].as_array().unwrap();
    let names: Vec<&str> = declarations
        .iter()
        .map(|d| d["name"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        vec!["system_control", "app_control", "media_control", "get_system_status"]
    );
}

#[tokio::test]
async fn function_call_round_trip_sends_history_and_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(sse_response(&[json!({"candidates": [{"content": {
            "role": "model",
            "parts": [{
                "functionCall": {"id": "fc-1", "name": "get_system_status", "args": {}},
                "thoughtSignature": "sig-1"
            }]
        }}]})]))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(sse_response(&[text_event("CPU is at 12%.")]))
        .mount(&server)
        .await;

    let client = client(&server);
    let log = Arc::new(ActionLog::new(5));
    let fragments: Vec<String> = client
        .send("how is my pc?", &[], log.clone())
        .map(|r| r.unwrap())
        .collect()
        .await;
    assert_eq!(fragments, vec!["CPU is at 12%."]);
    assert_eq!(log.latest().unwrap().tool_name, "get_system_status");

    let bodies = request_bodies(&server).await;
    assert_eq!(bodies.len(), 2);
    let contents = bodies[1]["contents"].as_array().unwrap();
    assert_eq!(contents.len(), 3);
    assert_eq!(contents[1]["role"], "model");
    assert_eq!(contents[1]["parts"][0]["thoughtSignature"], "sig-1");
    assert_eq!(contents[2]["role"], "user");
    assert_eq!(
        contents[2]["parts"][0]["functionResponse"],
        json!({
            "id": "fc-1",
            "name": "get_system_status",
            "response": {"result": {
                "cpu_load": "12%",
                "ram_usage": "8.4GB / 16GB",
                "battery": "Charging (98%)",
                "uptime": "4d 2h 15m"
            }}
        })
    );
}

#[tokio::test]
async fn session_history_carries_across_turns() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(sse_response(&[text_event("Hi!")]))
        .mount(&server)
        .await;

    let config = chat_config(&server);
    let service = GeminiService::from_config(&config).unwrap();
    let mut session = service
        .create_session(SessionSetup {
            model: config.model.clone(),
            system_prompt: "be brief".into(),
            tools: Vec::new(),
        })
        .await
        .unwrap();

    for text in ["one", "two"] {
        let mut stream = session
            .send_stream(TurnPayload::Text(text.into()))
            .await
            .unwrap();
        while let Some(chunk) = stream.next().await {
            chunk.unwrap();
        }
    }

    let bodies = request_bodies(&server).await;
    let contents = bodies[1]["contents"].as_array().unwrap();
    assert_eq!(contents.len(), 3);
    assert_eq!(contents[0]["parts"][0]["text"], "one");
    assert_eq!(contents[1]["parts"][0]["text"], "Hi!");
    assert_eq!(contents[2]["parts"][0]["text"], "two");
    assert!(bodies[1].get("tools").is_none());
}

fn status_call_event() -> Value {
    json!({"candidates": [{"content": {
        "role": "model",
        "parts": [{"functionCall": {"id": "fc-1", "name": "get_system_status", "args": {}}}]
    }}]})
}

fn roles_and_kinds(body: &Value) -> Vec<String> {
    body["contents"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| {
            let part = c["parts"][0].as_object().unwrap();
            let kind = part.keys().next().unwrap().clone();
            format!("{}:{kind}", c["role"].as_str().unwrap())
        })
        .collect()
}

#[tokio::test]
async fn failed_tool_continuation_drops_whole_turn() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(sse_response(&[status_call_event()]))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(500).set_body_string("backend error"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(sse_response(&[text_event("Hello!")]))
        .mount(&server)
        .await;

    let client = client(&server);
    let sink = Arc::new(ActionLog::new(5));
    let first: Vec<_> = client.send("status?", &[], sink.clone()).collect().await;
    assert!(matches!(first.last(), Some(Err(BuddyError::Request(_)))));

    let second: Vec<String> = client
        .send("hello", &[], sink)
        .map(|r| r.unwrap())
        .collect()
        .await;
    assert_eq!(second, vec!["Hello!"]);

    let bodies = request_bodies(&server).await;
    assert_eq!(bodies.len(), 3);
    assert_eq!(
        roles_and_kinds(&bodies[1]),
        vec!["user:text", "model:functionCall", "user:functionResponse"]
    );
    assert_eq!(roles_and_kinds(&bodies[2]), vec!["user:text"]);
    assert_eq!(bodies[2]["contents"][0]["parts"][0]["text"], "hello");
}

#[tokio::test]
async fn round_trip_limit_drops_whole_turn() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(sse_response(&[status_call_event()]))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(sse_response(&[text_event("Hello!")]))
        .mount(&server)
        .await;

    let config = ChatConfig {
        max_tool_round_trips: 1,
        ..chat_config(&server)
    };
    let service = Arc::new(GeminiService::from_config(&config).unwrap());
    let executor = Arc::new(MockToolExecutor::new(ToolRegistry::builtin(), Duration::ZERO));
    let client = RemoteChatClient::new(service, &config, executor);
    let sink = Arc::new(ActionLog::new(5));

    let first: Vec<_> = client.send("status?", &[], sink.clone()).collect().await;
    assert!(first.is_empty());
    assert_eq!(sink.len(), 2);

    let second: Vec<_> = client.send("hello", &[], sink).collect().await;
    assert_eq!(second.len(), 1);

    let bodies = request_bodies(&server).await;
    assert_eq!(bodies.len(), 3);
    assert_eq!(roles_and_kinds(&bodies[2]), vec!["user:text"]);
}

#[tokio::test]
async fn unauthorized_maps_to_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {"code": 403, "message": "API key not valid", "status": "PERMISSION_DENIED"}
        })))
        .mount(&server)
        .await;

    let client = client(&server);
    let results: Vec<_> = client
        .send("hello", &[], Arc::new(ActionLog::new(5)))
        .collect()
        .await;
    assert_eq!(results.len(), 1);
    match &results[0] {
        Err(BuddyError::Auth(message)) => assert!(message.contains("API key not valid")),
        other => unreachable!("expected auth error, got {other:?}"),
    }
}

#[tokio::test]
async fn rate_limit_maps_to_request_error_and_keeps_history_clean() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(429).set_body_string("quota"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(sse_response(&[text_event("ok")]))
        .mount(&server)
        .await;

    let client = client(&server);
    let sink = Arc::new(ActionLog::new(5));
    let first: Vec<_> = client.send("one", &[], sink.clone()).collect().await;
    assert!(matches!(first[0], Err(BuddyError::Request(_))));

    let second: Vec<_> = client.send("two", &[], sink).collect().await;
    assert_eq!(second.len(), 1);

    let bodies = request_bodies(&server).await;
    let contents = bodies[1]["contents"].as_array().unwrap();
    assert_eq!(contents.len(), 1);
    assert_eq!(contents[0]["parts"][0]["text"], "two");
}

#[tokio::test]
async fn malformed_event_fails_stream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("data: {\"candidates\": [\r\n\r\n", "text/event-stream"),
        )
        .mount(&server)
        .await;

    let client = client(&server);
    let results: Vec<_> = client
        .send("hello", &[], Arc::new(ActionLog::new(5)))
        .collect()
        .await;
    assert!(matches!(results.last(), Some(Err(BuddyError::Stream(_)))));
}
