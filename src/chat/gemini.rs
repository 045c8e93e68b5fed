//! Gemini binding for the model capability.
//!
//! Talks to the public `streamGenerateContent` REST endpoint with
//! `alt=sse`. The endpoint is stateless, so [`GeminiSession`] keeps the
//! conversation history itself and resends it with every exchange.
//!
//! # Wire Format
//!
//! ```text
//! POST {base}/v1beta/models/{model}:streamGenerateContent?alt=sse
//! x-goog-api-key: <key>
//!
//! {"systemInstruction": {...}, "contents": [...], "tools": [{"functionDeclarations": [...]}]}
//! ```
//!
//! Each SSE `data:` line carries a `GenerateContentResponse` whose first
//! candidate holds text and `functionCall` parts.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::ChatConfig;
use crate::error::{BuddyError, Result};

use super::sse::{SseEvent, SseLineParser};
use super::{
    ChunkStream, ModelChunk, ModelService, ModelSession, Part, SessionSetup, ToolCallRequest,
    ToolDefinition, TurnPayload,
};

// ── Wire types ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Content {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub role: String,
    #[serde(default)]
    pub parts: Vec<WirePart>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WirePart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Set on reasoning summaries; their text is not shown to the user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<bool>,
    /// Opaque signature that must be echoed back with the part.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought_signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_response: Option<FunctionResponse>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct FunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct FunctionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub response: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: Content,
    contents: &'a [Content],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolBlock<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolBlock<'a> {
    function_declarations: &'a [ToolDefinition],
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    error: Option<ApiError>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

impl WirePart {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }
}

/// Convert an outgoing turn to a `user` content entry.
pub(crate) fn payload_to_content(payload: TurnPayload) -> Content {
    let parts = match payload {
        TurnPayload::Text(text) => vec![WirePart::text(text)],
        TurnPayload::Parts(parts) => parts
            .into_iter()
            .map(|part| match part {
                Part::Text(text) => WirePart::text(text),
                Part::InlineData { mime_type, data } => WirePart {
                    inline_data: Some(InlineData { mime_type, data }),
                    ..WirePart::default()
                },
            })
            .collect(),
        TurnPayload::ToolResponses(responses) => responses
            .into_iter()
            .map(|r| WirePart {
                function_response: Some(FunctionResponse {
                    id: r.id,
                    name: r.name,
                    response: json!({ "result": r.result }),
                }),
                ..WirePart::default()
            })
            .collect(),
    };
    Content {
        role: "user".to_owned(),
        parts,
    }
}

/// Decode one SSE payload.
///
/// Returns the chunk to surface (if it carries text or calls) together
/// with the raw parts to keep in history.
fn decode_event(data: &str) -> Result<(Option<ModelChunk>, Vec<WirePart>)> {
    let response: GenerateResponse = serde_json::from_str(data)
        .map_err(|e| BuddyError::Stream(format!("invalid stream payload: {e}")))?;

    if let Some(error) = response.error {
        return Err(BuddyError::Stream(format!("model error: {}", error.message)));
    }

    let Some(candidate) = response.candidates.into_iter().next() else {
        return Ok((None, Vec::new()));
    };
    if let Some(reason) = &candidate.finish_reason {
        debug!(finish_reason = %reason, "candidate finished");
    }
    let parts = candidate.content.map(|c| c.parts).unwrap_or_default();

    let mut text = String::new();
    let mut tool_calls = Vec::new();
    for part in &parts {
        if let Some(t) = &part.text
            && part.thought != Some(true)
        {
            text.push_str(t);
        }
        if let Some(call) = &part.function_call {
            tool_calls.push(ToolCallRequest {
                id: call.id.clone(),
                name: call.name.clone(),
                args: call.args.clone(),
            });
        }
    }

    let chunk = (!text.is_empty() || !tool_calls.is_empty()).then(|| ModelChunk {
        text: (!text.is_empty()).then_some(text),
        tool_calls,
    });
    Ok((chunk, parts))
}

fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .map(String::from)
        })
        .unwrap_or_else(|| body.to_owned())
}

fn map_http_error(status: reqwest::StatusCode, body: &str) -> BuddyError {
    let message = extract_error_message(body);
    match status.as_u16() {
        401 | 403 => BuddyError::Auth(format!("Gemini authentication failed: {message}")),
        429 => BuddyError::Request(format!("Gemini rate limited: {message}")),
        code => BuddyError::Request(format!("Gemini HTTP {code}: {message}")),
    }
}

// ── Service ─────────────────────────────────────────────────

/// Creates [`GeminiSession`]s sharing one HTTP client.
#[derive(Debug, Clone)]
pub struct GeminiService {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    request_timeout: Duration,
}

impl GeminiService {
    /// Build a service from chat configuration.
    ///
    /// A missing API key is not an error here; every exchange then fails
    /// with an authentication error instead.
    pub fn from_config(config: &ChatConfig) -> Result<Self> {
        let request_timeout = Duration::from_secs(config.request_timeout_secs);
        let client = reqwest::Client::builder()
            .connect_timeout(request_timeout)
            .build()
            .map_err(|e| BuddyError::Config(format!("cannot build HTTP client: {e}")))?;
        let api_key = config.resolve_api_key();
        if api_key.is_none() {
            warn!("no Gemini API key configured; remote chat will fail");
        }
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            api_key,
            request_timeout,
        })
    }
}

#[async_trait]
impl ModelService for GeminiService {
    async fn create_session(&self, setup: SessionSetup) -> Result<Box<dyn ModelSession>> {
        Ok(Box::new(GeminiSession {
            service: self.clone(),
            setup,
            history: Arc::new(Mutex::new(Vec::new())),
            turn_start: 0,
        }))
    }
}

/// One conversation with client-side history.
pub struct GeminiSession {
    service: GeminiService,
    setup: SessionSetup,
    history: Arc<Mutex<Vec<Content>>>,
    /// History length before the current user turn.
    turn_start: usize,
}

impl GeminiSession {
    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.service.base_url, self.setup.model
        )
    }
}

#[async_trait]
impl ModelSession for GeminiSession {
    async fn send_stream(&mut self, payload: TurnPayload) -> Result<ChunkStream> {
        let api_key = self
            .service
            .api_key
            .clone()
            .ok_or_else(|| BuddyError::Auth("no Gemini API key configured".into()))?;

        let (body, rollback_len) = {
            let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
            if !matches!(payload, TurnPayload::ToolResponses(_)) {
                self.turn_start = history.len();
            }
            // Tool continuations roll back with the user turn that started them.
            let rollback_len = self.turn_start;
            history.push(payload_to_content(payload));
            let tools = if self.setup.tools.is_empty() {
                Vec::new()
            } else {
                vec![ToolBlock {
                    function_declarations: &self.setup.tools,
                }]
            };
            let request = GenerateRequest {
                system_instruction: Content {
                    role: String::new(),
                    parts: vec![WirePart::text(self.setup.system_prompt.clone())],
                },
                contents: &history,
                tools,
            };
            let body = serde_json::to_value(&request)
                .map_err(|e| BuddyError::Request(format!("cannot encode request: {e}")));
            (body, rollback_len)
        };
        let rollback = |history: &Arc<Mutex<Vec<Content>>>| {
            history
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .truncate(rollback_len);
        };
        let body = match body {
            Ok(body) => body,
            Err(e) => {
                rollback(&self.history);
                return Err(e);
            }
        };

        debug!(model = %self.setup.model, turn_start = rollback_len, "sending exchange");
        let request = self
            .service
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send();

        let response = match tokio::time::timeout(self.service.request_timeout, request).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                rollback(&self.history);
                return Err(BuddyError::Request(format!("Gemini request failed: {e}")));
            }
            Err(_) => {
                rollback(&self.history);
                return Err(BuddyError::Request("Gemini request timed out".into()));
            }
        };

        let status = response.status();
        if !status.is_success() {
            rollback(&self.history);
            let body_text = response.text().await.unwrap_or_default();
            return Err(map_http_error(status, &body_text));
        }

        Ok(Box::pin(create_chunk_stream(
            response.bytes_stream(),
            Arc::clone(&self.history),
            rollback_len,
        )))
    }

    fn discard_turn(&mut self) {
        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        debug!(dropped = history.len().saturating_sub(self.turn_start), "discarding turn");
        history.truncate(self.turn_start);
    }
}

// ── Streaming ───────────────────────────────────────────────

struct StreamState {
    byte_stream: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
    parser: SseLineParser,
    buffer: VecDeque<Result<ModelChunk>>,
    model_parts: Vec<WirePart>,
    history: Arc<Mutex<Vec<Content>>>,
    rollback_len: usize,
    finished: bool,
}

impl StreamState {
    fn ingest(&mut self, event: &SseEvent) {
        if event.is_done() {
            return;
        }
        match decode_event(&event.data) {
            Ok((chunk, parts)) => {
                self.model_parts.extend(parts);
                if let Some(chunk) = chunk {
                    self.buffer.push_back(Ok(chunk));
                }
            }
            Err(e) => self.fail(e),
        }
    }

    /// Drop the unanswered user turn and surface `error` as the last item.
    fn fail(&mut self, error: BuddyError) {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .truncate(self.rollback_len);
        self.buffer.push_back(Err(error));
        self.finished = true;
    }

    /// Append the model's turn to history.
    fn commit(&mut self) {
        let parts = std::mem::take(&mut self.model_parts);
        if !parts.is_empty() {
            self.history
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(Content {
                    role: "model".to_owned(),
                    parts,
                });
        }
        self.finished = true;
    }
}

fn create_chunk_stream(
    byte_stream: impl Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
    history: Arc<Mutex<Vec<Content>>>,
    rollback_len: usize,
) -> impl Stream<Item = Result<ModelChunk>> + Send {
    futures_util::stream::unfold(
        StreamState {
            byte_stream: Box::pin(byte_stream),
            parser: SseLineParser::new(),
            buffer: VecDeque::new(),
            model_parts: Vec::new(),
            history,
            rollback_len,
            finished: false,
        },
        |mut state| async move {
            loop {
                if let Some(item) = state.buffer.pop_front() {
                    return Some((item, state));
                }
                if state.finished {
                    return None;
                }

                match state.byte_stream.next().await {
                    Some(Ok(bytes)) => {
                        for event in state.parser.push(&bytes) {
                            if state.finished {
                                break;
                            }
                            state.ingest(&event);
                        }
                    }
                    Some(Err(e)) => {
                        state.fail(BuddyError::Stream(format!("stream read error: {e}")));
                    }
                    None => {
                        if let Some(event) = state.parser.flush() {
                            state.ingest(&event);
                        }
                        if !state.finished {
                            state.commit();
                        }
                    }
                }
            }
        },
    )
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::chat::ToolResponse;

    #[test]
    fn tool_responses_wrap_result() {
        let content = payload_to_content(TurnPayload::ToolResponses(vec![ToolResponse {
            id: Some("c1".into()),
            name: "get_system_status".into(),
            result: json!({"cpu_load": "12%"}),
        }]));
        assert_eq!(content.role, "user");
        let value = serde_json::to_value(&content.parts[0]).unwrap();
        assert_eq!(
            value,
            json!({"functionResponse": {
                "id": "c1",
                "name": "get_system_status",
                "response": {"result": {"cpu_load": "12%"}}
            }})
        );
    }

    #[test]
    fn inline_data_uses_camel_case() {
        let content = payload_to_content(TurnPayload::Parts(vec![
            Part::Text("look".into()),
            Part::InlineData {
                mime_type: "image/png".into(),
                data: "AAAA".into(),
            },
        ]));
        let value = serde_json::to_value(&content).unwrap();
        assert_eq!(
            value,
            json!({"role": "user", "parts": [
                {"text": "look"},
                {"inlineData": {"mimeType": "image/png", "data": "AAAA"}}
            ]})
        );
    }

    #[test]
    fn decode_text_and_calls() {
        let data = r#"{"candidates":[{"content":{"role":"model","parts":[
            {"text":"Opening "},
            {"functionCall":{"id":"c9","name":"app_control","args":{"action":"open","appName":"Notes"}},"thoughtSignature":"sig"}
        ]}}]}"#;
        let (chunk, parts) = decode_event(data).unwrap();
        let chunk = chunk.unwrap();
        assert_eq!(chunk.text.as_deref(), Some("Opening "));
        assert_eq!(chunk.tool_calls.len(), 1);
        assert_eq!(chunk.tool_calls[0].id.as_deref(), Some("c9"));
        assert_eq!(chunk.tool_calls[0].args["appName"], "Notes");
        assert_eq!(parts[1].thought_signature.as_deref(), Some("sig"));
    }

    #[test]
    fn decode_skips_thoughts_and_empty_candidates() {
        let thought = r#"{"candidates":[{"content":{"parts":[{"text":"hmm","thought":true}]}}]}"#;
        let (chunk, parts) = decode_event(thought).unwrap();
        assert!(chunk.is_none());
        assert_eq!(parts.len(), 1);

        let (chunk, parts) = decode_event(r#"{"usageMetadata":{}}"#).unwrap();
        assert!(chunk.is_none());
        assert!(parts.is_empty());
    }

    #[test]
    fn decode_reports_inline_errors() {
        let err = decode_event(r#"{"error":{"code":500,"message":"boom"}}"#).unwrap_err();
        assert_eq!(err.code(), crate::error::error_codes::STREAM_FAILED);
        assert!(decode_event("not json").is_err());
    }

    #[test]
    fn http_errors_map_to_categories() {
        let body = r#"{"error":{"message":"API key not valid"}}"#;
        assert!(matches!(
            map_http_error(reqwest::StatusCode::FORBIDDEN, body),
            BuddyError::Auth(m) if m.contains("API key not valid")
        ));
        assert!(matches!(
            map_http_error(reqwest::StatusCode::TOO_MANY_REQUESTS, "slow down"),
            BuddyError::Request(_)
        ));
        assert!(matches!(
            map_http_error(reqwest::StatusCode::INTERNAL_SERVER_ERROR, ""),
            BuddyError::Request(m) if m.contains("500")
        ));
    }
}
