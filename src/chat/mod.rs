//! Remote chat: one lazily created model session with function calling.
//!
//! The hosted model is reached through the [`ModelService`] /
//! [`ModelSession`] capability pair. A session yields a stream of
//! [`ModelChunk`]s; each chunk may carry text and tool-call requests.
//! [`RemoteChatClient`] forwards text as it arrives, runs requested tools
//! through the mocked local handlers, and feeds their results back into
//! the same session until the model stops asking for tools.
//!
//! # Exchange Lifecycle
//!
//! ```text
//! user turn → chunk(text)* → chunk(tool calls) → [tools run]
//!           → tool responses → chunk(text)* → end
//! ```

pub mod client;
pub mod gemini;
pub mod prompt;
pub mod sse;
pub mod tools;

pub use client::{RemoteChatClient, ResponseStream};
pub use tools::{MockToolExecutor, Tool, ToolDefinition, ToolRegistry};

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::Attachment;

/// A function call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Call identifier used to match the response. Some models omit it.
    pub id: Option<String>,
    pub name: String,
    /// Untyped argument mapping.
    pub args: serde_json::Value,
}

/// Result of a locally executed tool call, sent back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    pub id: Option<String>,
    pub name: String,
    pub result: serde_json::Value,
}

/// One increment of a streamed model response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelChunk {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl ModelChunk {
    /// A chunk carrying only text.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            tool_calls: Vec::new(),
        }
    }

    /// A chunk carrying only tool calls.
    pub fn tool_calls(calls: Vec<ToolCallRequest>) -> Self {
        Self {
            text: None,
            tool_calls: calls,
        }
    }
}

/// One part of a multi-part user turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Text(String),
    InlineData { mime_type: String, data: String },
}

/// What is sent to the session for one exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnPayload {
    /// Plain user text.
    Text(String),
    /// Optional text part first, then one inline-data part per attachment.
    Parts(Vec<Part>),
    /// Results of the tool calls from the previous exchange.
    ToolResponses(Vec<ToolResponse>),
}

impl TurnPayload {
    /// Package a user turn: plain text, or ordered parts when attachments exist.
    pub fn from_user(text: &str, attachments: &[Attachment]) -> Self {
        if attachments.is_empty() {
            return Self::Text(text.to_owned());
        }
        let mut parts = Vec::with_capacity(attachments.len() + 1);
        if !text.is_empty() {
            parts.push(Part::Text(text.to_owned()));
        }
        parts.extend(attachments.iter().map(|att| Part::InlineData {
            mime_type: att.mime_type.clone(),
            data: att.data.clone(),
        }));
        Self::Parts(parts)
    }
}

/// Everything a session is bound to at creation.
#[derive(Debug, Clone)]
pub struct SessionSetup {
    pub model: String,
    pub system_prompt: String,
    pub tools: Vec<ToolDefinition>,
}

/// A boxed stream of model chunks.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ModelChunk>> + Send>>;

/// Factory for remote conversation contexts.
#[async_trait]
pub trait ModelService: Send + Sync {
    /// Open a new, empty conversation context.
    async fn create_session(&self, setup: SessionSetup) -> Result<Box<dyn ModelSession>>;
}

/// A remote conversation context. History is kept by the session.
#[async_trait]
pub trait ModelSession: Send {
    /// Send one turn and stream the model's reply.
    ///
    /// # Errors
    ///
    /// Returns an error if the exchange cannot be opened. Failures after
    /// that arrive as `Err` items on the stream. Either way the whole user
    /// turn this exchange belongs to is rolled back.
    async fn send_stream(&mut self, payload: TurnPayload) -> Result<ChunkStream>;

    /// Drop the current user turn from history, tool exchanges included.
    ///
    /// Called when a turn ends with tool calls left unanswered.
    fn discard_turn(&mut self);
}
