//! Conversation data model: turns, attachments and recorded system actions.

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BuddyError, Result};

/// Author of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Text typed or spoken by the user.
    User,
    /// Response produced by the model (or the offline interpreter).
    Model,
}

/// One turn of the conversation.
///
/// `text` is mutated while `is_streaming` is set and frozen afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_streaming: bool,
}

impl Message {
    /// A completed user turn.
    pub fn user(text: impl Into<String>, attachments: Vec<Attachment>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: Role::User,
            text: text.into(),
            attachments,
            timestamp: Utc::now(),
            is_streaming: false,
        }
    }

    /// An empty model turn that will be filled in while streaming.
    pub fn model_placeholder() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: Role::Model,
            text: String::new(),
            attachments: Vec::new(),
            timestamp: Utc::now(),
            is_streaming: true,
        }
    }
}

/// MIME types accepted as image attachments, keyed by file extension.
const IMAGE_EXTENSIONS: &[(&str, &str)] = &[
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("bmp", "image/bmp"),
    ("heic", "image/heic"),
];

/// An inline image sent along with a user turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub mime_type: String,
    /// Base64 payload (standard alphabet, padded).
    pub data: String,
    /// `data:` URI suitable for direct rendering.
    pub preview_url: String,
}

impl Attachment {
    /// Build an attachment from raw image bytes.
    ///
    /// # Errors
    ///
    /// Returns [`BuddyError::Attachment`] if `mime_type` is not an `image/*` type
    /// or the payload is empty.
    pub fn from_bytes(mime_type: &str, bytes: &[u8]) -> Result<Self> {
        let mime_type = mime_type.trim().to_ascii_lowercase();
        if !mime_type.starts_with("image/") {
            return Err(BuddyError::Attachment(format!(
                "only image files can be attached, got '{mime_type}'"
            )));
        }
        if bytes.is_empty() {
            return Err(BuddyError::Attachment("image file is empty".into()));
        }
        let data = STANDARD.encode(bytes);
        let preview_url = format!("data:{mime_type};base64,{data}");
        Ok(Self {
            mime_type,
            data,
            preview_url,
        })
    }

    /// Read an image file, inferring its MIME type from the extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the extension is not a known image type or the
    /// file cannot be read.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let mime_type = IMAGE_EXTENSIONS
            .iter()
            .find(|(known, _)| *known == ext)
            .map(|(_, mime)| *mime)
            .ok_or_else(|| {
                BuddyError::Attachment(format!("{} is not an image file", path.display()))
            })?;
        let bytes = std::fs::read(path)?;
        Self::from_bytes(mime_type, &bytes)
    }
}

/// Lifecycle of a recorded system action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Pending,
    Success,
    Failed,
}

/// A tool invocation shown in the action log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemAction {
    pub tool_name: String,
    pub args: serde_json::Value,
    pub status: ActionStatus,
    pub timestamp: DateTime<Utc>,
}

impl SystemAction {
    /// A successful action stamped with the current time.
    pub fn success(tool_name: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            args,
            status: ActionStatus::Success,
            timestamp: Utc::now(),
        }
    }
}
