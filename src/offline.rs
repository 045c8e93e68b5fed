//! Local command interpreter used when the hosted model is unreachable.
//!
//! Ordered pattern checks, first match wins:
//!
//! | Phrase | Action |
//! |--------|--------|
//! | "shutdown", "shut down", "turn off" | `system_control {action: shutdown}` |
//! | "restart", "reboot" | `system_control {action: restart}` |
//! | "open {name}" | `app_control {action: open, appName}` |
//! | "volume up", "louder" | `media_control {command: set_volume, value: 80}` |
//! | "mute", "silence" | `media_control {command: mute}` |

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde_json::json;

use crate::action_log::ActionSink;
use crate::types::SystemAction;

static SHUTDOWN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"shut\s?down|turn off").expect("valid pattern"));
static RESTART_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"restart|reboot").expect("valid pattern"));
static OPEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)open\s+(.+)").expect("valid pattern"));
static FILLER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:application|app|program)\b").expect("valid pattern"));

const SHUTDOWN_REPLY: &str = "I'm initiating the shutdown sequence now. Goodnight!";
const RESTART_REPLY: &str = "Restarting the system. I'll see you in a moment.";
const VOLUME_UP_REPLY: &str = "Turning the volume up.";
const MUTE_REPLY: &str = "System muted.";
const FALLBACK_REPLY: &str = "I am currently offline, but I can help you with basic system \
commands like 'Shutdown', 'Open Calculator', or 'Mute'. Please check your internet connection \
for full features.";

/// Volume level applied by the "volume up" intent.
const VOLUME_UP_LEVEL: u8 = 80;

/// Result of interpreting one utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct OfflineReply {
    /// Text shown as the model turn.
    pub text: String,
    /// Tool name and arguments of the matched intent, if any.
    pub action: Option<(String, serde_json::Value)>,
}

impl OfflineReply {
    fn with_action(text: impl Into<String>, tool: &str, args: serde_json::Value) -> Self {
        Self {
            text: text.into(),
            action: Some((tool.to_owned(), args)),
        }
    }
}

/// Match an utterance against the offline intents. Pure; no delay, no side effects.
pub fn interpret(text: &str) -> OfflineReply {
    let lower = text.to_lowercase();

    if SHUTDOWN_RE.is_match(&lower) {
        return OfflineReply::with_action(
            SHUTDOWN_REPLY,
            "system_control",
            json!({"action": "shutdown"}),
        );
    }

    if RESTART_RE.is_match(&lower) {
        return OfflineReply::with_action(
            RESTART_REPLY,
            "system_control",
            json!({"action": "restart"}),
        );
    }

    if let Some(caps) = OPEN_RE.captures(text) {
        let raw = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let app_name = clean_app_name(raw);
        return OfflineReply::with_action(
            format!("Opening {app_name} for you locally."),
            "app_control",
            json!({"action": "open", "appName": app_name}),
        );
    }

    if lower.contains("volume up") || lower.contains("louder") {
        return OfflineReply::with_action(
            VOLUME_UP_REPLY,
            "media_control",
            json!({"command": "set_volume", "value": VOLUME_UP_LEVEL}),
        );
    }

    if lower.contains("mute") || lower.contains("silence") {
        return OfflineReply::with_action(MUTE_REPLY, "media_control", json!({"command": "mute"}));
    }

    OfflineReply {
        text: FALLBACK_REPLY.to_owned(),
        action: None,
    }
}

/// Remove filler words, then trim the ends.
fn clean_app_name(raw: &str) -> String {
    FILLER_RE.replace_all(raw, "").trim().to_owned()
}

/// Offline interpreter with its pacing delay.
pub struct OfflineInterpreter {
    delay: Duration,
}

impl OfflineInterpreter {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Wait out the pacing delay, record the matched action (if any) and
    /// return the reply text.
    pub async fn respond(&self, text: &str, sink: &dyn ActionSink) -> String {
        tokio::time::sleep(self.delay).await;
        let reply = interpret(text);
        tracing::debug!(matched = reply.action.is_some(), "offline command interpreted");
        if let Some((tool, args)) = reply.action {
            sink.record(SystemAction::success(tool, args));
        }
        reply.text
    }
}
