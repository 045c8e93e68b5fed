//! Tool declarations offered to the model and their mocked local handlers.
//!
//! Handlers never touch the host. They return canned results so the model
//! can confirm the action back to the user.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use crate::action_log::ActionSink;
use crate::types::SystemAction;

use super::{ToolCallRequest, ToolResponse};

/// A function declaration in the model's schema dialect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// A tool the model may call.
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Parameter schema (uppercase JSON-schema type names).
    fn schema(&self) -> Value;

    /// Produce the canned result for `args`.
    fn execute(&self, args: &Value) -> Value;
}

fn str_arg<'a>(args: &'a Value, key: &str) -> &'a str {
    args.get(key).and_then(Value::as_str).unwrap_or("unknown")
}

/// Power management: shutdown, restart, sleep, lock, sign out.
pub struct SystemControlTool;

impl Tool for SystemControlTool {
    fn name(&self) -> &str {
        "system_control"
    }

    fn description(&self) -> &str {
        "Control power states of the Windows operating system."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "OBJECT",
            "properties": {
                "action": {
                    "type": "STRING",
                    "enum": ["shutdown", "restart", "sleep", "lock", "sign_out"],
                    "description": "The power action to execute."
                },
                "force": {
                    "type": "BOOLEAN",
                    "description": "Whether to force the action."
                }
            },
            "required": ["action"]
        })
    }

    fn execute(&self, args: &Value) -> Value {
        json!({
            "status": "success",
            "message": format!("System {} sequence initiated.", str_arg(args, "action")),
        })
    }
}

/// Opens, closes or focuses an application by name.
pub struct AppControlTool;

impl Tool for AppControlTool {
    fn name(&self) -> &str {
        "app_control"
    }

    fn description(&self) -> &str {
        "Open, close, or manage Windows applications."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "OBJECT",
            "properties": {
                "action": {
                    "type": "STRING",
                    "enum": ["open", "close", "focus"],
                    "description": "The action to perform on the application."
                },
                "appName": {
                    "type": "STRING",
                    "description": "The name of the application (e.g., Spotify, Chrome, Notepad)."
                }
            },
            "required": ["action", "appName"]
        })
    }

    fn execute(&self, args: &Value) -> Value {
        json!({
            "status": "success",
            "message": format!(
                "Application '{}' {}ed successfully.",
                str_arg(args, "appName"),
                str_arg(args, "action")
            ),
        })
    }
}

/// Volume and playback control.
pub struct MediaControlTool;

impl Tool for MediaControlTool {
    fn name(&self) -> &str {
        "media_control"
    }

    fn description(&self) -> &str {
        "Control system volume and media playback."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "OBJECT",
            "properties": {
                "command": {
                    "type": "STRING",
                    "enum": ["set_volume", "mute", "unmute", "next_track", "prev_track", "play_pause"]
                },
                "value": {
                    "type": "INTEGER",
                    "description": "Volume level percentage (0-100) if command is set_volume."
                }
            },
            "required": ["command"]
        })
    }

    fn execute(&self, args: &Value) -> Value {
        json!({
            "status": "success",
            "message": format!("Media command '{}' executed.", str_arg(args, "command")),
        })
    }
}

/// Fixed resource snapshot.
pub struct SystemStatusTool;

impl Tool for SystemStatusTool {
    fn name(&self) -> &str {
        "get_system_status"
    }

    fn description(&self) -> &str {
        "Get current system resource usage (CPU, RAM, Battery)."
    }

    fn schema(&self) -> Value {
        json!({ "type": "OBJECT", "properties": {} })
    }

    fn execute(&self, _args: &Value) -> Value {
        json!({
            "cpu_load": "12%",
            "ram_usage": "8.4GB / 16GB",
            "battery": "Charging (98%)",
            "uptime": "4d 2h 15m",
        })
    }
}

/// Ordered set of tools; declaration order is preserved for the model.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The four system tools Buddy declares to the model.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(SystemControlTool));
        registry.register(Arc::new(AppControlTool));
        registry.register(Arc::new(MediaControlTool));
        registry.register(Arc::new(SystemStatusTool));
        registry
    }

    /// Register a tool, replacing any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        match self.tools.iter().position(|t| t.name() == tool.name()) {
            Some(i) => self.tools[i] = tool,
            None => self.tools.push(tool),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Declarations for session setup, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_owned(),
                description: t.description().to_owned(),
                parameters: t.schema(),
            })
            .collect()
    }
}

/// Runs model-requested calls against the registry with a simulated delay.
pub struct MockToolExecutor {
    registry: ToolRegistry,
    delay: Duration,
}

impl MockToolExecutor {
    pub fn new(registry: ToolRegistry, delay: Duration) -> Self {
        Self { registry, delay }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Record the call, wait out the delay and build its response.
    ///
    /// Unknown tool names are still recorded; they answer with an error
    /// payload instead of failing the turn.
    pub async fn execute(&self, call: &ToolCallRequest, sink: &dyn ActionSink) -> ToolResponse {
        info!(tool = %call.name, args = %call.args, "executing tool call");
        sink.record(SystemAction::success(call.name.clone(), call.args.clone()));

        tokio::time::sleep(self.delay).await;

        let result = match self.registry.get(&call.name) {
            Some(tool) => tool.execute(&call.args),
            None => {
                tracing::warn!(tool = %call.name, "model requested an unknown tool");
                json!({ "status": "error", "message": "Unknown tool" })
            }
        };

        ToolResponse {
            id: call.id.clone(),
            name: call.name.clone(),
            result,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::action_log::ActionLog;
    use crate::types::ActionStatus;

    fn call(name: &str, args: Value) -> ToolCallRequest {
        ToolCallRequest {
            id: Some("call-1".into()),
            name: name.into(),
            args,
        }
    }

    #[test]
    fn builtin_declares_four_tools_in_order() {
        let registry = ToolRegistry::builtin();
        assert_eq!(
            registry.names(),
            vec!["system_control", "app_control", "media_control", "get_system_status"]
        );
        let defs = registry.definitions();
        assert_eq!(defs[1].parameters["required"], json!(["action", "appName"]));
        assert_eq!(
            defs[0].parameters["properties"]["action"]["enum"],
            json!(["shutdown", "restart", "sleep", "lock", "sign_out"])
        );
    }

    #[test]
    fn declarations_keep_published_wording() {
        let defs = ToolRegistry::builtin().definitions();
        assert_eq!(
            defs[0].description,
            "Control power states of the Windows operating system."
        );
        assert_eq!(
            defs[2].parameters["properties"]["value"]["description"],
            "Volume level percentage (0-100) if command is set_volume."
        );
        assert!(defs[2].parameters["properties"]["command"]
            .get("description")
            .is_none());
        assert_eq!(
            defs[3].description,
            "Get current system resource usage (CPU, RAM, Battery)."
        );
    }

    #[test]
    fn register_replaces_same_name() {
        let mut registry = ToolRegistry::builtin();
        registry.register(Arc::new(SystemStatusTool));
        assert_eq!(registry.names().len(), 4);
    }

    #[test]
    fn canned_results() {
        assert_eq!(
            AppControlTool.execute(&json!({"action": "open", "appName": "Spotify"}))["message"],
            "Application 'Spotify' opened successfully."
        );
        assert_eq!(
            SystemControlTool.execute(&json!({"action": "lock"}))["message"],
            "System lock sequence initiated."
        );
        assert_eq!(
            MediaControlTool.execute(&json!({"command": "mute"}))["message"],
            "Media command 'mute' executed."
        );
        assert_eq!(SystemStatusTool.execute(&json!({}))["battery"], "Charging (98%)");
    }

    #[tokio::test(start_paused = true)]
    async fn executor_records_then_waits() {
        let log = ActionLog::new(5);
        let executor = MockToolExecutor::new(ToolRegistry::builtin(), Duration::from_millis(800));
        let start = tokio::time::Instant::now();

        let response = executor
            .execute(&call("app_control", json!({"action": "open", "appName": "Notes"})), &log)
            .await;

        assert!(start.elapsed() >= Duration::from_millis(800));
        assert_eq!(response.id.as_deref(), Some("call-1"));
        assert_eq!(response.name, "app_control");
        assert_eq!(response.result["status"], "success");

        let recorded = log.latest().unwrap();
        assert_eq!(recorded.tool_name, "app_control");
        assert_eq!(recorded.status, ActionStatus::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_tool_answers_with_error_payload() {
        let log = ActionLog::new(5);
        let executor = MockToolExecutor::new(ToolRegistry::builtin(), Duration::ZERO);
        let response = executor.execute(&call("format_disk", json!({})), &log).await;
        assert_eq!(
            response.result,
            json!({"status": "error", "message": "Unknown tool"})
        );
        assert_eq!(log.len(), 1);
    }
}
