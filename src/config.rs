//! Configuration types for the assistant.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{BuddyError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuddyConfig {
    /// Wake phrase and silence detection.
    pub speech: SpeechConfig,
    /// Hosted model settings.
    pub chat: ChatConfig,
    /// Mocked tool handler settings.
    pub tools: ToolsConfig,
    /// Offline interpreter settings.
    pub offline: OfflineConfig,
    /// Action log settings.
    pub actions: ActionLogConfig,
    /// Simulated resource telemetry.
    pub telemetry: TelemetryConfig,
    /// Network reachability probe.
    pub network: NetworkConfig,
}

/// Speech controller configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Phrase that moves listening from standby to active (case-insensitive).
    pub wake_phrase: String,
    /// Silence in milliseconds after the last recognition result before the
    /// pending input is submitted.
    pub silence_timeout_ms: u64,
    /// BCP-47 language tag handed to the recognition engine.
    pub language: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            wake_phrase: "hey buddy".to_owned(),
            silence_timeout_ms: 2_500,
            language: "en-US".to_owned(),
        }
    }
}

impl SpeechConfig {
    /// Silence timeout as a [`Duration`].
    pub fn silence_timeout(&self) -> Duration {
        Duration::from_millis(self.silence_timeout_ms)
    }
}

/// Hosted model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Model identifier.
    pub model: String,
    /// API base URL (no trailing slash).
    pub base_url: String,
    /// API key. When `None`, `GEMINI_API_KEY` and then `API_KEY` are read
    /// from the environment.
    pub api_key: Option<String>,
    /// Overrides the built-in persona prompt.
    pub system_prompt: Option<String>,
    /// Maximum tool-response continuations per user turn.
    pub max_tool_round_trips: u32,
    /// Time allowed to connect and receive response headers, in seconds.
    pub request_timeout_secs: u64,
    /// Text shown in place of a response when the remote path fails.
    pub connection_error_message: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: "gemini-3-pro-preview".to_owned(),
            base_url: "https://generativelanguage.googleapis.com".to_owned(),
            api_key: None,
            system_prompt: None,
            max_tool_round_trips: 8,
            request_timeout_secs: 60,
            connection_error_message:
                "I'm having trouble connecting. Try checking your internet connection.".to_owned(),
        }
    }
}

impl ChatConfig {
    /// Resolve the API key from config or environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .or_else(|| std::env::var("API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
    }
}

/// Mocked tool handler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Simulated execution time of every tool call.
    pub execution_delay_ms: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            execution_delay_ms: 800,
        }
    }
}

impl ToolsConfig {
    pub fn execution_delay(&self) -> Duration {
        Duration::from_millis(self.execution_delay_ms)
    }
}

/// Offline interpreter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineConfig {
    /// Pacing delay before the offline reply is produced.
    pub response_delay_ms: u64,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            response_delay_ms: 600,
        }
    }
}

impl OfflineConfig {
    pub fn response_delay(&self) -> Duration {
        Duration::from_millis(self.response_delay_ms)
    }
}

/// Action log configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionLogConfig {
    /// Number of recent actions retained for display.
    pub max_entries: usize,
}

impl Default for ActionLogConfig {
    fn default() -> Self {
        Self { max_entries: 5 }
    }
}

/// Simulated telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Interval between synthesized samples.
    pub interval_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { interval_ms: 2_000 }
    }
}

impl TelemetryConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Reachability probe configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Host contacted to decide between the remote and offline paths.
    pub probe_host: String,
    /// Port for the probe connection.
    pub probe_port: u16,
    /// Probe connect timeout.
    pub probe_timeout_ms: u64,
    /// Always take the offline path.
    pub force_offline: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            probe_host: "generativelanguage.googleapis.com".to_owned(),
            probe_port: 443,
            probe_timeout_ms: 1_500,
            force_offline: false,
        }
    }
}

impl BuddyConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| BuddyError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| BuddyError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/buddy/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("buddy").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("buddy")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/buddy-config/config.toml")
        }
    }

    /// Reject values the runtime cannot operate with.
    ///
    /// # Errors
    ///
    /// Returns [`BuddyError::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.speech.wake_phrase.trim().is_empty() {
            return Err(BuddyError::Config("speech.wake_phrase must not be empty".into()));
        }
        if self.speech.silence_timeout_ms == 0 {
            return Err(BuddyError::Config(
                "speech.silence_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.actions.max_entries == 0 {
            return Err(BuddyError::Config(
                "actions.max_entries must be greater than zero".into(),
            ));
        }
        if self.chat.max_tool_round_trips == 0 {
            return Err(BuddyError::Config(
                "chat.max_tool_round_trips must be greater than zero".into(),
            ));
        }
        if self.chat.model.trim().is_empty() {
            return Err(BuddyError::Config("chat.model must not be empty".into()));
        }
        if self.telemetry.interval_ms == 0 {
            return Err(BuddyError::Config(
                "telemetry.interval_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
