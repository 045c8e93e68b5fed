//! Bounded log of recently executed system actions.
//!
//! Both the remote tool handler and the offline interpreter record into an
//! [`ActionSink`]. The [`ActionLog`] keeps only the newest entries.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::Local;

use crate::types::SystemAction;

/// Anything that can accept a recorded system action.
pub trait ActionSink: Send + Sync {
    /// Record an action. Must not block.
    fn record(&self, action: SystemAction);
}

/// Recent-history action log. Oldest entries are evicted first.
pub struct ActionLog {
    capacity: usize,
    entries: Mutex<VecDeque<SystemAction>>,
}

impl ActionLog {
    /// Create a log that retains at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Retained entries, newest first.
    pub fn recent(&self) -> Vec<SystemAction> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.iter().rev().cloned().collect()
    }

    /// The most recently recorded action.
    pub fn latest(&self) -> Option<SystemAction> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.back().cloned()
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ActionSink for ActionLog {
    fn record(&self, action: SystemAction) {
        tracing::info!(tool_name = %action.tool_name, status = ?action.status, "action recorded");
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(action);
    }
}

/// Render an action as a dashboard log line:
/// `[HH:MM:SS] EXEC: <tool> <args>` with JSON quotes removed.
pub fn format_entry(action: &SystemAction) -> String {
    let time = action.timestamp.with_timezone(&Local).format("%H:%M:%S");
    let args = serde_json::to_string(&action.args)
        .unwrap_or_default()
        .replace('"', "");
    format!("[{time}] EXEC: {} {args}", action.tool_name)
}
