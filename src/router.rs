//! Command router: owns the conversation and dispatches each submission
//! to the remote chat client or the offline interpreter.
//!
//! # Submission
//!
//! ```text
//! submit(text)
//!   ├─ empty / busy ──────────────▶ Rejected
//!   ├─ append user turn + placeholder, clear draft and attachments
//!   ├─ online?  ─ yes ─▶ stream fragments, replace placeholder text each time
//!   │           └ no ──▶ offline reply, set placeholder text once
//!   └─ finish placeholder ───────▶ Completed | Failed (fixed error text)
//! ```
//!
//! The reachability check runs on every submission; nothing is cached.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::action_log::{ActionLog, ActionSink};
use crate::chat::RemoteChatClient;
use crate::config::NetworkConfig;
use crate::error::Result;
use crate::offline::OfflineInterpreter;
use crate::runtime::RuntimeEvent;
use crate::types::{Attachment, Message, SystemAction};

// ── Connectivity ────────────────────────────────────────────

/// Network reachability signal.
#[async_trait]
pub trait Connectivity: Send + Sync {
    async fn is_online(&self) -> bool;
}

/// Reachability by opening a TCP connection to the model host.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    host: String,
    port: u16,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }

    pub fn from_config(config: &NetworkConfig) -> Self {
        Self::new(
            config.probe_host.clone(),
            config.probe_port,
            Duration::from_millis(config.probe_timeout_ms),
        )
    }
}

#[async_trait]
impl Connectivity for TcpProbe {
    async fn is_online(&self) -> bool {
        let connect = tokio::net::TcpStream::connect((self.host.as_str(), self.port));
        match tokio::time::timeout(self.timeout, connect).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!(host = %self.host, error = %e, "connectivity probe failed");
                false
            }
            Err(_) => {
                debug!(host = %self.host, "connectivity probe timed out");
                false
            }
        }
    }
}

/// Fixed reachability that can be flipped at runtime.
#[derive(Debug)]
pub struct StaticConnectivity {
    online: AtomicBool,
}

impl StaticConnectivity {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connectivity for StaticConnectivity {
    async fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

// ── Outcomes ────────────────────────────────────────────────

/// Why a submission was ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Blank text and no attachments.
    Empty,
    /// A previous turn is still in flight.
    Busy,
}

/// Result of [`CommandRouter::submit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Nothing was appended.
    Rejected(RejectReason),
    /// The response turn holds the model's (or interpreter's) text.
    Completed { turn_id: String },
    /// The response turn holds the connection-error message.
    Failed { turn_id: String },
}

// ── Router ──────────────────────────────────────────────────

#[derive(Default)]
struct Conversation {
    messages: Vec<Message>,
    draft: String,
    attachments: Vec<Attachment>,
    in_flight: bool,
}

/// Records into the action log and mirrors each record as a runtime event.
struct RouterSink {
    log: Arc<ActionLog>,
    events: Option<broadcast::Sender<RuntimeEvent>>,
}

impl ActionSink for RouterSink {
    fn record(&self, action: SystemAction) {
        if let Some(tx) = &self.events {
            let _ = tx.send(RuntimeEvent::ActionRecorded(action.clone()));
        }
        self.log.record(action);
    }
}

/// Owns the conversation and routes each submission.
pub struct CommandRouter {
    state: Mutex<Conversation>,
    chat: RemoteChatClient,
    offline: OfflineInterpreter,
    connectivity: Arc<dyn Connectivity>,
    actions: Arc<ActionLog>,
    events: Option<broadcast::Sender<RuntimeEvent>>,
    error_message: String,
}

impl CommandRouter {
    pub fn new(
        chat: RemoteChatClient,
        offline: OfflineInterpreter,
        connectivity: Arc<dyn Connectivity>,
        actions: Arc<ActionLog>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            state: Mutex::new(Conversation::default()),
            chat,
            offline,
            connectivity,
            actions,
            events: None,
            error_message: error_message.into(),
        }
    }

    /// Publish every conversation mutation on `tx`.
    pub fn with_events(mut self, tx: broadcast::Sender<RuntimeEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Conversation> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, event: RuntimeEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    fn sink(&self) -> Arc<dyn ActionSink> {
        Arc::new(RouterSink {
            log: Arc::clone(&self.actions),
            events: self.events.clone(),
        })
    }

    // ── Buffers ──

    pub fn set_draft(&self, text: impl Into<String>) {
        self.lock().draft = text.into();
    }

    pub fn draft(&self) -> String {
        self.lock().draft.clone()
    }

    /// Queue an attachment for the next submission.
    pub fn attach(&self, attachment: Attachment) {
        self.lock().attachments.push(attachment);
    }

    /// Remove a queued attachment. Out-of-range indexes are ignored.
    pub fn remove_attachment(&self, index: usize) -> Option<Attachment> {
        let mut conv = self.lock();
        (index < conv.attachments.len()).then(|| conv.attachments.remove(index))
    }

    pub fn attachments(&self) -> Vec<Attachment> {
        self.lock().attachments.clone()
    }

    /// Snapshot of all turns.
    pub fn messages(&self) -> Vec<Message> {
        self.lock().messages.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.lock().in_flight
    }

    pub fn action_log(&self) -> &Arc<ActionLog> {
        &self.actions
    }

    /// Clear turns and buffers and discard the remote session.
    pub fn reset_conversation(&self) {
        {
            let mut conv = self.lock();
            conv.messages.clear();
            conv.draft.clear();
            conv.attachments.clear();
        }
        self.chat.reset();
        info!("conversation reset");
        self.publish(RuntimeEvent::ConversationReset);
    }

    // ── Submission ──

    /// Submit the current draft with the queued attachments.
    pub async fn submit_draft(&self) -> SubmitOutcome {
        let draft = self.draft();
        self.submit(&draft).await
    }

    /// Submit `text` with the queued attachments and wait for the response turn.
    pub async fn submit(&self, text: &str) -> SubmitOutcome {
        let text = text.trim();
        let (turn_id, attachments) = {
            let mut conv = self.lock();
            if text.is_empty() && conv.attachments.is_empty() {
                return SubmitOutcome::Rejected(RejectReason::Empty);
            }
            if conv.in_flight {
                debug!("submission rejected: turn in flight");
                return SubmitOutcome::Rejected(RejectReason::Busy);
            }
            conv.in_flight = true;
            conv.draft.clear();
            let attachments = std::mem::take(&mut conv.attachments);

            let user = Message::user(text, attachments.clone());
            let placeholder = Message::model_placeholder();
            let turn_id = placeholder.id.clone();
            conv.messages.push(user.clone());
            conv.messages.push(placeholder.clone());
            self.publish(RuntimeEvent::TurnAppended(user));
            self.publish(RuntimeEvent::TurnAppended(placeholder));
            (turn_id, attachments)
        };

        let online = self.connectivity.is_online().await;
        info!(online, attachments = attachments.len(), "routing submission");

        let result = if online {
            self.run_remote(&turn_id, text, &attachments).await
        } else {
            let reply = self.offline.respond(text, self.sink().as_ref()).await;
            self.set_turn_text(&turn_id, reply);
            Ok(())
        };

        let outcome = match result {
            Ok(()) => SubmitOutcome::Completed {
                turn_id: turn_id.clone(),
            },
            Err(e) => {
                warn!(code = e.code(), error = %e.message(), "remote turn failed");
                self.set_turn_text(&turn_id, self.error_message.clone());
                SubmitOutcome::Failed {
                    turn_id: turn_id.clone(),
                }
            }
        };
        self.finish_turn(&turn_id);
        outcome
    }

    async fn run_remote(&self, turn_id: &str, text: &str, attachments: &[Attachment]) -> Result<()> {
        let mut stream = self.chat.send(text, attachments, self.sink());
        let mut full_text = String::new();
        while let Some(fragment) = stream.next().await {
            full_text.push_str(&fragment?);
            self.set_turn_text(turn_id, full_text.clone());
        }
        Ok(())
    }

    fn set_turn_text(&self, turn_id: &str, text: String) {
        {
            let mut conv = self.lock();
            // A reset mid-turn removes the placeholder; late updates are dropped.
            let Some(turn) = conv.messages.iter_mut().find(|m| m.id == turn_id) else {
                return;
            };
            turn.text = text.clone();
        }
        self.publish(RuntimeEvent::TurnUpdated {
            id: turn_id.to_owned(),
            text,
        });
    }

    fn finish_turn(&self, turn_id: &str) {
        {
            let mut conv = self.lock();
            if let Some(turn) = conv.messages.iter_mut().find(|m| m.id == turn_id) {
                turn.is_streaming = false;
            }
            conv.in_flight = false;
        }
        self.publish(RuntimeEvent::TurnFinished {
            id: turn_id.to_owned(),
        });
    }
}
