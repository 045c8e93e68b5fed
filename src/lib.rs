//! Buddy: voice and text assistant with streamed model tool calling.
//!
//! User input arrives either typed or spoken and is routed to a hosted
//! model or, when the network is unreachable, to a local command
//! interpreter:
//! Speech / text → Router → (Remote chat | Offline interpreter) → Action log
//!
//! # Architecture
//!
//! - **Speech**: off / standby / active listening with wake-phrase
//!   detection and silence-triggered submission
//! - **Router**: owns the conversation, checks reachability per submission
//! - **Chat**: one lazy model session; tool calls run against mocked
//!   handlers and their results are fed back into the session
//! - **Offline**: regex intent matcher with canned replies
//! - **Action log / telemetry**: recent actions and simulated resource load

pub mod action_log;
pub mod chat;
pub mod config;
pub mod error;
pub mod offline;
pub mod router;
pub mod runtime;
pub mod speech;
pub mod telemetry;
pub mod types;

pub use action_log::{ActionLog, ActionSink};
pub use chat::RemoteChatClient;
pub use config::BuddyConfig;
pub use error::{BuddyError, Result};
pub use router::{CommandRouter, SubmitOutcome};
pub use runtime::RuntimeEvent;
pub use speech::{ListeningState, SpeechController};
pub use types::{Attachment, Message, Role, SystemAction};
