//! Runtime events emitted by the router for front-ends.
//!
//! Published on a broadcast channel; lagging receivers drop events.

use crate::types::{Message, SystemAction};

/// Events that describe what the conversation is doing "right now".
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A turn was appended to the conversation.
    TurnAppended(Message),
    /// A streaming turn's text was replaced with the full accumulated text.
    TurnUpdated { id: String, text: String },
    /// A turn stopped streaming; its text is now final.
    TurnFinished { id: String },
    /// All turns were removed and the remote session discarded.
    ConversationReset,
    /// A tool call (remote or offline) was recorded.
    ActionRecorded(SystemAction),
}
