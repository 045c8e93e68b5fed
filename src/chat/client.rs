//! Remote chat client: lazy session, streaming text, tool round trips.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use futures_util::{Stream, StreamExt};
use tracing::{debug, info, warn};

use crate::action_log::ActionSink;
use crate::config::ChatConfig;
use crate::error::Result;
use crate::types::Attachment;

use super::prompt::SYSTEM_PROMPT;
use super::tools::MockToolExecutor;
use super::{ModelService, ModelSession, SessionSetup, TurnPayload};

/// Text fragments of one user turn, in arrival order.
pub type ResponseStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

type SharedSession = Arc<tokio::sync::Mutex<Box<dyn ModelSession>>>;

/// Holds at most one live session and runs user turns through it.
///
/// The session is created on first use and reused until [`reset`](Self::reset).
pub struct RemoteChatClient {
    service: Arc<dyn ModelService>,
    setup: SessionSetup,
    executor: Arc<MockToolExecutor>,
    max_round_trips: u32,
    session: Arc<Mutex<Option<SharedSession>>>,
}

impl RemoteChatClient {
    pub fn new(
        service: Arc<dyn ModelService>,
        config: &ChatConfig,
        executor: Arc<MockToolExecutor>,
    ) -> Self {
        let setup = SessionSetup {
            model: config.model.clone(),
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| SYSTEM_PROMPT.to_owned()),
            tools: executor.registry().definitions(),
        };
        Self {
            service,
            setup,
            executor,
            max_round_trips: config.max_tool_round_trips,
            session: Arc::new(Mutex::new(None)),
        }
    }

    /// Whether a session currently exists.
    pub fn has_session(&self) -> bool {
        self.session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Discard the session; the next turn starts a fresh one.
    ///
    /// A stream already in flight keeps the old session until it ends.
    pub fn reset(&self) {
        let dropped = self
            .session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if dropped.is_some() {
            info!("remote session discarded");
        }
    }

    /// Send one user turn and stream the model's text back.
    ///
    /// Tool calls are executed as they arrive and recorded on `sink`. Their
    /// responses go back to the same session once the current exchange
    /// ends, and the continuation's text is yielded on the same stream. The
    /// stream ends when an exchange produces no tool calls, or after
    /// `max_tool_round_trips` continuations. Hitting the limit drops the
    /// whole turn from the session history.
    pub fn send(
        &self,
        text: &str,
        attachments: &[Attachment],
        sink: Arc<dyn ActionSink>,
    ) -> ResponseStream {
        let turn = Turn {
            payload: TurnPayload::from_user(text, attachments),
            slot: Arc::clone(&self.session),
            service: Arc::clone(&self.service),
            setup: self.setup.clone(),
            executor: Arc::clone(&self.executor),
            max_round_trips: self.max_round_trips,
            sink,
        };
        Box::pin(run_turn(turn))
    }
}

/// Everything one user turn needs, detached from the client.
struct Turn {
    payload: TurnPayload,
    slot: Arc<Mutex<Option<SharedSession>>>,
    service: Arc<dyn ModelService>,
    setup: SessionSetup,
    executor: Arc<MockToolExecutor>,
    max_round_trips: u32,
    sink: Arc<dyn ActionSink>,
}

fn run_turn(turn: Turn) -> impl Stream<Item = Result<String>> + Send {
    async_stream::try_stream! {
        let Turn { payload, slot, service, setup, executor, max_round_trips, sink } = turn;
        let session = acquire_session(&slot, service.as_ref(), setup).await?;
        let mut worklist = VecDeque::from([payload]);
        let mut round_trips = 0u32;

        while let Some(payload) = worklist.pop_front() {
            let mut chunks = session.lock().await.send_stream(payload).await?;
            let mut responses = Vec::new();

            while let Some(chunk) = chunks.next().await {
                let chunk = chunk?;
                if let Some(text) = chunk.text.filter(|t| !t.is_empty()) {
                    yield text;
                }
                for call in &chunk.tool_calls {
                    responses.push(executor.execute(call, sink.as_ref()).await);
                }
            }

            if responses.is_empty() {
                continue;
            }
            if round_trips >= max_round_trips {
                warn!(
                    max_round_trips,
                    pending = responses.len(),
                    "tool round-trip limit reached; discarding turn"
                );
                session.lock().await.discard_turn();
                break;
            }
            round_trips += 1;
            debug!(round_trips, responses = responses.len(), "returning tool results");
            worklist.push_back(TurnPayload::ToolResponses(responses));
        }
    }
}

/// Return the live session, creating it if the slot is empty.
async fn acquire_session(
    slot: &Mutex<Option<SharedSession>>,
    service: &dyn ModelService,
    setup: SessionSetup,
) -> Result<SharedSession> {
    let existing = slot.lock().unwrap_or_else(|e| e.into_inner()).clone();
    if let Some(existing) = existing {
        return Ok(existing);
    }

    let model = setup.model.clone();
    let created: SharedSession = Arc::new(tokio::sync::Mutex::new(
        service.create_session(setup).await?,
    ));

    let mut guard = slot.lock().unwrap_or_else(|e| e.into_inner());
    match guard.as_ref() {
        Some(existing) => Ok(Arc::clone(existing)),
        None => {
            info!(%model, "remote session created");
            *guard = Some(Arc::clone(&created));
            Ok(created)
        }
    }
}
