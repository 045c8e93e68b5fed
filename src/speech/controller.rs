//! Listening state machine.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{ListeningState, MIC_DENIED_MESSAGE, RecognitionBackend, RecognitionEvent};
use crate::config::SpeechConfig;

/// Three-state listening model over a [`RecognitionBackend`].
///
/// The backend is engaged exactly when the state is not [`ListeningState::Off`].
/// Time is passed in explicitly so the silence timer can be driven by any clock.
pub struct SpeechController<B> {
    backend: B,
    wake_phrase: String,
    silence_timeout: Duration,
    state: ListeningState,
    pending_input: String,
    silence_deadline: Option<Instant>,
    error: Option<String>,
}

impl<B: RecognitionBackend> SpeechController<B> {
    pub fn new(backend: B, config: &SpeechConfig) -> Self {
        Self {
            backend,
            wake_phrase: config.wake_phrase.trim().to_lowercase(),
            silence_timeout: config.silence_timeout(),
            state: ListeningState::Off,
            pending_input: String::new(),
            silence_deadline: None,
            error: None,
        }
    }

    pub fn state(&self) -> ListeningState {
        self.state
    }

    /// Text captured since the wake phrase.
    pub fn pending_input(&self) -> &str {
        &self.pending_input
    }

    /// User-visible error flag (e.g. microphone denied).
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// When the live silence timer fires, if one is armed.
    pub fn silence_deadline(&self) -> Option<Instant> {
        self.silence_deadline
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Flip listening on or off and return the new state.
    ///
    /// Turning on clears a previous error flag. If the engine refuses to
    /// start the state stays `Off` and the error flag is set.
    pub fn toggle_listening(&mut self) -> ListeningState {
        if self.state == ListeningState::Off {
            self.error = None;
            match self.backend.start() {
                Ok(()) => {
                    self.state = ListeningState::Standby;
                    info!(wake_phrase = %self.wake_phrase, "listening on, waiting for wake phrase");
                }
                Err(e) => {
                    warn!(error = %e, "speech recognition failed to start");
                    self.error = Some(format!("Speech recognition unavailable: {}", e.message()));
                }
            }
        } else {
            self.disengage();
            info!("listening off");
        }
        self.state
    }

    /// Apply one engine event.
    pub fn handle_event(&mut self, event: RecognitionEvent, now: Instant) {
        match event {
            RecognitionEvent::Result { alternatives, .. } => {
                if let Some(best) = alternatives.first() {
                    self.on_transcript(&best.to_lowercase(), now);
                }
            }
            RecognitionEvent::Error(kind) if kind.is_fatal() => {
                warn!(?kind, "speech recognition denied, listening off");
                self.disengage();
                self.error = Some(MIC_DENIED_MESSAGE.to_owned());
            }
            RecognitionEvent::Error(kind) => {
                warn!(?kind, "transient speech recognition error");
            }
            RecognitionEvent::End => {
                if self.state != ListeningState::Off {
                    // Engines stop on their own after inactivity; keep listening.
                    if let Err(e) = self.backend.start() {
                        debug!(error = %e, "recognition restart ignored");
                    }
                }
            }
        }
    }

    /// Fire the silence timer if its deadline has passed.
    ///
    /// Returns the text to submit, if any. The controller is back in
    /// `Standby` with empty pending input afterwards.
    pub fn poll_silence(&mut self, now: Instant) -> Option<String> {
        let deadline = self.silence_deadline?;
        if now < deadline {
            return None;
        }
        self.silence_deadline = None;
        if self.state != ListeningState::Active {
            return None;
        }

        self.state = ListeningState::Standby;
        let text = std::mem::take(&mut self.pending_input);
        let text = text.trim();
        if text.is_empty() {
            debug!("silence with nothing captured, back to standby");
            None
        } else {
            info!("silence detected, submitting captured input");
            Some(text.to_owned())
        }
    }

    fn on_transcript(&mut self, transcript: &str, now: Instant) {
        match self.state {
            ListeningState::Off => {}
            ListeningState::Standby => {
                if let Some(pos) = transcript.find(&self.wake_phrase) {
                    let rest = &transcript[pos + self.wake_phrase.len()..];
                    self.pending_input = rest.trim().to_owned();
                    self.state = ListeningState::Active;
                    self.arm_silence_timer(now);
                    info!("wake phrase heard, capturing");
                }
            }
            ListeningState::Active => {
                self.pending_input = match transcript.rfind(&self.wake_phrase) {
                    Some(pos) => transcript[pos + self.wake_phrase.len()..].trim().to_owned(),
                    None => transcript.to_owned(),
                };
                self.arm_silence_timer(now);
            }
        }
    }

    /// Replace any live timer; only the latest result's deadline counts.
    fn arm_silence_timer(&mut self, now: Instant) {
        self.silence_deadline = Some(now + self.silence_timeout);
    }

    fn disengage(&mut self) {
        self.state = ListeningState::Off;
        self.silence_deadline = None;
        if let Err(e) = self.backend.stop() {
            debug!(error = %e, "recognition stop ignored");
        }
    }
}
