//! Hands-free listening: wake phrase detection and silence-triggered submission.
//!
//! The platform speech engine is reached through [`RecognitionBackend`]
//! (start/stop) and delivers [`RecognitionEvent`]s. The
//! [`SpeechController`] turns those into a three-state listening model:
//!
//! ```text
//! off ──toggle──▶ standby ──wake phrase──▶ active ──silence──▶ standby
//!  ▲                 │                       │
//!  └──toggle / mic denied────────────────────┘
//! ```
//!
//! [`run_speech_loop`] drives a controller from async channels and owns the
//! single silence timer.

mod controller;
mod driver;

pub use controller::SpeechController;
pub use driver::{SpeechCommand, SpeechEvent, run_speech_loop};

use crate::error::Result;

/// Message shown when the microphone is refused.
pub const MIC_DENIED_MESSAGE: &str = "Mic access denied";

/// Listening state of the assistant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListeningState {
    /// Recognition is stopped.
    #[default]
    Off,
    /// Recognition runs; speech is ignored until the wake phrase is heard.
    Standby,
    /// Speech is captured into the pending input.
    Active,
}

impl std::fmt::Display for ListeningState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Off => write!(f, "off"),
            Self::Standby => write!(f, "standby"),
            Self::Active => write!(f, "active"),
        }
    }
}

/// Error categories reported by the speech engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionErrorKind {
    /// The user or OS refused microphone access.
    NotAllowed,
    /// The recognition service itself is not permitted.
    ServiceNotAllowed,
    /// The capture device failed.
    AudioCapture,
    /// No speech was heard for a while.
    NoSpeech,
    /// The engine lost its network connection.
    Network,
    /// The engine aborted the current session.
    Aborted,
    /// Anything else, with the engine's own label.
    Other(String),
}

impl RecognitionErrorKind {
    /// Whether this error ends the listening feature for the session.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::NotAllowed | Self::ServiceNotAllowed | Self::AudioCapture
        )
    }
}

/// Events delivered by the speech engine.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionEvent {
    /// Latest result; alternatives are ordered by confidence.
    Result {
        alternatives: Vec<String>,
        is_final: bool,
    },
    /// The engine reported an error.
    Error(RecognitionErrorKind),
    /// The engine stopped delivering results.
    End,
}

impl RecognitionEvent {
    /// A result with a single alternative.
    pub fn transcript(text: impl Into<String>, is_final: bool) -> Self {
        Self::Result {
            alternatives: vec![text.into()],
            is_final,
        }
    }
}

/// Capability handle for a continuous, interim-results speech engine.
///
/// Only the [`SpeechController`] calls these.
pub trait RecognitionBackend: Send {
    /// Begin (or resume) delivering recognition events.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine is unavailable or already running.
    fn start(&mut self) -> Result<()>;

    /// Stop delivering recognition events.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine refuses to stop.
    fn stop(&mut self) -> Result<()>;
}
