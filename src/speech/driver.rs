//! Async driver for the listening state machine.

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{ListeningState, RecognitionBackend, RecognitionEvent, SpeechController};

/// Front-end requests to the speech loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechCommand {
    /// Microphone button.
    ToggleListening,
}

/// What the speech loop reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechEvent {
    /// Listening state changed.
    StateChanged(ListeningState),
    /// Pending input text changed.
    PendingInput(String),
    /// Silence ended a capture with this text; submit it as a user turn.
    Submit(String),
    /// A user-visible recognition error was raised.
    Error(String),
}

/// Observable controller state used to diff before/after each step.
#[derive(PartialEq)]
struct Snapshot {
    state: ListeningState,
    pending: String,
    error: Option<String>,
}

fn snapshot<B: RecognitionBackend>(c: &SpeechController<B>) -> Snapshot {
    Snapshot {
        state: c.state(),
        pending: c.pending_input().to_owned(),
        error: c.error().map(str::to_owned),
    }
}

/// Drive `controller` until `cancel` fires or the engine's event channel closes.
///
/// Owns the single silence timer: every recognition result replaces the
/// deadline, so only the newest result's timer can fire.
pub async fn run_speech_loop<B: RecognitionBackend>(
    mut controller: SpeechController<B>,
    mut recognition_rx: mpsc::Receiver<RecognitionEvent>,
    mut command_rx: mpsc::Receiver<SpeechCommand>,
    event_tx: mpsc::Sender<SpeechEvent>,
    cancel: CancellationToken,
) -> SpeechController<B> {
    info!("speech loop started");

    loop {
        let deadline = controller.silence_deadline();
        let silence = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        let before = snapshot(&controller);
        let mut submitted = None;

        tokio::select! {
            () = cancel.cancelled() => break,
            Some(cmd) = command_rx.recv() => {
                match cmd {
                    SpeechCommand::ToggleListening => {
                        controller.toggle_listening();
                    }
                }
            }
            event = recognition_rx.recv() => {
                match event {
                    Some(event) => {
                        debug!(?event, "recognition event");
                        controller.handle_event(event, Instant::now());
                    }
                    None => break,
                }
            }
            () = silence => {
                submitted = controller.poll_silence(Instant::now());
            }
        }

        if !publish(&before, &controller, submitted, &event_tx).await {
            break;
        }
    }

    info!("speech loop stopped");
    controller
}

/// Emit events for whatever changed. Returns `false` once the receiver is gone.
async fn publish<B: RecognitionBackend>(
    before: &Snapshot,
    controller: &SpeechController<B>,
    submitted: Option<String>,
    tx: &mpsc::Sender<SpeechEvent>,
) -> bool {
    let after = snapshot(controller);
    if after == *before && submitted.is_none() {
        return true;
    }

    let mut events = Vec::new();
    if let Some(error) = after.error.as_ref().filter(|e| before.error.as_ref() != Some(*e)) {
        events.push(SpeechEvent::Error(error.clone()));
    }
    if let Some(text) = submitted {
        events.push(SpeechEvent::Submit(text));
    }
    if after.pending != before.pending {
        events.push(SpeechEvent::PendingInput(after.pending.clone()));
    }
    if after.state != before.state {
        events.push(SpeechEvent::StateChanged(after.state));
    }

    for event in events {
        if tx.send(event).await.is_err() {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use std::time::Duration;

    use super::*;
    use crate::config::SpeechConfig;
    use crate::error::Result;

    struct NullBackend;

    impl RecognitionBackend for NullBackend {
        fn start(&mut self) -> Result<()> {
            Ok(())
        }
        fn stop(&mut self) -> Result<()> {
            Ok(())
        }
    }

    struct Harness {
        recognition_tx: mpsc::Sender<RecognitionEvent>,
        command_tx: mpsc::Sender<SpeechCommand>,
        event_rx: mpsc::Receiver<SpeechEvent>,
        cancel: CancellationToken,
        handle: tokio::task::JoinHandle<SpeechController<NullBackend>>,
    }

    fn spawn_loop() -> Harness {
        let controller = SpeechController::new(NullBackend, &SpeechConfig::default());
        let (recognition_tx, recognition_rx) = mpsc::channel(16);
        let (command_tx, command_rx) = mpsc::channel(16);
        let (event_tx, event_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_speech_loop(
            controller,
            recognition_rx,
            command_rx,
            event_tx,
            cancel.clone(),
        ));
        Harness {
            recognition_tx,
            command_tx,
            event_rx,
            cancel,
            handle,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn wake_then_silence_submits_once() {
        let mut h = spawn_loop();

        h.command_tx.send(SpeechCommand::ToggleListening).await.unwrap();
        assert_eq!(
            h.event_rx.recv().await,
            Some(SpeechEvent::StateChanged(ListeningState::Standby))
        );

        h.recognition_tx
            .send(RecognitionEvent::transcript("hey buddy open notes", false))
            .await
            .unwrap();
        assert_eq!(
            h.event_rx.recv().await,
            Some(SpeechEvent::PendingInput("open notes".into()))
        );
        assert_eq!(
            h.event_rx.recv().await,
            Some(SpeechEvent::StateChanged(ListeningState::Active))
        );

        // Paused clock auto-advances to the silence deadline.
        assert_eq!(
            h.event_rx.recv().await,
            Some(SpeechEvent::Submit("open notes".into()))
        );
        assert_eq!(h.event_rx.recv().await, Some(SpeechEvent::PendingInput(String::new())));
        assert_eq!(
            h.event_rx.recv().await,
            Some(SpeechEvent::StateChanged(ListeningState::Standby))
        );

        h.cancel.cancel();
        let controller = h.handle.await.unwrap();
        assert_eq!(controller.state(), ListeningState::Standby);
    }

    #[tokio::test(start_paused = true)]
    async fn later_result_replaces_pending_timer() {
        let mut h = spawn_loop();
        h.command_tx.send(SpeechCommand::ToggleListening).await.unwrap();
        h.event_rx.recv().await;

        let start = Instant::now();
        h.recognition_tx
            .send(RecognitionEvent::transcript("hey buddy play", false))
            .await
            .unwrap();
        h.event_rx.recv().await;
        h.event_rx.recv().await;

        tokio::time::sleep(Duration::from_millis(2_000)).await;
        h.recognition_tx
            .send(RecognitionEvent::transcript("hey buddy play jazz", true))
            .await
            .unwrap();
        assert_eq!(
            h.event_rx.recv().await,
            Some(SpeechEvent::PendingInput("play jazz".into()))
        );

        assert_eq!(
            h.event_rx.recv().await,
            Some(SpeechEvent::Submit("play jazz".into()))
        );
        assert!(start.elapsed() >= Duration::from_millis(4_500));
        h.cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn denial_reports_error_and_off() {
        let mut h = spawn_loop();
        h.command_tx.send(SpeechCommand::ToggleListening).await.unwrap();
        h.event_rx.recv().await;

        h.recognition_tx
            .send(RecognitionEvent::Error(
                crate::speech::RecognitionErrorKind::NotAllowed,
            ))
            .await
            .unwrap();
        assert_eq!(
            h.event_rx.recv().await,
            Some(SpeechEvent::Error(crate::speech::MIC_DENIED_MESSAGE.into()))
        );
        assert_eq!(
            h.event_rx.recv().await,
            Some(SpeechEvent::StateChanged(ListeningState::Off))
        );
        h.cancel.cancel();
    }

    #[tokio::test]
    async fn closing_recognition_channel_stops_loop() {
        let h = spawn_loop();
        drop(h.recognition_tx);
        let controller = h.handle.await.unwrap();
        assert_eq!(controller.state(), ListeningState::Off);
    }
}
