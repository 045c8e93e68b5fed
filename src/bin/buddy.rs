//! Terminal front-end for Buddy.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use buddy::action_log::{ActionLog, format_entry};
use buddy::chat::gemini::GeminiService;
use buddy::chat::{MockToolExecutor, RemoteChatClient, ToolRegistry};
use buddy::error::{BuddyError, Result as BuddyResult};
use buddy::offline::OfflineInterpreter;
use buddy::router::{
    CommandRouter, Connectivity, RejectReason, StaticConnectivity, SubmitOutcome, TcpProbe,
};
use buddy::speech::{
    ListeningState, RecognitionBackend, RecognitionEvent, SpeechCommand, SpeechController,
    SpeechEvent, run_speech_loop,
};
use buddy::telemetry::spawn_telemetry;
use buddy::{Attachment, BuddyConfig, RuntimeEvent};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Buddy: voice and text assistant with an offline fallback.
#[derive(Parser)]
#[command(name = "buddy", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Skip the network probe and always use the offline interpreter.
    #[arg(long)]
    offline: bool,
}

/// Recognizer for a terminal: transcripts are typed with `/hear`.
struct TypedRecognizer {
    language: String,
    running: Arc<AtomicBool>,
}

impl RecognitionBackend for TypedRecognizer {
    fn start(&mut self) -> BuddyResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(BuddyError::Recognition("recognizer already running".into()));
        }
        debug!(language = %self.language, "recognizer started");
        Ok(())
    }

    fn stop(&mut self) -> BuddyResult<()> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the conversation; logs go to stderr.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    run(config, cli.offline).await
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<BuddyConfig> {
    if let Some(path) = path {
        return BuddyConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()));
    }
    let default_path = BuddyConfig::default_config_path();
    if default_path.exists() {
        info!(path = %default_path.display(), "loading config");
        return Ok(BuddyConfig::from_file(&default_path)?);
    }
    Ok(BuddyConfig::default())
}

async fn run(config: BuddyConfig, force_offline: bool) -> anyhow::Result<()> {
    println!("Buddy v{}", env!("CARGO_PKG_VERSION"));

    let cancel = CancellationToken::new();
    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C, shutting down...");
            cancel_on_signal.cancel();
        }
    });

    let actions = Arc::new(ActionLog::new(config.actions.max_entries));
    let (events_tx, events_rx) = broadcast::channel(256);

    let service = Arc::new(GeminiService::from_config(&config.chat)?);
    let executor = Arc::new(MockToolExecutor::new(
        ToolRegistry::builtin(),
        config.tools.execution_delay(),
    ));
    let chat = RemoteChatClient::new(service, &config.chat, executor);
    let connectivity: Arc<dyn Connectivity> = if force_offline || config.network.force_offline {
        println!("Offline mode: using the local command interpreter.");
        Arc::new(StaticConnectivity::new(false))
    } else {
        Arc::new(TcpProbe::from_config(&config.network))
    };
    let router = Arc::new(
        CommandRouter::new(
            chat,
            OfflineInterpreter::new(config.offline.response_delay()),
            Arc::clone(&connectivity),
            Arc::clone(&actions),
            config.chat.connection_error_message.clone(),
        )
        .with_events(events_tx),
    );

    let telemetry = spawn_telemetry(config.telemetry.interval(), cancel.clone());

    // Speech driver fed by `/hear`.
    let controller = SpeechController::new(
        TypedRecognizer {
            language: config.speech.language.clone(),
            running: Arc::new(AtomicBool::new(false)),
        },
        &config.speech,
    );
    let (recognition_tx, recognition_rx) = mpsc::channel(32);
    let (command_tx, command_rx) = mpsc::channel(8);
    let (speech_tx, speech_rx) = mpsc::channel(32);
    let (listening_tx, listening_rx) = watch::channel(ListeningState::Off);
    tokio::spawn(run_speech_loop(
        controller,
        recognition_rx,
        command_rx,
        speech_tx,
        cancel.clone(),
    ));
    tokio::spawn(handle_speech_events(
        speech_rx,
        Arc::clone(&router),
        listening_tx,
    ));
    tokio::spawn(print_runtime_events(events_rx, cancel.clone()));

    print_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt().await;
        let line = tokio::select! {
            () = cancel.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };
        let line = line.trim();

        let (command, rest) = match line.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };

        match command {
            "" => {}
            "/quit" | "/exit" => break,
            "/help" => print_help(),
            "/attach" => match Attachment::from_path(std::path::Path::new(rest)) {
                Ok(attachment) => {
                    println!("Attached {} ({})", rest, attachment.mime_type);
                    router.attach(attachment);
                }
                Err(e) => println!("Cannot attach: {}", e.message()),
            },
            "/remove" => match rest.parse::<usize>() {
                Ok(n) if n > 0 && router.remove_attachment(n - 1).is_some() => {
                    println!("Removed attachment {n}");
                }
                _ => println!("No attachment {rest}"),
            },
            "/reset" => {
                router.reset_conversation();
                println!("Conversation cleared.");
            }
            "/actions" => {
                let recent = actions.recent();
                if recent.is_empty() {
                    println!("No actions yet.");
                }
                for action in recent {
                    println!("{}", format_entry(&action));
                }
            }
            "/status" => {
                let snapshot = *telemetry.borrow();
                let online = connectivity.is_online().await;
                println!(
                    "CPU {:.0}%  RAM {:.0}%  network {}  listening {}",
                    snapshot.cpu_percent,
                    snapshot.ram_percent,
                    if online { "online" } else { "offline" },
                    *listening_rx.borrow(),
                );
            }
            "/mic" => {
                command_tx.send(SpeechCommand::ToggleListening).await?;
            }
            "/hear" => {
                recognition_tx
                    .send(RecognitionEvent::transcript(rest, true))
                    .await?;
            }
            _ => spawn_submit(Arc::clone(&router), line.to_owned()),
        }
    }

    cancel.cancel();
    println!("Bye!");
    Ok(())
}

/// Submit `text` without blocking the prompt.
fn spawn_submit(router: Arc<CommandRouter>, text: String) {
    tokio::spawn(async move {
        if router.submit(&text).await == SubmitOutcome::Rejected(RejectReason::Busy) {
            println!("Still working on the last request.");
        }
    });
}

async fn handle_speech_events(
    mut rx: mpsc::Receiver<SpeechEvent>,
    router: Arc<CommandRouter>,
    listening: watch::Sender<ListeningState>,
) {
    while let Some(event) = rx.recv().await {
        match event {
            SpeechEvent::StateChanged(state) => {
                let _ = listening.send(state);
                println!("[mic: {state}]");
            }
            SpeechEvent::PendingInput(text) => {
                if !text.is_empty() {
                    println!("[hearing: {text}]");
                }
            }
            SpeechEvent::Submit(text) => {
                println!("> {text}");
                spawn_submit(Arc::clone(&router), text);
            }
            SpeechEvent::Error(message) => println!("[mic error: {message}]"),
        }
    }
}

/// Print streamed turns incrementally, plus recorded actions.
async fn print_runtime_events(
    mut rx: broadcast::Receiver<RuntimeEvent>,
    cancel: CancellationToken,
) {
    let mut printed = String::new();
    loop {
        let event = tokio::select! {
            () = cancel.cancelled() => break,
            event = rx.recv() => event,
        };
        match event {
            Ok(RuntimeEvent::TurnAppended(message)) if message.is_streaming => {
                printed.clear();
                print!("Buddy: ");
            }
            Ok(RuntimeEvent::TurnUpdated { text, .. }) => {
                match text.strip_prefix(printed.as_str()) {
                    Some(suffix) => print!("{suffix}"),
                    None => print!("\n{text}"),
                }
                printed = text;
                let _ = std::io::Write::flush(&mut std::io::stdout());
            }
            Ok(RuntimeEvent::TurnFinished { .. }) => println!(),
            Ok(RuntimeEvent::ActionRecorded(action)) => {
                println!("\n  {}", format_entry(&action));
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(skipped = n, "event printer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn prompt() {
    let mut stdout = tokio::io::stdout();
    let _ = stdout.write_all(b"> ").await;
    let _ = stdout.flush().await;
}

fn print_help() {
    println!(
        "\nType a message and press Enter. Commands:\n  \
         /attach <path>   queue an image for the next message\n  \
         /remove <n>      drop queued image n\n  \
         /reset           clear the conversation\n  \
         /actions         show recent system actions\n  \
         /status          show system load and connectivity\n  \
         /mic             toggle hands-free listening\n  \
         /hear <words>    feed a recognized phrase to the listener\n  \
         /quit            exit\n"
    );
}
