//! threadrelay - relay a terminal coding assistant session into a chat thread
//!
//! `threadrelay run` tails the session's transcript and watches its tmux
//! window, printing every chat operation (send/edit/delete) as one JSON line
//! on stdout. Human-readable progress goes to stderr; logs go to
//! `$XDG_STATE_HOME/threadrelay/`.
//!
//! `threadrelay classify` reads a pane snapshot and prints the detected state.

mod console;
mod tmux;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use threadrelay_core::terminal::parse_question_options;
use threadrelay_core::{
    classify, ChatAdapter, Config, ConversationKey, Multiplexer, Pipeline, SessionBinding, UiState,
};

use crate::console::ConsoleChat;
use crate::tmux::TmuxMultiplexer;

#[derive(Parser)]
#[command(name = "threadrelay")]
#[command(about = "Relay a terminal coding assistant session into a chat thread")]
#[command(version)]
struct Args {
    /// Config file (default: $XDG_CONFIG_HOME/threadrelay/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Relay one session until Ctrl+C
    Run {
        /// Assistant session id (transcript file stem)
        #[arg(short, long)]
        session: String,

        /// tmux window the assistant runs in
        #[arg(short, long)]
        window: String,

        /// Chat id to relay into
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        chat: i64,

        /// Thread (topic) id inside the chat
        #[arg(long)]
        thread: Option<i64>,

        /// Transcript path, when it cannot be found from the session id
        #[arg(long)]
        transcript: Option<PathBuf>,

        /// Replay the transcript from the beginning instead of its current end
        #[arg(long)]
        from_start: bool,
    },

    /// Classify a pane snapshot read from FILE or stdin
    Classify {
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Run {
            session,
            window,
            chat,
            thread,
            transcript,
            from_start,
        } => {
            let mut config = load_config(args.config.as_deref())?;
            if from_start {
                config.monitor.skip_existing = false;
            }
            let binding = SessionBinding {
                session_id: session,
                window,
                key: ConversationKey::new(chat, thread),
                transcript,
            };
            run(config, binding).await
        }
        Command::Classify { file } => classify_snapshot(file.as_deref()),
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load configuration from {}", path.display())),
        None => Config::load().context("failed to load configuration"),
    }
}

async fn run(config: Config, binding: SessionBinding) -> Result<()> {
    let _log_guard =
        threadrelay_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!("threadrelay starting");

    let chat: Arc<dyn ChatAdapter> = Arc::new(ConsoleChat::new());
    let mux: Arc<dyn Multiplexer> = Arc::new(TmuxMultiplexer::new(config.tmux.session_name.clone()));
    let pipeline = Pipeline::start(&config, chat, mux);

    let session_id = binding.session_id.clone();
    let window = binding.window.clone();
    let key = binding.key;
    let transcript = pipeline.attach(binding);

    eprintln!("Relaying session {} into {}", session_id, key);
    eprintln!("  Transcript: {}", transcript.display());
    eprintln!("  Window:     {}:{}", config.tmux.session_name, window);
    eprintln!("Press Ctrl+C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;

    eprintln!("\nShutting down...");
    if !pipeline.shutdown().await {
        eprintln!("Some messages were not delivered before the shutdown timeout");
    }

    tracing::info!("threadrelay stopped");
    Ok(())
}

fn classify_snapshot(file: Option<&Path>) -> Result<()> {
    let snapshot = match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            buf
        }
    };

    let output = match classify(&snapshot) {
        UiState::InteractivePrompt { kind, content } => serde_json::json!({
            "state": "interactive_prompt",
            "prompt": kind.as_str(),
            "options": parse_question_options(&content)
                .into_iter()
                .map(|(_, label)| label)
                .collect::<Vec<_>>(),
            "content": content,
        }),
        UiState::Busy => serde_json::json!({ "state": "busy" }),
        UiState::Idle => serde_json::json!({ "state": "idle" }),
        UiState::Exited => serde_json::json!({ "state": "exited" }),
        UiState::Unknown => serde_json::json!({ "state": "unknown" }),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
