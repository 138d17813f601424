//! threadrelay-debug-watch - transcript tailing debugging tool
//!
//! Tails one transcript file and prints every parsed event as JSON, together
//! with the chat text it would produce.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;
use serde::Serialize;
use threadrelay_core::transcript::{render_event, MonitoredTranscript};
use threadrelay_core::ParsedEvent;

#[derive(Parser)]
#[command(name = "threadrelay-debug-watch")]
#[command(about = "Tail a transcript and print parsed events as JSON")]
#[command(version)]
struct Args {
    /// Path to the JSONL transcript
    file: PathBuf,

    /// Read the whole file once and exit
    #[arg(long)]
    once: bool,

    /// Start at the current end of file (ignored with --once)
    #[arg(long)]
    tail: bool,

    /// Pretty-print each event
    #[arg(long)]
    pretty: bool,

    /// Poll interval in milliseconds
    #[arg(long, default_value = "500")]
    poll: u64,
}

/// One event as printed
#[derive(Serialize)]
struct EventOutput<'a> {
    #[serde(flatten)]
    event: &'a ParsedEvent,
    #[serde(skip_serializing_if = "Option::is_none")]
    rendered: Option<String>,
}

fn print_events(events: &[ParsedEvent], pretty: bool) -> Result<()> {
    for event in events {
        let output = EventOutput {
            event,
            rendered: render_event(event),
        };
        if pretty {
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            println!("{}", serde_json::to_string(&output)?);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.once && !args.file.exists() {
        bail!("file not found: {}", args.file.display());
    }

    let mut transcript = MonitoredTranscript::new(&args.file);

    if args.once {
        let events = transcript.poll();
        print_events(&events, args.pretty)?;
        eprintln!(
            "{} event(s), {} bytes read",
            events.len(),
            transcript.byte_offset()
        );
        return Ok(());
    }

    if args.tail {
        transcript.skip_to_end();
    }

    eprintln!("Watching {} (Ctrl+C to stop)", args.file.display());
    let mut ticker = tokio::time::interval(Duration::from_millis(args.poll.max(1)));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                let events = transcript.poll();
                print_events(&events, args.pretty)?;
            }
        }
    }
    eprintln!("Stopped at byte {}", transcript.byte_offset());
    Ok(())
}
