//! Replay Demo
//!
//! Feeds recorded request bodies through a Pylon [`App`] and prints how each
//! one was acknowledged. Useful for trying out listeners without a transport.
//!
//! The input holds one JSON body per line; blank lines and lines starting
//! with `#` are skipped.
//!
//! # Usage
//!
//! ```bash
//! cargo run --package pylon-replay -- requests.jsonl
//! cargo run --package pylon-replay -- --process-before-response --config pylon.toml requests.jsonl
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use pylon::core::Responder;
use pylon::prelude::*;
use serde_json::{Value, json};
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "pylon-replay", about = "Replay recorded request bodies through a Pylon app")]
struct Args {
    /// File with one JSON request body per line.
    input: PathBuf,

    /// Configuration file to load instead of searching the current directory.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Hold acknowledgments until all listeners have finished.
    #[arg(long)]
    process_before_response: bool,

    /// Bot user id, so `ignore_self` and `direct_mention` can work.
    #[arg(long)]
    bot_user_id: Option<String>,
}

// ============================================================================
// Responder
// ============================================================================

/// Prints every acknowledgment instead of writing an HTTP response.
struct PrintResponder {
    line: usize,
}

#[async_trait]
impl Responder for PrintResponder {
    async fn respond(&self, response: AckResponse) -> Result<(), BoxError> {
        match response {
            AckResponse::Empty => println!("[{}] ack", self.line),
            other => println!("[{}] ack {}", self.line, other.to_body()),
        }
        Ok(())
    }
}

// ============================================================================
// Listeners
// ============================================================================

async fn log_mention(event: EventBody) {
    info!(
        user = event.user_id().unwrap_or("unknown"),
        text = event.text.as_deref().unwrap_or(""),
        "mentioned"
    );
}

async fn greet(text: MessageText) {
    info!(text = %text.0, "greeting received");
}

async fn echo(ack: Ack, command: SlashCommand) -> PylonResult<()> {
    ack.ack_with(format!("{} {}", command.command, command.text))
        .await
}

async fn ack_action(ack: Ack, action: ActionPayload) -> PylonResult<()> {
    info!(kind = ?action.kind, actions = action.actions.len(), "action received");
    ack.ack().await
}

async fn ack_submission(ack: Ack) -> PylonResult<()> {
    ack.ack_with(json!({ "response_action": "clear" })).await
}

fn register(app: &mut App) {
    app.event("app_mention", log_mention)
        .message("hello", greet)
        .command("/echo", echo)
        .action(ActionConstraint::default(), ack_action)
        .view(ViewConstraint::default(), ack_submission);
}

// ============================================================================
// Main
// ============================================================================

fn build_app(args: &Args) -> Result<App> {
    let mut builder = App::builder();
    if let Some(path) = &args.config {
        builder = builder.config_file(path);
    }

    let mut config = builder.load()?;
    config.app.process_before_response |= args.process_before_response;
    if args.bot_user_id.is_some() {
        config.app.bot_user_id.clone_from(&args.bot_user_id);
    }

    Ok(App::from_config(config)?)
}

fn parse_lines(contents: &str) -> impl Iterator<Item = (usize, Result<Value>)> + '_ {
    contents
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(n, line)| {
            let body = serde_json::from_str(line).with_context(|| format!("line {n}"));
            (n, body)
        })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut app = build_app(&args)?;
    register(&mut app);

    let contents = tokio::fs::read_to_string(&args.input)
        .await
        .with_context(|| format!("reading {}", args.input.display()))?;

    let mut failures = 0usize;
    for (line, body) in parse_lines(&contents) {
        let body = match body {
            Ok(body) => body,
            Err(e) => {
                warn!("skipping invalid JSON: {e:#}");
                failures += 1;
                continue;
            }
        };

        let outcome = match app.handle(body, Arc::new(PrintResponder { line })).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(line, "request rejected: {e}");
                failures += 1;
                continue;
            }
        };

        if let Some(error) = &outcome.error {
            println!("[{line}] error {} ({})", error.code(), error);
            failures += 1;
        }
        if !outcome.acknowledged {
            println!("[{line}] not acknowledged");
        }
    }

    info!(failures, "replay finished");
    Ok(())
}
