//! Headless chat REPL over the Gemini web transport.
//!
//! Reads prompts from stdin and streams responses to stdout. `/new`
//! starts a fresh conversation, `/quit` exits. `GEMINI_BRIDGE_CONFIG`
//! may point at a JSON file overriding the wire constants.

use std::io::Write as _;
use std::sync::Arc;

use anyhow::{Context, Result};
use host::{Coordinator, Relay};
use protocol::{GeminiTransport, GoogleUploader, PageTokenSource, SessionEngine, WireConfig};
use shared::relay::{Action, RelayEvent, Surface};
use tokio::io::{AsyncBufReadExt, BufReader};

const DEFAULT_MODEL: &str = "gemini-flash";

fn load_config() -> Result<WireConfig> {
    match std::env::var("GEMINI_BRIDGE_CONFIG") {
        Ok(path) => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading wire config {path}"))?;
            serde_json::from_str(&raw).with_context(|| format!("parsing wire config {path}"))
        }
        Err(_) => Ok(WireConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let config = Arc::new(load_config()?);
    let engine = Arc::new(SessionEngine::new(
        Arc::new(PageTokenSource::new(config.clone())?),
        Arc::new(GoogleUploader::new(config.clone())?),
        Arc::new(GeminiTransport::new(config)?),
    ));
    let coordinator = Arc::new(Coordinator::new(engine, history::HistoryStore::new())?);
    let relay = Relay::new(coordinator);
    let panel = relay.connect(Surface::Panel);

    let model = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_MODEL.to_string());
    println!("gemini-bridge (model {model}). /new starts over, /quit exits.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let prompt = line.trim();
        match prompt {
            "" => continue,
            "/quit" => break,
            "/new" => {
                match panel.request_terminal(Action::ResetContext).await {
                    Some(RelayEvent::Ack { .. }) => println!("(new conversation)"),
                    other => println!("reset failed: {other:?}"),
                }
                continue;
            }
            _ => {}
        }

        let mut rx = panel.request(Action::SendPrompt {
            text: prompt.to_string(),
            model: model.clone(),
            image: None,
        });
        let mut shown = String::new();
        while let Some(event) = rx.recv().await {
            match event {
                RelayEvent::StreamUpdate { text } => {
                    // Full-so-far snapshots: print only what is new, or
                    // restart the line if the snapshot was rewritten.
                    match text.strip_prefix(shown.as_str()) {
                        Some(suffix) => print!("{suffix}"),
                        None => print!("\n{text}"),
                    }
                    std::io::stdout().flush()?;
                    shown = text;
                }
                RelayEvent::StreamDone { result, .. } => {
                    if let Some(suffix) = result.text.strip_prefix(shown.as_str()) {
                        print!("{suffix}");
                    }
                    println!();
                    if !result.is_success() {
                        println!("[{:?}] {}", result.status, result.text);
                    }
                    break;
                }
                other => {
                    println!("unexpected relay event: {other:?}");
                    break;
                }
            }
        }
    }

    Ok(())
}
