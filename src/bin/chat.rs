//! Interactive command-line client for a Turnstile server
//!
//! Usage: `turnstile-chat [thread-id]`. Each stdin line is sent as one turn
//! and the reply is printed as it streams. `/model <name>` sets the thread's
//! model override, `/model` clears it, `/quit` exits.

use futures::StreamExt;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use turnstile::codec::{NdjsonDecoder, StreamEvent, TurnView};

const DEFAULT_URL: &str = "http://127.0.0.1:8000";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "turnstile=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let base_url = std::env::var("TURNSTILE_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
    let base_url = base_url.trim_end_matches('/').to_string();
    let thread_id = std::env::args()
        .nth(1)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let client = reqwest::Client::new();

    eprintln!("thread {thread_id} on {base_url}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt()?;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => {}
            "/quit" => break,
            _ if line.starts_with("/model") => {
                let model = line.trim_start_matches("/model").trim();
                set_model(&client, &base_url, &thread_id, model).await?;
            }
            _ => send_turn(&client, &base_url, &thread_id, line).await?,
        }
        prompt()?;
    }
    Ok(())
}

fn prompt() -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    write!(stdout, "> ")?;
    stdout.flush()
}

async fn set_model(
    client: &reqwest::Client,
    base_url: &str,
    thread_id: &str,
    model: &str,
) -> Result<(), reqwest::Error> {
    let model_name = (!model.is_empty()).then_some(model);
    let response = client
        .put(format!("{base_url}/api/threads/{thread_id}/model"))
        .json(&serde_json::json!({ "model_name": model_name }))
        .send()
        .await?;
    if response.status().is_success() {
        eprintln!("model override: {}", model_name.unwrap_or("<default>"));
    } else {
        eprintln!("failed to set model: {}", response.text().await?);
    }
    Ok(())
}

async fn send_turn(
    client: &reqwest::Client,
    base_url: &str,
    thread_id: &str,
    message: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let response = client
        .post(format!("{base_url}/api/chat"))
        .json(&serde_json::json!({ "message": message, "thread_id": thread_id }))
        .send()
        .await?;

    let status = response.status();
    if status.is_client_error() && status != reqwest::StatusCode::CONFLICT {
        eprintln!("request rejected ({status}): {}", response.text().await?);
        return Ok(());
    }

    let mut view = TurnView::new();
    let mut decoder = NdjsonDecoder::new();
    let mut body = response.bytes_stream();
    let mut stdout = std::io::stdout();

    'read: while let Some(bytes) = body.next().await {
        for event in decoder.feed(&bytes?) {
            if let StreamEvent::Chunk { content } = &event {
                write!(stdout, "{content}")?;
                stdout.flush()?;
            }
            if view.apply(&event) {
                break 'read;
            }
        }
    }
    if view.is_streaming() {
        for event in std::mem::take(&mut decoder).finish() {
            view.apply(&event);
        }
    }
    writeln!(stdout)?;

    if let Some(error) = view.error() {
        eprintln!("error: {error}");
    } else if view.is_streaming() {
        eprintln!("error: connection closed before the reply finished");
    }
    Ok(())
}
