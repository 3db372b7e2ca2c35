use std::sync::Arc;

use anima::audio::SimBackend;
use anima::config::EngineConfig;
use anima::model::RecordingModel;
use anima::sequencer::{PlaybackSequencer, SessionContext};
use anima::services::{HttpSpeechSynthesizer, ReplyClient};
use anima::text::StdoutSink;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

// Shown in place of a reply when the backend is unreachable.
const FALLBACK_REPLY: &str = "出错了，请稍后再试。";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging/tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    tracing::info!("Anima Engine Booting...");

    let config = Arc::new(load_config());
    let reply_url = std::env::var("ANIMA_REPLY_URL")
        .unwrap_or_else(|_| "http://127.0.0.1:5000/api/ask".to_string());
    let tts_url = std::env::var("ANIMA_TTS_URL")
        .unwrap_or_else(|_| "http://127.0.0.1:5000/api/tts".to_string());

    // Headless model: parameters are recorded, not rendered.
    let model = Arc::new(RecordingModel::new());
    let sink = Arc::new(StdoutSink::new());
    let synth = Arc::new(HttpSpeechSynthesizer::new(tts_url));
    let backend = Box::new(SimBackend::with_fft_size(config.analyser_fft_size));

    let ctx = SessionContext::assemble(backend, model, sink, synth, Arc::clone(&config));
    let mut sequencer = PlaybackSequencer::new(ctx);
    let replies = ReplyClient::new(reply_url);

    tracing::info!("Anima Engine Active. Type a message, Ctrl+D to stop.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut queued: Option<String> = None;
    let mut eof = false;

    while !eof {
        let message = match queued.take() {
            Some(line) => line,
            None => match lines.next_line().await? {
                Some(line) => line,
                None => break,
            },
        };
        let message = message.trim().to_string();
        if message.is_empty() {
            continue;
        }

        let reply = match replies.ask(&message).await {
            Ok(reply) => reply,
            Err(err) => {
                tracing::warn!("reply fetch failed: {}", err);
                FALLBACK_REPLY.to_string()
            }
        };

        // New input supersedes the running sequence.
        let cancel = CancellationToken::new();
        let speak = sequencer.speak(&reply, &cancel);
        tokio::pin!(speak);
        loop {
            tokio::select! {
                outcome = &mut speak => {
                    if let Err(err) = outcome {
                        tracing::warn!("sequence aborted: {}", err);
                    }
                    break;
                }
                next = lines.next_line(), if queued.is_none() && !eof => {
                    cancel.cancel();
                    match next? {
                        Some(line) => queued = Some(line),
                        None => eof = true,
                    }
                }
            }
        }
        println!();
    }

    tracing::info!("Anima Engine Shutdown.");
    Ok(())
}

/// `ANIMA_CONFIG` points at a JSON file overriding `EngineConfig` fields;
/// anything unreadable falls back to defaults with a warning.
fn load_config() -> EngineConfig {
    let Ok(path) = std::env::var("ANIMA_CONFIG") else {
        return EngineConfig::default();
    };
    match std::fs::read_to_string(&path) {
        Ok(raw) => match serde_json::from_str(&raw) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!("config {} did not parse: {}", path, err);
                EngineConfig::default()
            }
        },
        Err(err) => {
            tracing::warn!("config {} unreadable: {}", path, err);
            EngineConfig::default()
        }
    }
}
