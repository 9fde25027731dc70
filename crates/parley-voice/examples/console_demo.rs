//! Example: Console conversation
//!
//! Type a line to run a turn. Talks to Direct Line when `DIRECT_LINE_SECRET` is
//! set, otherwise to a local echo bot. Synthesis uses `TTS_API_KEY` if present.
//!
//! Commands: `/token <value>`, `/allow`, `/dismiss`, `/clear`, `/quit`.

use async_trait::async_trait;
use parley_voice::{
    run_utterance_loop, AgentPlayback, BackendReply, ConversationAdapters, ConversationBackend,
    ConversationConfig, ConversationEvent, ConversationResult, DirectLineBackend, NoSilentAuth,
    NullPlayback, OpenAiTts, PlaceholderStt, PlaceholderTts, SpeechSynthesizer, TokenExchange,
    TurnOrchestrator, Utterance,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Local stand-in for a real bot.
struct EchoBot;

#[async_trait]
impl ConversationBackend for EchoBot {
    async fn send_message(&self, text: &str) -> ConversationResult<BackendReply> {
        tokio::time::sleep(std::time::Duration::from_millis(400)).await;
        Ok(BackendReply::text(format!("You said: {}", text)))
    }

    async fn exchange_connection_token(
        &self,
        exchange: &TokenExchange,
    ) -> ConversationResult<BackendReply> {
        Ok(BackendReply::text(format!(
            "Connected to {}.",
            exchange.connection_name
        )))
    }

    async fn submit_card_action(
        &self,
        _payload: &serde_json::Value,
    ) -> ConversationResult<BackendReply> {
        Ok(BackendReply::text("Thanks for allowing access."))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ConversationConfig::from_env();
    let backend: Arc<dyn ConversationBackend> = if config.direct_line_secret.is_some() {
        info!("Using Direct Line at {}", config.direct_line_endpoint);
        Arc::new(DirectLineBackend::from_config(&config)?)
    } else {
        info!("DIRECT_LINE_SECRET not set; using local echo bot");
        Arc::new(EchoBot)
    };
    let tts: Arc<dyn SpeechSynthesizer> = match OpenAiTts::from_env() {
        Ok(tts) => Arc::new(tts),
        Err(e) => {
            info!("Remote TTS unavailable ({}); using placeholder", e);
            Arc::new(PlaceholderTts)
        }
    };
    let playback: Arc<dyn AgentPlayback> = Arc::new(NullPlayback::new());

    let adapters = ConversationAdapters {
        backend,
        tts,
        playback,
        auth: Arc::new(NoSilentAuth),
    };
    let (orchestrator, mut events) = TurnOrchestrator::new(adapters, &config);
    let orchestrator = Arc::new(orchestrator);

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ConversationEvent::StatusChanged(status) => println!("  [{}]", status.as_str()),
                ConversationEvent::MessageAppended(message) => {
                    println!("{:?}: {}", message.role, message.text)
                }
                ConversationEvent::SigninCardChanged(Some(card)) => {
                    println!("  ** {} ** {} (/token <value> or /allow)", card.title, card.message)
                }
                ConversationEvent::SigninCardChanged(None) => {}
                ConversationEvent::HistoryCleared => println!("  (history cleared)"),
                ConversationEvent::Error(message) => println!("  error: {}", message),
            }
        }
    });

    let (tx, rx) = mpsc::channel(16);
    let voice_loop = tokio::spawn(run_utterance_loop(
        orchestrator.clone(),
        Arc::new(PlaceholderStt::new()),
        rx,
        None,
    ));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line.split_once(' ').unwrap_or((line, "")) {
            ("/quit", _) => break,
            ("/clear", _) => orchestrator.clear_history(),
            ("/dismiss", _) => orchestrator.dismiss_signin_card(),
            ("/allow", _) => {
                if let Err(e) = orchestrator.submit_allow_action().await {
                    warn!("Allow failed: {}", e);
                }
            }
            ("/token", token) => {
                if let Err(e) = orchestrator.complete_token_exchange(token.trim()).await {
                    warn!("Token exchange failed: {}", e);
                }
            }
            _ => {
                tx.send(Utterance::Typed(line.to_string())).await?;
            }
        }
    }

    drop(tx);
    voice_loop.await??;
    info!("Goodbye");
    Ok(())
}
