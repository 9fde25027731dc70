//! **Utterance loop**: feeds finished utterances (typed or spoken) into the orchestrator.
//!
//! Turns run as their own tasks so barge-in signals keep flowing while the
//! avatar speaks. An utterance that arrives mid-turn is dropped, matching the
//! orchestrator's re-entrancy rule.

use crate::error::ConversationResult;
use crate::orchestrator::TurnOrchestrator;
use crate::stt::{PcmUtterance, SttBackend};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Input to the loop.
#[derive(Debug, Clone)]
pub enum Utterance {
    /// Text typed by the user.
    Typed(String),
    /// Captured speech to transcribe first.
    Audio(PcmUtterance),
    /// The user started talking; silence the avatar.
    SpeechStarted,
}

/// Optional callback when user speech interrupts avatar playback.
pub type OnInterruption = Option<Arc<dyn Fn() + Send + Sync>>;

/// Runs until `rx` closes, then waits for the in-flight turn.
pub async fn run_utterance_loop(
    orchestrator: Arc<TurnOrchestrator>,
    stt: Arc<dyn SttBackend>,
    mut rx: mpsc::Receiver<Utterance>,
    on_interruption: OnInterruption,
) -> ConversationResult<()> {
    let mut turns: Vec<JoinHandle<()>> = Vec::new();

    while let Some(utterance) = rx.recv().await {
        let text = match utterance {
            Utterance::SpeechStarted => {
                orchestrator.interrupt_speech().await;
                if let Some(ref cb) = on_interruption {
                    cb();
                }
                continue;
            }
            Utterance::Typed(text) => text,
            Utterance::Audio(pcm) => match stt.transcribe(&pcm).await {
                Ok(text) => text,
                Err(e) => {
                    warn!("STT failed: {}", e);
                    continue;
                }
            },
        };
        if text.trim().is_empty() {
            debug!("Empty utterance skipped");
            continue;
        }
        if orchestrator.is_processing() {
            info!("Turn in progress; utterance dropped");
            continue;
        }

        turns.retain(|t| !t.is_finished());
        let orchestrator = Arc::clone(&orchestrator);
        turns.push(tokio::spawn(async move {
            if let Err(e) = orchestrator.run_turn(&text).await {
                warn!("Turn failed: {}", e);
            }
        }));
    }

    for turn in turns {
        if let Err(e) = turn.await {
            warn!("Turn task ended abnormally: {}", e);
        }
    }
    info!("🛑 Utterance loop closed");
    Ok(())
}
