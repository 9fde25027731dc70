//! Turn Orchestrator - the conversation turn state machine
//!
//! One user utterance flows through: filler speech racing the backend query,
//! interruption of the filler once the reply lands, optional silent consent
//! resolution, then reply synthesis and playback. Status, history and the
//! pending sign-in card are the only observable outputs.

use crate::auth::SilentAuthenticator;
use crate::backend::ConversationBackend;
use crate::config::ConversationConfig;
use crate::error::{ConversationError, ConversationResult};
use crate::filler::filler_phrase;
use crate::message::{BackendReply, ConversationMessage, SigninCard, TurnStatus};
use crate::playback::AgentPlayback;
use crate::tts::SpeechSynthesizer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// The collaborators a session talks to.
#[derive(Clone)]
pub struct ConversationAdapters {
    pub backend: Arc<dyn ConversationBackend>,
    pub tts: Arc<dyn SpeechSynthesizer>,
    pub playback: Arc<dyn AgentPlayback>,
    pub auth: Arc<dyn SilentAuthenticator>,
}

/// Events emitted by the orchestrator
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationEvent {
    StatusChanged(TurnStatus),
    MessageAppended(ConversationMessage),
    /// `None` when the pending card was cleared.
    SigninCardChanged(Option<SigninCard>),
    HistoryCleared,
    /// A turn or consent step failed; the session stays usable.
    Error(String),
}

/// How a turn (or consent step) ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Another turn was in flight, or the input was blank. Nothing changed.
    Ignored,
    /// A bot reply was appended and spoken.
    Replied,
    /// A sign-in card is pending; nothing was spoken.
    SigninRequired,
    /// The turn ended in `listening` without speech.
    Completed,
}

#[derive(Debug, Default)]
struct SessionState {
    status: TurnStatus,
    history: Vec<ConversationMessage>,
    pending_card: Option<SigninCard>,
    last_error: Option<String>,
}

/// Clears the re-entrancy flag when the turn ends, however it ends.
struct ProcessingGuard<'a>(&'a AtomicBool);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Per-session turn state machine. Share it behind an `Arc`; every method takes `&self`.
pub struct TurnOrchestrator {
    adapters: ConversationAdapters,
    filler_template: Option<String>,
    state: Mutex<SessionState>,
    processing: AtomicBool,
    event_tx: mpsc::UnboundedSender<ConversationEvent>,
}

impl TurnOrchestrator {
    /// Create an orchestrator in `idle` and the receiver for its events.
    pub fn new(
        adapters: ConversationAdapters,
        config: &ConversationConfig,
    ) -> (Self, mpsc::UnboundedReceiver<ConversationEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let orchestrator = Self {
            adapters,
            filler_template: config.filler().map(str::to_string),
            state: Mutex::new(SessionState::default()),
            processing: AtomicBool::new(false),
            event_tx,
        };
        info!(
            "🎭 Turn orchestrator ready (filler {})",
            if orchestrator.filler_template.is_some() { "on" } else { "off" }
        );
        (orchestrator, event_rx)
    }

    pub fn status(&self) -> TurnStatus {
        self.state().status
    }

    pub fn history(&self) -> Vec<ConversationMessage> {
        self.state().history.clone()
    }

    pub fn pending_signin_card(&self) -> Option<SigninCard> {
        self.state().pending_card.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.state().last_error.clone()
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    /// Drive one user utterance to completion or to a consent pause.
    ///
    /// A call made while another turn is in flight, or with blank text, returns
    /// `Ignored` without touching any state.
    pub async fn run_turn(&self, user_text: &str) -> ConversationResult<TurnOutcome> {
        let text = user_text.trim();
        if text.is_empty() {
            debug!("Blank utterance ignored");
            return Ok(TurnOutcome::Ignored);
        }
        let Some(_guard) = self.try_begin() else {
            debug!("Turn already in progress; utterance ignored");
            return Ok(TurnOutcome::Ignored);
        };

        info!("🎤 Turn started ({} chars)", text.chars().count());
        self.clear_error();
        self.set_pending_card(None);
        self.set_status(TurnStatus::Speaking);
        self.append(ConversationMessage::user(text));

        match self.drive_turn(text).await {
            Ok(outcome) => {
                info!("✅ Turn finished: {:?}", outcome);
                Ok(outcome)
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    async fn drive_turn(&self, text: &str) -> ConversationResult<TurnOutcome> {
        let filler_cancelled = AtomicBool::new(false);
        let filler = self.play_filler(text, &filler_cancelled);
        let backend = self.adapters.backend.send_message(text);
        tokio::pin!(filler);
        tokio::pin!(backend);

        let mut filler_settled = false;
        let reply = loop {
            tokio::select! {
                biased;
                reply = &mut backend => break reply,
                _ = &mut filler, if !filler_settled => filler_settled = true,
            }
        };

        // Cut the filler off and let it settle before anything else touches playback.
        filler_cancelled.store(true, Ordering::SeqCst);
        self.interrupt_playback().await;
        if !filler_settled && filler.await {
            // The filler clip was accepted after the interrupt went out.
            self.interrupt_playback().await;
        }

        let reply = reply?;
        self.set_status(TurnStatus::Thinking);

        if let Some(card) = reply.signin_card.as_ref() {
            if let Some(uri) = card.exchange_uri() {
                if let Some(replacement) = self.resolve_silently(card, uri).await? {
                    if replacement.has_text() {
                        self.process_bot_reply(
                            &replacement.bot_reply,
                            replacement.speech_text.as_deref(),
                        )
                        .await?;
                        return Ok(TurnOutcome::Replied);
                    }
                    self.set_status(TurnStatus::Listening);
                    return Ok(TurnOutcome::Completed);
                }
            }
            info!("🔐 Sign-in required: {}", card.title);
            self.set_pending_card(Some(card.clone()));
        }

        if reply.has_text() {
            self.process_bot_reply(&reply.bot_reply, reply.speech_text.as_deref())
                .await?;
            return Ok(TurnOutcome::Replied);
        }

        let pending_message = reply
            .signin_card
            .as_ref()
            .map(|c| c.message.trim())
            .filter(|m| !m.is_empty());
        if let Some(message) = pending_message {
            self.append(ConversationMessage::assistant(message));
        }
        self.set_status(TurnStatus::Listening);
        if reply.signin_card.is_some() {
            Ok(TurnOutcome::SigninRequired)
        } else {
            Ok(TurnOutcome::Completed)
        }
    }

    /// Speak the filler phrase. Never fails; returns true when a clip was handed
    /// to playback.
    async fn play_filler(&self, user_text: &str, cancelled: &AtomicBool) -> bool {
        let Some(template) = self.filler_template.as_deref() else {
            return false;
        };
        if cancelled.load(Ordering::SeqCst) {
            return false;
        }
        let phrase = filler_phrase(template, user_text);
        let result: ConversationResult<bool> = async {
            let clip = self.adapters.tts.synthesize(&phrase).await?;
            if cancelled.load(Ordering::SeqCst) {
                debug!("Filler synthesized after the reply arrived; dropped");
                return Ok(false);
            }
            self.adapters.playback.play(clip).await?;
            Ok(true)
        }
        .await;
        match result {
            Ok(played) => played,
            Err(e) => {
                warn!("Filler speech failed (ignored): {}", e);
                false
            }
        }
    }

    async fn interrupt_playback(&self) {
        if let Err(e) = self.adapters.playback.interrupt().await {
            warn!("Playback interrupt failed: {}", e);
        }
    }

    /// Try to satisfy a consent card without the user. `Ok(None)` means the card
    /// must be shown.
    async fn resolve_silently(
        &self,
        card: &SigninCard,
        resource_uri: &str,
    ) -> ConversationResult<Option<BackendReply>> {
        let Some(credential) = self
            .adapters
            .auth
            .acquire_silent_credential(resource_uri)
            .await?
        else {
            info!("Silent sign-in declined; interactive consent required");
            return Ok(None);
        };
        let exchange = match card.token_exchange(credential.token) {
            Ok(exchange) => exchange,
            Err(missing) => {
                warn!("Silent credential obtained but card lacks {}; showing card", missing);
                return Ok(None);
            }
        };
        debug!("Exchanging silent credential for connection {}", exchange.connection_name);
        let replacement = self
            .adapters
            .backend
            .exchange_connection_token(&exchange)
            .await?;
        Ok(Some(replacement))
    }

    /// Append the assistant reply, then synthesize and hand it to playback.
    async fn process_bot_reply(
        &self,
        display_text: &str,
        speech_text: Option<&str>,
    ) -> ConversationResult<()> {
        self.append(ConversationMessage::assistant(display_text));
        self.set_status(TurnStatus::Speaking);
        let speakable = speech_text
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(display_text);
        let clip = self.adapters.tts.synthesize(speakable).await?;
        self.adapters.playback.play(clip).await?;
        self.set_status(TurnStatus::Listening);
        Ok(())
    }

    /// Finish a pending OAuth card with a token the user obtained interactively.
    pub async fn complete_token_exchange(
        &self,
        connection_token: &str,
    ) -> ConversationResult<TurnOutcome> {
        let card = self
            .pending_signin_card()
            .ok_or(ConversationError::NoPendingSigninCard)?;
        let exchange = card
            .token_exchange(connection_token)
            .map_err(ConversationError::SigninCardIncomplete)?;
        let _guard = self.try_begin().ok_or(ConversationError::TurnInProgress)?;

        info!("🔑 Completing token exchange for {}", exchange.connection_name);
        self.clear_error();
        self.set_status(TurnStatus::Thinking);
        let result = async {
            let reply = self
                .adapters
                .backend
                .exchange_connection_token(&exchange)
                .await?;
            self.finish_consent(reply).await
        }
        .await;
        result.map_err(|e| {
            self.fail(&e);
            e
        })
    }

    /// Send the pending card's "Allow" payload to the backend.
    pub async fn submit_allow_action(&self) -> ConversationResult<TurnOutcome> {
        let card = self
            .pending_signin_card()
            .ok_or(ConversationError::NoPendingSigninCard)?;
        let payload = card
            .submit_action
            .ok_or(ConversationError::SigninCardIncomplete("submitAction"))?;
        let _guard = self.try_begin().ok_or(ConversationError::TurnInProgress)?;

        info!("🔑 Submitting consent card action");
        self.clear_error();
        self.set_status(TurnStatus::Thinking);
        let result = async {
            let reply = self.adapters.backend.submit_card_action(&payload).await?;
            self.finish_consent(reply).await
        }
        .await;
        result.map_err(|e| {
            self.fail(&e);
            e
        })
    }

    async fn finish_consent(&self, reply: BackendReply) -> ConversationResult<TurnOutcome> {
        let next_card = reply.signin_card.clone();
        let has_next_card = next_card.is_some();
        self.set_pending_card(next_card);
        if reply.has_text() {
            self.process_bot_reply(&reply.bot_reply, reply.speech_text.as_deref())
                .await?;
            return Ok(TurnOutcome::Replied);
        }
        self.set_status(TurnStatus::Listening);
        if has_next_card {
            Ok(TurnOutcome::SigninRequired)
        } else {
            Ok(TurnOutcome::Completed)
        }
    }

    /// Barge-in: stop whatever the avatar is saying. Status and history are untouched.
    pub async fn interrupt_speech(&self) {
        info!("⚡ Barge-in: interrupting avatar playback");
        self.interrupt_playback().await;
    }

    /// Abandon the pending consent flow.
    pub fn dismiss_signin_card(&self) {
        self.set_pending_card(None);
        self.set_status(TurnStatus::Listening);
    }

    /// Empty the history and drop any pending card. Status is left alone.
    pub fn clear_history(&self) {
        self.state().history.clear();
        self.emit(ConversationEvent::HistoryCleared);
        self.set_pending_card(None);
    }

    fn try_begin(&self) -> Option<ProcessingGuard<'_>> {
        self.processing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ProcessingGuard(&self.processing))
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: ConversationEvent) {
        // Observers are optional; a dropped receiver is not an error.
        let _ = self.event_tx.send(event);
    }

    fn set_status(&self, status: TurnStatus) {
        let previous = std::mem::replace(&mut self.state().status, status);
        if previous != status {
            debug!("Status: {} -> {}", previous.as_str(), status.as_str());
            self.emit(ConversationEvent::StatusChanged(status));
        }
    }

    fn append(&self, message: ConversationMessage) {
        self.state().history.push(message.clone());
        self.emit(ConversationEvent::MessageAppended(message));
    }

    fn set_pending_card(&self, card: Option<SigninCard>) {
        let changed = {
            let mut state = self.state();
            let changed = state.pending_card != card;
            state.pending_card = card.clone();
            changed
        };
        if changed {
            self.emit(ConversationEvent::SigninCardChanged(card));
        }
    }

    fn clear_error(&self) {
        self.state().last_error = None;
    }

    fn fail(&self, err: &ConversationError) {
        error!("Turn failed: {}", err);
        let message = err.to_string();
        self.state().last_error = Some(message.clone());
        self.set_status(TurnStatus::Error);
        self.emit(ConversationEvent::Error(message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::NoSilentAuth;
    use crate::playback::NullPlayback;
    use crate::tts::PlaceholderTts;
    use async_trait::async_trait;

    struct EchoBackend;

    #[async_trait]
    impl ConversationBackend for EchoBackend {
        async fn send_message(&self, text: &str) -> ConversationResult<BackendReply> {
            Ok(BackendReply::text(format!("echo: {}", text)))
        }

        async fn exchange_connection_token(
            &self,
            _exchange: &crate::message::TokenExchange,
        ) -> ConversationResult<BackendReply> {
            Ok(BackendReply::default())
        }

        async fn submit_card_action(
            &self,
            _payload: &serde_json::Value,
        ) -> ConversationResult<BackendReply> {
            Ok(BackendReply::default())
        }
    }

    fn orchestrator() -> (TurnOrchestrator, mpsc::UnboundedReceiver<ConversationEvent>) {
        let adapters = ConversationAdapters {
            backend: Arc::new(EchoBackend),
            tts: Arc::new(PlaceholderTts),
            playback: Arc::new(NullPlayback::new()),
            auth: Arc::new(NoSilentAuth),
        };
        TurnOrchestrator::new(adapters, &ConversationConfig::default())
    }

    #[tokio::test]
    async fn starts_idle_and_ends_listening() {
        let (orch, _rx) = orchestrator();
        assert_eq!(orch.status(), TurnStatus::Idle);
        let outcome = orch.run_turn("  hello ").await.unwrap();
        assert_eq!(outcome, TurnOutcome::Replied);
        assert_eq!(orch.status(), TurnStatus::Listening);
        let history = orch.history();
        assert_eq!(history[0].text, "hello");
        assert_eq!(history[1].text, "echo: hello");
        assert!(!orch.is_processing());
    }

    #[tokio::test]
    async fn blank_input_is_ignored() {
        let (orch, _rx) = orchestrator();
        assert_eq!(orch.run_turn("   ").await.unwrap(), TurnOutcome::Ignored);
        assert!(orch.history().is_empty());
        assert_eq!(orch.status(), TurnStatus::Idle);
    }

    #[tokio::test]
    async fn events_follow_the_turn() {
        let (orch, mut rx) = orchestrator();
        orch.run_turn("hi").await.unwrap();
        let mut statuses = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            if let ConversationEvent::StatusChanged(s) = ev {
                statuses.push(s);
            }
        }
        assert_eq!(
            statuses,
            vec![
                TurnStatus::Speaking,
                TurnStatus::Thinking,
                TurnStatus::Speaking,
                TurnStatus::Listening
            ]
        );
    }

    #[tokio::test]
    async fn dropped_receiver_does_not_fail_turns() {
        let (orch, rx) = orchestrator();
        drop(rx);
        assert_eq!(orch.run_turn("hi").await.unwrap(), TurnOutcome::Replied);
    }
}
