//! Scripted adapters shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parley_voice::{
    AgentPlayback, AudioClip, BackendReply, ConversationAdapters, ConversationBackend,
    ConversationConfig, ConversationError, ConversationEvent, ConversationResult, Credential,
    SigninCard, SilentAuthenticator, SpeechSynthesizer, TokenExchange, TurnOrchestrator,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

/// Ordered record of every TTS and playback call.
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn entries(log: &CallLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

pub fn position(log: &CallLog, entry: &str) -> usize {
    entries(log)
        .iter()
        .position(|e| e == entry)
        .unwrap_or_else(|| panic!("{entry:?} not in {:?}", entries(log)))
}

#[derive(Default)]
pub struct ScriptedBackend {
    pub replies: Mutex<VecDeque<Result<BackendReply, String>>>,
    pub exchange_replies: Mutex<VecDeque<Result<BackendReply, String>>>,
    pub submit_replies: Mutex<VecDeque<Result<BackendReply, String>>>,
    pub exchanges: Mutex<Vec<TokenExchange>>,
    pub submits: Mutex<Vec<serde_json::Value>>,
    pub sent: Mutex<Vec<String>>,
    pub delay: Option<Duration>,
    pub gate: Option<Arc<Notify>>,
}

impl ScriptedBackend {
    pub fn replying(replies: Vec<BackendReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(Ok).collect()),
            ..Default::default()
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            replies: Mutex::new(VecDeque::from([Err(message.to_string())])),
            ..Default::default()
        }
    }

    pub fn then_reply(self, reply: BackendReply) -> Self {
        self.replies.lock().unwrap().push_back(Ok(reply));
        self
    }

    pub fn with_exchange_reply(self, reply: Result<BackendReply, String>) -> Self {
        self.exchange_replies.lock().unwrap().push_back(reply);
        self
    }

    pub fn with_submit_reply(self, reply: Result<BackendReply, String>) -> Self {
        self.submit_replies.lock().unwrap().push_back(reply);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }
}

fn next(queue: &Mutex<VecDeque<Result<BackendReply, String>>>) -> ConversationResult<BackendReply> {
    match queue.lock().unwrap().pop_front() {
        Some(Ok(reply)) => Ok(reply),
        Some(Err(message)) => Err(ConversationError::Backend(message)),
        None => Err(ConversationError::Backend("script exhausted".to_string())),
    }
}

#[async_trait]
impl ConversationBackend for ScriptedBackend {
    async fn send_message(&self, text: &str) -> ConversationResult<BackendReply> {
        self.sent.lock().unwrap().push(text.to_string());
        if let Some(ref gate) = self.gate {
            gate.notified().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        next(&self.replies)
    }

    async fn exchange_connection_token(
        &self,
        exchange: &TokenExchange,
    ) -> ConversationResult<BackendReply> {
        self.exchanges.lock().unwrap().push(exchange.clone());
        next(&self.exchange_replies)
    }

    async fn submit_card_action(
        &self,
        payload: &serde_json::Value,
    ) -> ConversationResult<BackendReply> {
        self.submits.lock().unwrap().push(payload.clone());
        next(&self.submit_replies)
    }
}

/// TTS whose clip bytes are the text itself; fails for listed phrases.
pub struct RecordingTts {
    pub log: CallLog,
    pub fail_on: HashSet<String>,
    /// Phrases that take this long to synthesize.
    pub slow: HashMap<String, Duration>,
}

#[async_trait]
impl SpeechSynthesizer for RecordingTts {
    async fn synthesize(&self, text: &str) -> ConversationResult<AudioClip> {
        if let Some(delay) = self.slow.get(text) {
            tokio::time::sleep(*delay).await;
        }
        if self.fail_on.contains(text) {
            self.log.lock().unwrap().push(format!("tts-failed:{text}"));
            return Err(ConversationError::Tts(format!("cannot speak {text:?}")));
        }
        self.log.lock().unwrap().push(format!("tts:{text}"));
        Ok(AudioClip::new(text.as_bytes().to_vec(), "text/plain"))
    }
}

/// Logs `play:<text>` once a clip is accepted. Slow clips also log
/// `play-start:<text>` when handed over.
pub struct RecordingPlayback {
    pub log: CallLog,
    pub fail_on: HashSet<String>,
    pub slow: HashMap<String, Duration>,
}

#[async_trait]
impl AgentPlayback for RecordingPlayback {
    async fn play(&self, clip: AudioClip) -> ConversationResult<()> {
        let text = String::from_utf8_lossy(&clip.bytes).to_string();
        if self.fail_on.contains(&text) {
            return Err(ConversationError::Playback("avatar disconnected".to_string()));
        }
        if let Some(delay) = self.slow.get(&text) {
            self.log.lock().unwrap().push(format!("play-start:{text}"));
            tokio::time::sleep(*delay).await;
        }
        self.log.lock().unwrap().push(format!("play:{text}"));
        Ok(())
    }

    async fn interrupt(&self) -> ConversationResult<()> {
        self.log.lock().unwrap().push("interrupt".to_string());
        Ok(())
    }
}

pub enum SilentAnswer {
    Token(&'static str),
    ConsentRequired,
    Fail,
}

pub struct ScriptedAuth {
    pub answer: SilentAnswer,
    pub asked: Mutex<Vec<String>>,
}

impl ScriptedAuth {
    pub fn new(answer: SilentAnswer) -> Self {
        Self {
            answer,
            asked: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SilentAuthenticator for ScriptedAuth {
    async fn acquire_silent_credential(
        &self,
        resource_uri: &str,
    ) -> ConversationResult<Option<Credential>> {
        self.asked.lock().unwrap().push(resource_uri.to_string());
        match self.answer {
            SilentAnswer::Token(token) => Ok(Some(Credential::new(token))),
            SilentAnswer::ConsentRequired => Ok(None),
            SilentAnswer::Fail => Err(ConversationError::Auth("token cache unavailable".to_string())),
        }
    }
}

pub struct Harness {
    pub orchestrator: Arc<TurnOrchestrator>,
    pub events: mpsc::UnboundedReceiver<ConversationEvent>,
    pub backend: Arc<ScriptedBackend>,
    pub auth: Arc<ScriptedAuth>,
    pub log: CallLog,
}

impl Harness {
    pub fn drain_events(&mut self) -> Vec<ConversationEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = self.events.try_recv() {
            out.push(ev);
        }
        out
    }
}

pub struct HarnessBuilder {
    backend: ScriptedBackend,
    auth: SilentAnswer,
    config: ConversationConfig,
    tts_fail_on: HashSet<String>,
    playback_fail_on: HashSet<String>,
    slow_tts: HashMap<String, Duration>,
    slow_play: HashMap<String, Duration>,
}

impl HarnessBuilder {
    pub fn new(backend: ScriptedBackend) -> Self {
        Self {
            backend,
            auth: SilentAnswer::ConsentRequired,
            config: ConversationConfig::default(),
            tts_fail_on: HashSet::new(),
            playback_fail_on: HashSet::new(),
            slow_tts: HashMap::new(),
            slow_play: HashMap::new(),
        }
    }

    pub fn auth(mut self, answer: SilentAnswer) -> Self {
        self.auth = answer;
        self
    }

    pub fn filler(mut self, template: &str) -> Self {
        self.config = self.config.with_filler(template);
        self
    }

    pub fn tts_fails_on(mut self, text: &str) -> Self {
        self.tts_fail_on.insert(text.to_string());
        self
    }

    pub fn playback_fails_on(mut self, text: &str) -> Self {
        self.playback_fail_on.insert(text.to_string());
        self
    }

    pub fn slow_tts(mut self, text: &str, delay: Duration) -> Self {
        self.slow_tts.insert(text.to_string(), delay);
        self
    }

    pub fn slow_play(mut self, text: &str, delay: Duration) -> Self {
        self.slow_play.insert(text.to_string(), delay);
        self
    }

    pub fn build(self) -> Harness {
        let log: CallLog = Arc::new(Mutex::new(Vec::new()));
        let backend = Arc::new(self.backend);
        let auth = Arc::new(ScriptedAuth::new(self.auth));
        let adapters = ConversationAdapters {
            backend: backend.clone(),
            tts: Arc::new(RecordingTts {
                log: log.clone(),
                fail_on: self.tts_fail_on,
                slow: self.slow_tts,
            }),
            playback: Arc::new(RecordingPlayback {
                log: log.clone(),
                fail_on: self.playback_fail_on,
                slow: self.slow_play,
            }),
            auth: auth.clone(),
        };
        let (orchestrator, events) = TurnOrchestrator::new(adapters, &self.config);
        Harness {
            orchestrator: Arc::new(orchestrator),
            events,
            backend,
            auth,
            log,
        }
    }
}

pub fn oauth_card(uri: Option<&str>) -> SigninCard {
    SigninCard {
        title: "Sign in".to_string(),
        message: "Sign in to let me read your calendar.".to_string(),
        token_exchange_resource_uri: uri.map(str::to_string),
        token_exchange_resource_id: Some("res-42".to_string()),
        connection_name: Some("outlook".to_string()),
        submit_action: None,
    }
}

pub fn card_reply(text: &str, card: SigninCard) -> BackendReply {
    BackendReply {
        bot_reply: text.to_string(),
        speech_text: None,
        signin_card: Some(card),
    }
}
