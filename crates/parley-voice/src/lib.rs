//! # Parley Voice - Turn Orchestration for a Spoken Avatar
//!
//! Drives one spoken conversation with a remote conversational backend: the
//! user's utterance goes to the backend while a filler phrase plays, the filler
//! is cut off when the reply lands, consent cards are resolved silently where
//! possible, and the reply is synthesized and handed to the avatar.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Turn Orchestrator                        │
//! │  utterance ──┬─→ Filler (TTS → Playback) ──┐                 │
//! │              └─→ Backend query ────────────┴→ interrupt      │
//! │                                               ↓              │
//! │                        SigninCard? → Silent auth → exchange  │
//! │                                               ↓              │
//! │                          Reply → TTS → Avatar playback       │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod backend;
pub mod config;
pub mod error;
pub mod filler;
pub mod message;
pub mod orchestrator;
pub mod playback;
pub mod session;
pub mod speech;
mod speech_api;
pub mod stt;
pub mod tts;
pub mod voice_loop;

pub use auth::{Credential, NoSilentAuth, SilentAuthenticator, StaticCredentials};
pub use backend::{ConversationBackend, DirectLineBackend};
pub use config::ConversationConfig;
pub use error::{ConversationError, ConversationResult};
pub use filler::filler_phrase;
pub use message::{
    BackendReply, ConversationMessage, Role, SigninCard, TokenExchange, TurnStatus,
};
pub use orchestrator::{ConversationAdapters, ConversationEvent, TurnOrchestrator, TurnOutcome};
pub use playback::{AgentPlayback, NullPlayback};
pub use session::SessionRegistry;
pub use speech::clean_for_speech;
pub use stt::{OpenAiStt, PcmUtterance, PlaceholderStt, SttBackend};
pub use tts::{AudioClip, OpenAiTts, PlaceholderTts, SpeechSynthesizer};
pub use voice_loop::{run_utterance_loop, OnInterruption, Utterance};
