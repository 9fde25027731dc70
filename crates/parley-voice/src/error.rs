//! Error types for the Parley conversation core

use thiserror::Error;

/// Result type alias for conversation operations
pub type ConversationResult<T> = Result<T, ConversationError>;

/// Errors that can occur while driving a conversation turn
#[derive(Error, Debug)]
pub enum ConversationError {
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("TTS error: {0}")]
    Tts(String),

    #[error("Audio playback error: {0}")]
    Playback(String),

    #[error("Silent authentication error: {0}")]
    Auth(String),

    #[error("STT error: {0}")]
    Stt(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No sign-in card is pending")]
    NoPendingSigninCard,

    #[error("Pending sign-in card is missing {0}")]
    SigninCardIncomplete(&'static str),

    #[error("A turn is already in progress")]
    TurnInProgress,
}

impl ConversationError {
    /// True for caller mistakes (wrong call for the current state), as opposed to
    /// runtime or network failures.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            ConversationError::NoPendingSigninCard
                | ConversationError::SigninCardIncomplete(_)
                | ConversationError::TurnInProgress
        )
    }
}

impl From<reqwest::Error> for ConversationError {
    fn from(err: reqwest::Error) -> Self {
        ConversationError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for ConversationError {
    fn from(err: serde_json::Error) -> Self {
        ConversationError::Decode(err.to_string())
    }
}

impl From<hound::Error> for ConversationError {
    fn from(err: hound::Error) -> Self {
        ConversationError::Stt(err.to_string())
    }
}
