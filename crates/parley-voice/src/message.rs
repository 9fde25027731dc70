//! Conversation data model: history messages, turn status, and consent cards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who authored a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One immutable entry in the conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMessage {
    pub id: String,
    pub role: Role,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl ConversationMessage {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            text: text.into(),
            created_at: Utc::now(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }
}

/// Externally visible state of the turn orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnStatus {
    /// Resting: no audio playing, not awaiting input.
    #[default]
    Idle,
    /// Ready for the next utterance.
    Listening,
    /// Backend query in flight, nothing speakable yet.
    Thinking,
    /// Filler or reply audio is being synthesized or played.
    Speaking,
    /// Last turn failed; the session still accepts turns.
    Error,
}

impl TurnStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnStatus::Idle => "idle",
            TurnStatus::Listening => "listening",
            TurnStatus::Thinking => "thinking",
            TurnStatus::Speaking => "speaking",
            TurnStatus::Error => "error",
        }
    }
}

/// A consent prompt surfaced by the backend before it can run a data-connected query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigninCard {
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_exchange_resource_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_exchange_resource_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_name: Option<String>,
    /// Data of the card's "Allow" submit button, sent back verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submit_action: Option<serde_json::Value>,
}

impl SigninCard {
    /// Resource URI usable for silent token acquisition, if non-blank.
    pub fn exchange_uri(&self) -> Option<&str> {
        non_blank(self.token_exchange_resource_uri.as_deref())
    }

    /// Builds the exchange request for `token`, or names the missing field.
    pub fn token_exchange(&self, token: impl Into<String>) -> Result<TokenExchange, &'static str> {
        let resource_id = non_blank(self.token_exchange_resource_id.as_deref())
            .ok_or("tokenExchangeResourceId")?;
        let connection_name =
            non_blank(self.connection_name.as_deref()).ok_or("connectionName")?;
        Ok(TokenExchange {
            token: token.into(),
            connection_name: connection_name.to_string(),
            resource_id: resource_id.to_string(),
        })
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.filter(|v| !v.trim().is_empty())
}

/// Classified result of one backend exchange.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendReply {
    /// Display text; may contain markdown and citation markup.
    pub bot_reply: String,
    /// Pre-cleaned text for synthesis, when the backend provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speech_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signin_card: Option<SigninCard>,
}

impl BackendReply {
    pub fn text(reply: impl Into<String>) -> Self {
        Self {
            bot_reply: reply.into(),
            ..Default::default()
        }
    }

    pub fn has_text(&self) -> bool {
        !self.bot_reply.trim().is_empty()
    }
}

/// Payload for exchanging a connection token with the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenExchange {
    pub token: String,
    pub connection_name: String,
    pub resource_id: String,
}
