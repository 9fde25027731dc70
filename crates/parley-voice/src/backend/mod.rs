//! **Conversational backend**: where user text goes and bot replies come from.
//!
//! Every call returns a classified `BackendReply`: display text, optional
//! speakable text, and an optional consent card. Implementations must never drop
//! a sign-in card that the backend sent.

pub mod activity;
pub mod directline;

use crate::error::ConversationResult;
use crate::message::{BackendReply, TokenExchange};
use async_trait::async_trait;

pub use activity::{is_bot_activity, reply_from_activities, signin_card_from_attachment, Activity};
pub use directline::DirectLineBackend;

#[async_trait]
pub trait ConversationBackend: Send + Sync {
    /// Send a user utterance and wait for the bot's reply.
    async fn send_message(&self, text: &str) -> ConversationResult<BackendReply>;

    /// Hand a connection token to the backend so it can finish a consent-gated query.
    async fn exchange_connection_token(
        &self,
        exchange: &TokenExchange,
    ) -> ConversationResult<BackendReply>;

    /// Submit a card action payload (e.g. the "Allow" button's data).
    async fn submit_card_action(
        &self,
        payload: &serde_json::Value,
    ) -> ConversationResult<BackendReply>;
}
