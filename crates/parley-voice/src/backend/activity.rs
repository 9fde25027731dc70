//! Bot Framework activity shapes and their classification into a `BackendReply`.

use crate::message::{BackendReply, SigninCard};
use crate::speech::clean_for_speech;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const OAUTH_CARD: &str = "application/vnd.microsoft.card.oauth";
pub const SIGNIN_CARD: &str = "application/vnd.microsoft.card.signin";
pub const ADAPTIVE_CARD: &str = "application/vnd.microsoft.card.adaptive";

const TOKEN_EXCHANGE_INVOKE: &str = "signin/tokenExchange";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelAccount {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speak: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

impl Activity {
    pub fn message(from: ChannelAccount, text: impl Into<String>) -> Self {
        Self {
            kind: "message".to_string(),
            from: Some(from),
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// Card submit: a message activity carrying only `value`.
    pub fn card_submit(from: ChannelAccount, payload: Value) -> Self {
        Self {
            kind: "message".to_string(),
            from: Some(from),
            value: Some(payload),
            ..Default::default()
        }
    }

    pub fn token_exchange(
        from: ChannelAccount,
        resource_id: &str,
        connection_name: &str,
        token: &str,
    ) -> Self {
        Self {
            kind: "invoke".to_string(),
            from: Some(from),
            name: Some(TOKEN_EXCHANGE_INVOKE.to_string()),
            value: Some(serde_json::json!({
                "id": resource_id,
                "connectionName": connection_name,
                "token": token,
            })),
            ..Default::default()
        }
    }

    pub fn is_message(&self) -> bool {
        self.kind.eq_ignore_ascii_case("message")
    }
}

/// Heuristic: an activity is from the bot when its sender role says so, or when
/// the sender id differs from ours. Multi-party conversations can fool the id check.
pub fn is_bot_activity(activity: &Activity, user_id: &str) -> bool {
    let Some(from) = activity.from.as_ref() else {
        return false;
    };
    match from.role.as_deref() {
        Some(role) if role.eq_ignore_ascii_case("bot") => true,
        Some(role) if role.eq_ignore_ascii_case("user") => false,
        _ => from.id != user_id,
    }
}

/// Fold the bot's message activities into one reply.
pub fn reply_from_activities(activities: &[Activity], user_id: &str) -> BackendReply {
    let bot: Vec<&Activity> = activities
        .iter()
        .filter(|a| a.is_message() && is_bot_activity(a, user_id))
        .collect();

    let bot_reply = bot
        .iter()
        .filter_map(|a| a.text.as_deref())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");

    let spoken = bot
        .iter()
        .filter_map(|a| a.speak.as_deref())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    let speech_text = if !spoken.is_empty() {
        Some(spoken)
    } else if !bot_reply.is_empty() {
        Some(clean_for_speech(&bot_reply))
    } else {
        None
    };

    let signin_card = bot
        .iter()
        .flat_map(|a| a.attachments.iter())
        .find_map(signin_card_from_attachment);

    BackendReply {
        bot_reply,
        speech_text,
        signin_card,
    }
}

/// Recognize OAuth, sign-in, and adaptive "Allow" consent cards.
pub fn signin_card_from_attachment(attachment: &Attachment) -> Option<SigninCard> {
    let content = attachment.content.as_ref()?;
    let content_type = attachment.content_type.to_ascii_lowercase();
    match content_type.as_str() {
        OAUTH_CARD => {
            let exchange = content.get("tokenExchangeResource");
            Some(SigninCard {
                title: first_button_title(content).unwrap_or_else(|| "Sign in".to_string()),
                message: str_field(content, "text").unwrap_or_default(),
                token_exchange_resource_uri: exchange.and_then(|e| str_field(e, "uri")),
                token_exchange_resource_id: exchange.and_then(|e| str_field(e, "id")),
                connection_name: str_field(content, "connectionName"),
                submit_action: None,
            })
        }
        SIGNIN_CARD => Some(SigninCard {
            title: first_button_title(content).unwrap_or_else(|| "Sign in".to_string()),
            message: str_field(content, "text").unwrap_or_default(),
            ..Default::default()
        }),
        ADAPTIVE_CARD => adaptive_consent_card(content),
        _ => None,
    }
}

fn adaptive_consent_card(content: &Value) -> Option<SigninCard> {
    let allow = find_allow_action(content)?;
    let mut texts = Vec::new();
    collect_text_blocks(content, &mut texts);
    let mut texts = texts.into_iter();
    let title = texts.next().unwrap_or_else(|| "Connect to continue".to_string());
    let message = texts.collect::<Vec<_>>().join(" ");
    Some(SigninCard {
        title,
        message,
        submit_action: Some(allow.get("data").cloned().unwrap_or(Value::Null)),
        ..Default::default()
    })
}

fn find_allow_action(value: &Value) -> Option<&Value> {
    match value {
        Value::Object(map) => {
            let is_submit = map
                .get("type")
                .and_then(Value::as_str)
                .is_some_and(|t| t == "Action.Submit");
            let is_allow = map
                .get("title")
                .and_then(Value::as_str)
                .is_some_and(|t| t.trim().eq_ignore_ascii_case("allow"));
            if is_submit && is_allow {
                return Some(value);
            }
            map.values().find_map(find_allow_action)
        }
        Value::Array(items) => items.iter().find_map(find_allow_action),
        _ => None,
    }
}

fn collect_text_blocks(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            let is_text_block = map
                .get("type")
                .and_then(Value::as_str)
                .is_some_and(|t| t == "TextBlock");
            if is_text_block {
                if let Some(text) = map.get("text").and_then(Value::as_str) {
                    let text = text.trim();
                    if !text.is_empty() {
                        out.push(text.to_string());
                    }
                }
            }
            for (key, child) in map {
                // Action payloads are not display text.
                if key != "actions" {
                    collect_text_blocks(child, out);
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_text_blocks(v, out)),
        _ => {}
    }
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn first_button_title(content: &Value) -> Option<String> {
    content
        .get("buttons")
        .and_then(Value::as_array)
        .and_then(|b| b.first())
        .and_then(|b| str_field(b, "title"))
}
