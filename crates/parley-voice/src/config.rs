//! Conversation configuration loaded from `.env` / the process environment.

use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_DIRECT_LINE_ENDPOINT: &str = "https://directline.botframework.com";

fn default_user_id() -> String {
    "user".to_string()
}

fn default_user_name() -> String {
    "User".to_string()
}

fn default_endpoint() -> String {
    DEFAULT_DIRECT_LINE_ENDPOINT.to_string()
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_reply_timeout_ms() -> u64 {
    30_000
}

fn default_locale() -> String {
    "en-US".to_string()
}

/// Conversation configuration.
///
/// | Env | Default | Description |
/// |-----|---------|-------------|
/// | PARLEY_FILLER_TEMPLATE | unset | Filler phrase; `{{input}}` is replaced by the user's words. Unset disables filler. |
/// | PARLEY_USER_ID | user | Id stamped on outgoing activities; also used to tell bot activities apart. |
/// | PARLEY_USER_NAME | User | Display name on outgoing activities. |
/// | DIRECT_LINE_ENDPOINT | https://directline.botframework.com | Backend channel base URL. |
/// | DIRECT_LINE_SECRET | unset | Bearer secret or token for the backend channel. |
/// | PARLEY_POLL_INTERVAL_MS | 500 | Reply polling cadence. |
/// | PARLEY_REPLY_TIMEOUT_MS | 30000 | Give up waiting for a reply after this long. |
/// | PARLEY_LOCALE | en-US | Locale on outgoing activities. |
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    #[serde(default)]
    pub filler_template: Option<String>,
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default = "default_user_name")]
    pub user_name: String,
    #[serde(default = "default_endpoint")]
    pub direct_line_endpoint: String,
    #[serde(default)]
    pub direct_line_secret: Option<String>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_reply_timeout_ms")]
    pub reply_timeout_ms: u64,
    #[serde(default = "default_locale")]
    pub locale: String,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            filler_template: None,
            user_id: default_user_id(),
            user_name: default_user_name(),
            direct_line_endpoint: default_endpoint(),
            direct_line_secret: None,
            poll_interval_ms: default_poll_interval_ms(),
            reply_timeout_ms: default_reply_timeout_ms(),
            locale: default_locale(),
        }
    }
}

impl ConversationConfig {
    /// Load from environment. Unset or invalid => defaults (see struct docs).
    pub fn from_env() -> Self {
        Self {
            filler_template: env_opt_string("PARLEY_FILLER_TEMPLATE"),
            user_id: env_opt_string("PARLEY_USER_ID").unwrap_or_else(default_user_id),
            user_name: env_opt_string("PARLEY_USER_NAME").unwrap_or_else(default_user_name),
            direct_line_endpoint: env_opt_string("DIRECT_LINE_ENDPOINT")
                .unwrap_or_else(default_endpoint),
            direct_line_secret: env_opt_string("DIRECT_LINE_SECRET"),
            poll_interval_ms: env_u64("PARLEY_POLL_INTERVAL_MS", default_poll_interval_ms()),
            reply_timeout_ms: env_u64("PARLEY_REPLY_TIMEOUT_MS", default_reply_timeout_ms()),
            locale: env_opt_string("PARLEY_LOCALE").unwrap_or_else(default_locale),
        }
    }

    /// Filler template when configured and non-blank.
    pub fn filler(&self) -> Option<&str> {
        self.filler_template
            .as_deref()
            .filter(|t| !t.trim().is_empty())
    }

    pub fn with_filler(mut self, template: impl Into<String>) -> Self {
        self.filler_template = Some(template.into());
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }
}

pub(crate) fn env_opt_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
