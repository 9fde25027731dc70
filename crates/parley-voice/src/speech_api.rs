//! Shared plumbing for OpenAI-compatible speech endpoints (TTS and STT).

use crate::config::env_opt_string;
use crate::error::{ConversationError, ConversationResult};
use std::fmt;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Base URL, bearer key and a client with a per-request timeout.
#[derive(Clone)]
pub(crate) struct SpeechApi {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl fmt::Debug for SpeechApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpeechApi")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl SpeechApi {
    pub(crate) fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> ConversationResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }

    /// Reads `{prefix}_API_URL` and `{prefix}_API_KEY`; the key is required.
    pub(crate) fn from_env(prefix: &str, timeout: Duration) -> ConversationResult<Self> {
        let key_var = format!("{prefix}_API_KEY");
        let api_key = env_opt_string(&key_var)
            .ok_or_else(|| ConversationError::Config(format!("{key_var} is not set")))?;
        let base_url = env_opt_string(&format!("{prefix}_API_URL"))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self::new(base_url, api_key, timeout)
    }

    pub(crate) fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}/{}", self.base_url, path.trim_start_matches('/')))
            .bearer_auth(&self.api_key)
    }
}

/// `Ok(res)` on 2xx, otherwise `"{status}: {body}"` for the caller to wrap.
pub(crate) async fn success_or_message(
    res: reqwest::Response,
) -> Result<reqwest::Response, String> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    Err(format!("{}: {}", status, body.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_hides_the_key() {
        let api = SpeechApi::new("https://example.com/v1/", "sk-secret", Duration::from_secs(1))
            .unwrap();
        let shown = format!("{:?}", api);
        assert!(!shown.contains("sk-secret"));
        assert!(shown.contains("https://example.com/v1\""));
    }
}
