//! **Speech synthesis**: text in, opaque audio clip out.
//!
//! The orchestrator never looks inside an `AudioClip`; it only hands it to the
//! playback adapter. Implement `SpeechSynthesizer` for any TTS vendor.

use crate::config::env_opt_string;
use crate::error::{ConversationError, ConversationResult};
use crate::speech_api::{success_or_message, SpeechApi};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// Synthesized audio ready for playback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioClip {
    pub bytes: Vec<u8>,
    /// e.g. `audio/mpeg`, `audio/wav`.
    pub mime_type: String,
}

impl AudioClip {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Backend that turns text into audio.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> ConversationResult<AudioClip>;
}

/// Placeholder TTS: returns an empty clip so nothing audible plays.
#[derive(Debug, Default)]
pub struct PlaceholderTts;

#[async_trait]
impl SpeechSynthesizer for PlaceholderTts {
    async fn synthesize(&self, _text: &str) -> ConversationResult<AudioClip> {
        Ok(AudioClip::default())
    }
}

const SYNTHESIS_TIMEOUT: Duration = Duration::from_secs(60);

/// OpenAI-compatible TTS (`POST {base}/audio/speech`).
/// Uses `TTS_API_URL`, `TTS_API_KEY`, `TTS_MODEL` (default tts-1) and `TTS_VOICE` (default nova).
#[derive(Debug, Clone)]
pub struct OpenAiTts {
    api: SpeechApi,
    model: String,
    voice: String,
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
}

impl OpenAiTts {
    /// Build from environment. Fails when no API key is set.
    pub fn from_env() -> ConversationResult<Self> {
        Ok(Self {
            api: SpeechApi::from_env("TTS", SYNTHESIS_TIMEOUT)?,
            model: env_opt_string("TTS_MODEL").unwrap_or_else(|| "tts-1".to_string()),
            voice: env_opt_string("TTS_VOICE").unwrap_or_else(|| "nova".to_string()),
        })
    }

    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        voice: impl Into<String>,
    ) -> ConversationResult<Self> {
        Ok(Self {
            api: SpeechApi::new(base_url, api_key, SYNTHESIS_TIMEOUT)?,
            model: model.into(),
            voice: voice.into(),
        })
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiTts {
    async fn synthesize(&self, text: &str) -> ConversationResult<AudioClip> {
        let input = text.trim();
        if input.is_empty() {
            return Ok(AudioClip::default());
        }
        let request = SpeechRequest {
            model: &self.model,
            input,
            voice: &self.voice,
        };
        let res = self.api.post("audio/speech").json(&request).send().await?;
        let res = success_or_message(res)
            .await
            .map_err(|m| ConversationError::Tts(format!("speech API {}", m)))?;
        let mime_type = res
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("audio/mpeg")
            .to_string();
        let bytes = res.bytes().await?;
        debug!("TTS: {} bytes of {} for {} chars", bytes.len(), mime_type, input.chars().count());
        Ok(AudioClip::new(bytes.to_vec(), mime_type))
    }
}
