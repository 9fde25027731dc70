//! **Speech-to-Text (STT)**: turn a captured utterance into text for the orchestrator.
//!
//! Capture itself happens elsewhere; this module only sees finished PCM buffers.

use crate::config::env_opt_string;
use crate::error::{ConversationError, ConversationResult};
use crate::speech_api::{success_or_message, SpeechApi};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::io::Cursor;
use std::time::Duration;
use tracing::debug;

/// A finished utterance: mono f32 PCM in -1.0..1.0.
#[derive(Debug, Clone, Default)]
pub struct PcmUtterance {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl PcmUtterance {
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}

/// Backend for converting PCM to text.
#[async_trait]
pub trait SttBackend: Send + Sync {
    /// Return an empty string if nothing intelligible was said.
    async fn transcribe(&self, utterance: &PcmUtterance) -> ConversationResult<String>;
}

/// Encode mono f32 PCM as 16-bit WAV.
pub fn pcm_to_wav(samples: &[f32], sample_rate: u32) -> ConversationResult<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &s in samples {
            let clamped = s.clamp(-1.0, 1.0);
            writer.write_sample((clamped * i16::MAX as f32).round() as i16)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Offline STT: a fixed transcript, or a description of the audio when none is set.
#[derive(Debug, Default)]
pub struct PlaceholderStt {
    transcript: Option<String>,
}

impl PlaceholderStt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(transcript: impl Into<String>) -> Self {
        Self {
            transcript: Some(transcript.into()),
        }
    }
}

#[async_trait]
impl SttBackend for PlaceholderStt {
    async fn transcribe(&self, utterance: &PcmUtterance) -> ConversationResult<String> {
        Ok(self.transcript.clone().unwrap_or_else(|| {
            format!(
                "[STT placeholder: {} samples, {:.1}s]",
                utterance.samples.len(),
                utterance.duration().as_secs_f32()
            )
        }))
    }
}

const TRANSCRIPTION_TIMEOUT: Duration = Duration::from_secs(30);

/// OpenAI-compatible transcription API (`POST {base}/audio/transcriptions`).
/// Uses `STT_API_URL`, `STT_API_KEY` and `STT_MODEL` (default whisper-1).
#[derive(Debug, Clone)]
pub struct OpenAiStt {
    api: SpeechApi,
    model: String,
}

#[derive(Deserialize)]
struct Transcription {
    #[serde(default)]
    text: String,
}

impl OpenAiStt {
    pub fn from_env() -> ConversationResult<Self> {
        Ok(Self {
            api: SpeechApi::from_env("STT", TRANSCRIPTION_TIMEOUT)?,
            model: env_opt_string("STT_MODEL").unwrap_or_else(|| "whisper-1".to_string()),
        })
    }

    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> ConversationResult<Self> {
        Ok(Self {
            api: SpeechApi::new(base_url, api_key, TRANSCRIPTION_TIMEOUT)?,
            model: model.into(),
        })
    }
}

#[async_trait]
impl SttBackend for OpenAiStt {
    async fn transcribe(&self, utterance: &PcmUtterance) -> ConversationResult<String> {
        if utterance.samples.is_empty() {
            return Ok(String::new());
        }
        let wav = pcm_to_wav(&utterance.samples, utterance.sample_rate)?;
        let file = Part::bytes(wav).file_name("utterance.wav").mime_str("audio/wav")?;
        let form = Form::new()
            .part("file", file)
            .text("model", self.model.clone());

        let res = self.api.post("audio/transcriptions").multipart(form).send().await?;
        let res = success_or_message(res)
            .await
            .map_err(|m| ConversationError::Stt(format!("transcription API {}", m)))?;
        let transcription: Transcription = res.json().await?;
        debug!(
            "STT: {:.1}s of audio -> {} chars",
            utterance.duration().as_secs_f32(),
            transcription.text.len()
        );
        Ok(transcription.text.trim().to_string())
    }
}
