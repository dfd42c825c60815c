//! Narration synthesis through ElevenLabs text-to-speech.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::http::{client_with_timeout, read_bytes};

const PROVIDER: &str = "elevenlabs";
const TTS_URL: &str = "https://api.elevenlabs.io/v1/text-to-speech";
const MODEL_ID: &str = "eleven_flash_v2_5";
const OUTPUT_FORMAT: &str = "mp3_44100_128";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Voice used when neither the project nor the config names one.
pub const DEFAULT_VOICE_ID: &str = "pNInz6obpgDQGcFmaJgB";

/// Bitrate of [`OUTPUT_FORMAT`] in kilobits per second.
const OUTPUT_KBPS: usize = 128;

#[derive(Debug, Clone, PartialEq)]
pub struct SpeechRequest<'a> {
    pub text: &'a str,
    /// Free-text delivery hint from the plan.
    pub voice_style: &'a str,
    pub voice_id: Option<&'a str>,
}

/// Synthesised narration.
#[derive(Debug, Clone, PartialEq)]
pub struct Speech {
    /// MP3 bytes.
    pub bytes: Vec<u8>,
    pub duration_ms: i32,
}

#[async_trait]
pub trait SpeechSynth: Send + Sync {
    async fn synthesize(&self, request: &SpeechRequest<'_>) -> Result<Speech, ProviderError>;
}

/// Playback length of a constant-bitrate MP3 of `len` bytes.
pub fn cbr_duration_ms(len: usize, kbps: usize) -> i32 {
    // bits / (kbit/s) = ms
    i32::try_from(len * 8 / kbps).unwrap_or(i32::MAX)
}

pub struct ElevenLabsSpeech {
    client: reqwest::Client,
    api_key: String,
    default_voice_id: String,
}

impl ElevenLabsSpeech {
    pub fn new(api_key: String, default_voice_id: Option<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            client: client_with_timeout(REQUEST_TIMEOUT)?,
            api_key,
            default_voice_id: default_voice_id.unwrap_or_else(|| DEFAULT_VOICE_ID.to_string()),
        })
    }
}

#[async_trait]
impl SpeechSynth for ElevenLabsSpeech {
    async fn synthesize(&self, request: &SpeechRequest<'_>) -> Result<Speech, ProviderError> {
        let voice_id = request
            .voice_id
            .filter(|v| !v.is_empty())
            .unwrap_or(self.default_voice_id.as_str());

        let body = serde_json::json!({
            "text": request.text,
            "model_id": MODEL_ID,
            "voice_settings": {
                "stability": 0.60,
                "similarity_boost": 0.80,
                "style": 0.35,
                "use_speaker_boost": true,
            },
        });

        let response = self
            .client
            .post(format!("{TTS_URL}/{voice_id}"))
            .query(&[("output_format", OUTPUT_FORMAT)])
            .header("xi-api-key", &self.api_key)
            .header(reqwest::header::ACCEPT, "audio/mpeg")
            .json(&body)
            .send()
            .await?;

        let bytes = read_bytes(PROVIDER, response).await?;
        if bytes.is_empty() {
            return Err(ProviderError::invalid(PROVIDER, "empty audio body"));
        }

        let duration_ms = cbr_duration_ms(bytes.len(), OUTPUT_KBPS);
        tracing::debug!(
            voice_id,
            voice_style = request.voice_style,
            bytes = bytes.len(),
            duration_ms,
            "Speech synthesised",
        );
        Ok(Speech { bytes, duration_ms })
    }
}
