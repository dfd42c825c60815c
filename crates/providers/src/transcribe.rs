//! Word-level timing through OpenAI Whisper.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::http::{client_with_timeout, parse_json};

const PROVIDER: &str = "whisper";
const TRANSCRIPTIONS_URL: &str = "https://api.openai.com/v1/audio/transcriptions";
const MODEL: &str = "whisper-1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// One spoken word with its position in the audio, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordTimestamp {
    pub word: String,
    pub start: f64,
    pub end: f64,
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe MP3 `audio`. An empty result is an error.
    async fn transcribe(
        &self,
        audio: &[u8],
        language: Option<&str>,
    ) -> Result<Vec<WordTimestamp>, ProviderError>;
}

#[derive(Debug, Deserialize)]
struct VerboseTranscription {
    #[serde(default)]
    text: String,
    #[serde(default)]
    words: Vec<WordTimestamp>,
}

fn into_words(response: VerboseTranscription) -> Result<Vec<WordTimestamp>, ProviderError> {
    let words: Vec<WordTimestamp> = response
        .words
        .into_iter()
        .map(|w| WordTimestamp {
            word: w.word.trim().to_string(),
            ..w
        })
        .filter(|w| !w.word.is_empty())
        .collect();

    if words.is_empty() {
        return Err(ProviderError::invalid(
            PROVIDER,
            format!("no word timestamps (text: {:?})", response.text),
        ));
    }
    Ok(words)
}

pub struct WhisperTranscriber {
    client: reqwest::Client,
    api_key: String,
}

impl WhisperTranscriber {
    pub fn new(api_key: String) -> Result<Self, ProviderError> {
        Ok(Self {
            client: client_with_timeout(REQUEST_TIMEOUT)?,
            api_key,
        })
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(
        &self,
        audio: &[u8],
        language: Option<&str>,
    ) -> Result<Vec<WordTimestamp>, ProviderError> {
        let file = reqwest::multipart::Part::bytes(audio.to_vec())
            .file_name("audio.mp3")
            .mime_str("audio/mpeg")?;
        let form = reqwest::multipart::Form::new()
            .part("file", file)
            .text("model", MODEL)
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "word")
            .text("language", language.unwrap_or("en").to_string());

        let response = self
            .client
            .post(TRANSCRIPTIONS_URL)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let words = into_words(parse_json(PROVIDER, response).await?)?;
        tracing::debug!(words = words.len(), "Audio transcribed");
        Ok(words)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn words_are_trimmed_and_blank_ones_dropped() {
        let response: VerboseTranscription = serde_json::from_value(serde_json::json!({
            "text": "Hello there",
            "words": [
                { "word": " Hello", "start": 0.0, "end": 0.4 },
                { "word": " ", "start": 0.4, "end": 0.45 },
                { "word": "there ", "start": 0.5, "end": 0.9 }
            ]
        }))
        .unwrap();

        let words = into_words(response).unwrap();
        assert_eq!(words.len(), 2);
        assert_eq!(words[0].word, "Hello");
        assert_eq!(words[1].word, "there");
        assert_eq!(words[1].start, 0.5);
    }

    #[test]
    fn empty_word_list_is_an_error() {
        let response: VerboseTranscription =
            serde_json::from_value(serde_json::json!({ "text": "" })).unwrap();
        assert_matches!(into_words(response), Err(ProviderError::InvalidResponse { .. }));
    }
}
