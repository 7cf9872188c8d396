//! Speech-to-text (STT) processing
//!
//! Blocking client for Whisper-compatible `audio/transcriptions` endpoints.
//! Called from capture worker threads, never from async code.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::config::VoiceConfig;
use crate::{Error, Result};

/// Upper bound for one transcription request
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Response from a Whisper transcription API
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Transcribes recorded utterances to text
#[derive(Debug, Clone)]
pub struct Transcriber {
    url: String,
    api_key: SecretString,
    model: String,
    language: String,
}

impl Transcriber {
    /// Create a transcriber from voice configuration
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(config: &VoiceConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            Error::Config("OPENAI_API_KEY required for speech transcription".to_string())
        })?;

        Ok(Self {
            url: config.stt_url.clone(),
            api_key,
            model: config.stt_model.clone(),
            language: config.language.clone(),
        })
    }

    /// Transcribe WAV audio to text
    ///
    /// # Errors
    ///
    /// Returns error if the request or the response fails
    pub fn transcribe(&self, wav: &[u8]) -> Result<String> {
        tracing::debug!(audio_bytes = wav.len(), "starting transcription");

        // Built per call: the blocking client must not be created inside the async runtime
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        let form = reqwest::blocking::multipart::Form::new()
            .part(
                "file",
                reqwest::blocking::multipart::Part::bytes(wav.to_vec())
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("model", self.model.clone())
            .text("language", self.language.clone());

        let response = client
            .post(&self.url)
            .bearer_auth(self.api_key.expose_secret())
            .multipart(form)
            .send()
            .map_err(|e| {
                tracing::error!(error = %e, "transcription request failed");
                e
            })?;

        let status = response.status();
        tracing::debug!(status = %status, "received response");

        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            tracing::error!(status = %status, body = %body, "transcription API error");
            return Err(Error::Stt(format!("transcription API error {status}: {body}")));
        }

        let result: WhisperResponse = response.json().map_err(|e| {
            tracing::error!(error = %e, "failed to parse transcription response");
            e
        })?;

        let text = result.text.trim().to_string();
        tracing::info!(transcript = %text, "transcription complete");
        Ok(text)
    }
}
