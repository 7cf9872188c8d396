//! Text-to-speech (TTS) processing
//!
//! Blocking client for OpenAI-compatible `audio/speech` endpoints; returns
//! MP3 bytes. Called from playback worker threads.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::config::VoiceConfig;
use crate::{Error, Result};

/// Upper bound for one synthesis request
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Synthesizes speech from text
#[derive(Debug, Clone)]
pub struct Synthesizer {
    url: String,
    api_key: SecretString,
    model: String,
    voice: String,
    speed: f32,
}

impl Synthesizer {
    /// Create a synthesizer from voice configuration
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(config: &VoiceConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            Error::Config("OPENAI_API_KEY required for speech synthesis".to_string())
        })?;

        Ok(Self {
            url: config.tts_url.clone(),
            api_key,
            model: config.tts_model.clone(),
            voice: config.tts_voice.clone(),
            speed: config.tts_speed,
        })
    }

    /// Synthesize text to MP3 audio
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    pub fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
            response_format: &'a str,
        }

        let request = TtsRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            speed: self.speed,
            response_format: "mp3",
        };

        tracing::debug!(chars = text.len(), voice = %self.voice, "synthesizing speech");

        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        let response = client
            .post(&self.url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(Error::Tts(format!("TTS API error {status}: {body}")));
        }

        let audio = response.bytes()?;
        Ok(audio.to_vec())
    }
}
