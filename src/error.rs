//! Error types for the voice bot
//!
//! [`Error`] covers failures at the edges (configuration, profile loading,
//! audio device setup). The conversation loop itself never fails: capture,
//! playback and completion problems are reported through [`VoiceError`] and
//! [`CompletionError`] and turned into state transitions by the controller.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Result type alias for voice bot operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur outside the conversation loop
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Profile document could not be loaded
    #[error("profile error: {0}")]
    Profile(String),

    /// Audio error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Optional platform feature whose absence must degrade gracefully
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Voice-to-text capture
    SpeechCapture,
    /// Text-to-speech synthesis
    SpeechSynthesis,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SpeechCapture => f.write_str("speech capture"),
            Self::SpeechSynthesis => f.write_str("speech synthesis"),
        }
    }
}

/// Reasons a listening session ends without a transcript
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// The platform refused microphone access
    #[error("microphone permission denied")]
    PermissionDenied,

    /// Nothing was said before the no-speech window elapsed
    #[error("no speech detected")]
    NoSpeech,

    /// Input device failed mid-session
    #[error("capture device error: {0}")]
    Device(String),

    /// The recorded utterance could not be transcribed
    #[error("transcription failed: {0}")]
    Transcription(String),
}

/// Reasons an utterance stops before it was fully spoken
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    /// Speech could not be synthesized
    #[error("synthesis failed: {0}")]
    Synthesis(String),

    /// Synthesized audio could not be decoded
    #[error("audio decode failed: {0}")]
    Decode(String),

    /// Output device failed
    #[error("output device error: {0}")]
    Device(String),
}

/// Errors reported by the speech adapters
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoiceError {
    /// Capture or synthesis is not supported by this runtime
    #[error("{0} is not available")]
    CapabilityUnavailable(Capability),

    /// Listening session failed
    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// Playback failed
    #[error(transparent)]
    Playback(#[from] PlaybackError),
}

/// A failed completion request, normalized to one human-readable message
///
/// The `Display` output is what the user sees (and hears) as the assistant's
/// reply, prefixed with `Error: `.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompletionError {
    /// No bearer credential configured
    #[error("missing API key (set GROQ_API_KEY)")]
    MissingCredential,

    /// Request could not be sent or the connection failed
    #[error("network error: {0}")]
    Network(String),

    /// Request exceeded the configured timeout
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// Endpoint answered with a non-success status
    #[error("API Error {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Error detail from the body, or the status reason
        message: String,
    },

    /// Response body did not have the expected shape
    #[error("malformed response: {0}")]
    Malformed(String),
}
