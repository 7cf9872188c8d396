//! Controller state as seen by the presentation surface

use serde::Serialize;

use crate::conversation::ConversationTurn;

/// Whether a listening session is active
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureState {
    #[default]
    Idle,
    Listening,
}

/// Whether a completion request is in flight
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingState {
    #[default]
    Idle,
    AwaitingCompletion,
}

/// Whether a reply is being read aloud
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    #[default]
    Idle,
    Speaking,
}

/// Everything the presentation surface renders
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub turns: Vec<ConversationTurn>,
    pub interim_transcript: String,
    pub capture: CaptureState,
    pub processing: ProcessingState,
    pub playback: PlaybackState,
    pub auto_speak: bool,
    /// False once capture reported itself unavailable; voice input controls stay disabled
    pub capture_available: bool,
    pub playback_available: bool,
    /// Why the last listening session ended early, if it did
    pub capture_error: Option<String>,
    /// Why the last utterance failed, if it did
    pub playback_error: Option<String>,
}

impl SessionSnapshot {
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.capture == CaptureState::Listening
    }

    #[must_use]
    pub fn is_processing(&self) -> bool {
        self.processing == ProcessingState::AwaitingCompletion
    }

    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.playback == PlaybackState::Speaking
    }
}
