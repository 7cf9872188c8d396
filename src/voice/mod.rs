//! Voice processing module
//!
//! Speech capture and playback sit behind two adapter traits. Adapters never
//! touch controller state: they report what happened as [`CaptureEvent`]s
//! and [`PlaybackEvent`]s on channels drained by the session loop.
//!
//! Every listening session and every utterance is tagged with an id chosen
//! by the controller, so events that arrive after a stop or cancel can be
//! recognized as stale.

mod capture;
mod microphone;
mod playback;
mod segmenter;
mod speaker;
mod stt;
mod tts;

use tokio::sync::mpsc;

pub use capture::{AudioCapture, SAMPLE_RATE, input_available, samples_to_wav};
pub use microphone::{ListenSettings, MicrophoneCapture};
pub use playback::{AudioPlayback, PLAYBACK_SAMPLE_RATE, decode_mp3, output_available};
pub use segmenter::{SegmenterState, UtteranceSegmenter};
pub use speaker::SpeakerPlayback;
pub use stt::Transcriber;
pub use tts::Synthesizer;

use crate::{Capability, CaptureError, PlaybackError, VoiceError};

/// Identifies one listening session
pub type SessionId = u64;

/// Identifies one `speak` invocation
pub type UtteranceId = u64;

/// Sender half used by capture adapters
pub type CaptureEventSender = mpsc::UnboundedSender<CaptureEvent>;

/// Sender half used by playback adapters
pub type PlaybackEventSender = mpsc::UnboundedSender<PlaybackEvent>;

/// Something a capture adapter observed during a listening session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// Partial transcript, may be superseded
    Interim {
        session: SessionId,
        transcript: String,
    },
    /// Final transcript; ends the session
    Final {
        session: SessionId,
        transcript: String,
    },
    /// Session ended with an error
    Error {
        session: SessionId,
        error: CaptureError,
    },
    /// Session ended without a transcript (stopped)
    Ended { session: SessionId },
}

impl CaptureEvent {
    /// Session this event belongs to
    #[must_use]
    pub const fn session(&self) -> SessionId {
        match self {
            Self::Interim { session, .. }
            | Self::Final { session, .. }
            | Self::Error { session, .. }
            | Self::Ended { session } => *session,
        }
    }

    /// Whether this event ends its session
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Interim { .. })
    }
}

/// Lifecycle of one utterance
///
/// Each `speak` invocation produces exactly one `Started` followed by exactly
/// one terminal event (`Ended` or `Failed`), cancelled or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    Started { utterance: UtteranceId },
    Ended { utterance: UtteranceId },
    Failed {
        utterance: UtteranceId,
        error: PlaybackError,
    },
}

impl PlaybackEvent {
    /// Utterance this event belongs to
    #[must_use]
    pub const fn utterance(&self) -> UtteranceId {
        match self {
            Self::Started { utterance }
            | Self::Ended { utterance }
            | Self::Failed { utterance, .. } => *utterance,
        }
    }
}

/// Voice-to-text capability
pub trait SpeechCapture: Send {
    /// Whether the platform offers capture at all
    fn is_available(&self) -> bool;

    /// Begin a listening session, abandoning any earlier one still running
    ///
    /// # Errors
    ///
    /// Returns [`VoiceError::CapabilityUnavailable`] when there is nothing to
    /// capture with, or a capture error if the session cannot start
    fn start(&mut self, session: SessionId) -> Result<(), VoiceError>;

    /// End the current session, if any
    fn stop(&mut self);
}

/// Text-to-speech capability
pub trait SpeechPlayback: Send {
    /// Whether the platform offers synthesis at all
    fn is_available(&self) -> bool;

    /// Speak `text`, cancelling anything already playing
    ///
    /// # Errors
    ///
    /// Returns [`VoiceError::CapabilityUnavailable`] when there is no output
    fn speak(&mut self, utterance: UtteranceId, text: &str) -> Result<(), VoiceError>;

    /// Stop any in-flight utterance; idempotent
    fn cancel(&mut self);
}

impl<T: SpeechCapture + ?Sized> SpeechCapture for Box<T> {
    fn is_available(&self) -> bool {
        (**self).is_available()
    }

    fn start(&mut self, session: SessionId) -> Result<(), VoiceError> {
        (**self).start(session)
    }

    fn stop(&mut self) {
        (**self).stop();
    }
}

impl<T: SpeechPlayback + ?Sized> SpeechPlayback for Box<T> {
    fn is_available(&self) -> bool {
        (**self).is_available()
    }

    fn speak(&mut self, utterance: UtteranceId, text: &str) -> Result<(), VoiceError> {
        (**self).speak(utterance, text)
    }

    fn cancel(&mut self) {
        (**self).cancel();
    }
}

/// Capture adapter for runtimes without a microphone or with voice disabled
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableCapture;

impl SpeechCapture for UnavailableCapture {
    fn is_available(&self) -> bool {
        false
    }

    fn start(&mut self, _session: SessionId) -> Result<(), VoiceError> {
        Err(VoiceError::CapabilityUnavailable(Capability::SpeechCapture))
    }

    fn stop(&mut self) {}
}

/// Playback adapter for runtimes without audio output or with voice disabled
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailablePlayback;

impl SpeechPlayback for UnavailablePlayback {
    fn is_available(&self) -> bool {
        false
    }

    fn speak(&mut self, _utterance: UtteranceId, _text: &str) -> Result<(), VoiceError> {
        Err(VoiceError::CapabilityUnavailable(Capability::SpeechSynthesis))
    }

    fn cancel(&mut self) {}
}
