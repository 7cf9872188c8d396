//! Speaker-backed [`SpeechPlayback`]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{
    AudioPlayback, PlaybackEvent, PlaybackEventSender, SpeechPlayback, Synthesizer, UtteranceId,
    decode_mp3, output_available,
};
use crate::{Capability, PlaybackError, VoiceError};

/// Renders one utterance audibly, returning early once `cancel` is set
trait SpeechOutput: Send + Sync {
    fn play(&self, text: &str, cancel: &AtomicBool) -> Result<(), PlaybackError>;
}

/// Synthesize, decode and play through the default output device
impl SpeechOutput for Synthesizer {
    fn play(&self, text: &str, cancel: &AtomicBool) -> Result<(), PlaybackError> {
        let mp3 = self
            .synthesize(text)
            .map_err(|e| PlaybackError::Synthesis(e.to_string()))?;

        if cancel.load(Ordering::Acquire) {
            return Ok(());
        }

        let samples = decode_mp3(&mp3).map_err(|e| PlaybackError::Decode(e.to_string()))?;
        let output = AudioPlayback::new().map_err(|e| PlaybackError::Device(e.to_string()))?;
        output
            .play_until(samples, cancel)
            .map(|_completed| ())
            .map_err(|e| PlaybackError::Device(e.to_string()))
    }
}

struct ActiveUtterance {
    id: UtteranceId,
    cancel: Arc<AtomicBool>,
}

/// Speaks replies through the default output device
///
/// One worker thread per utterance synthesizes, decodes and plays the
/// audio. Starting a new utterance cancels the previous one first.
pub struct SpeakerPlayback {
    events: PlaybackEventSender,
    output: Arc<dyn SpeechOutput>,
    available: bool,
    active: Option<ActiveUtterance>,
}

impl SpeakerPlayback {
    /// Create a playback adapter reporting on `events`
    #[must_use]
    pub fn new(events: PlaybackEventSender, synthesizer: Synthesizer) -> Self {
        let available = output_available();
        if !available {
            tracing::warn!("no output device found, speech playback disabled");
        }

        Self::with_output(events, Arc::new(synthesizer), available)
    }

    fn with_output(
        events: PlaybackEventSender,
        output: Arc<dyn SpeechOutput>,
        available: bool,
    ) -> Self {
        Self {
            events,
            output,
            available,
            active: None,
        }
    }
}

impl SpeechPlayback for SpeakerPlayback {
    fn is_available(&self) -> bool {
        self.available
    }

    fn speak(&mut self, utterance: UtteranceId, text: &str) -> Result<(), VoiceError> {
        if !self.available {
            return Err(VoiceError::CapabilityUnavailable(Capability::SpeechSynthesis));
        }

        self.cancel();

        let cancel = Arc::new(AtomicBool::new(false));
        let events = self.events.clone();
        let output = Arc::clone(&self.output);
        let text = text.to_string();
        let worker_cancel = Arc::clone(&cancel);

        std::thread::Builder::new()
            .name(format!("speak-{utterance}"))
            .spawn(move || speak_utterance(&events, utterance, output.as_ref(), &text, &worker_cancel))
            .map_err(|e| PlaybackError::Device(format!("failed to spawn playback thread: {e}")))?;

        self.active = Some(ActiveUtterance {
            id: utterance,
            cancel,
        });
        Ok(())
    }

    fn cancel(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.store(true, Ordering::Release);
            tracing::debug!(utterance = active.id, "playback cancelled");
        }
    }
}

impl Drop for SpeakerPlayback {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Worker body: one `Started`, then exactly one `Ended` or `Failed`
///
/// A cancelled utterance ends normally.
fn speak_utterance(
    events: &PlaybackEventSender,
    utterance: UtteranceId,
    output: &dyn SpeechOutput,
    text: &str,
    cancel: &AtomicBool,
) {
    // Receiver gone means the session loop has shut down
    let _ = events.send(PlaybackEvent::Started { utterance });
    let terminal = match output.play(text, cancel) {
        Ok(()) => PlaybackEvent::Ended { utterance },
        Err(error) => {
            tracing::warn!(utterance, error = %error, "playback failed");
            PlaybackEvent::Failed { utterance, error }
        }
    };
    let _ = events.send(terminal);
}
