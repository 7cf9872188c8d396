//! Microphone-backed [`SpeechCapture`]
//!
//! Each listening session runs on its own thread: the audio stream is opened
//! there (cpal streams are not `Send`), segmented into one utterance and
//! transcribed. The thread reports back only through [`CaptureEvent`]s, and
//! always finishes with exactly one terminal event.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::{
    AudioCapture, CaptureEvent, CaptureEventSender, SAMPLE_RATE, SessionId, SpeechCapture,
    Transcriber, UtteranceSegmenter, input_available, samples_to_wav,
};
use crate::config::VoiceConfig;
use crate::{Capability, CaptureError, Result, VoiceError};

/// How often the worker drains the capture buffer
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Longest stretch of audio uploaded for an interim transcript (15 seconds)
const MAX_INTERIM_SAMPLES: usize = SAMPLE_RATE as usize * 15;

/// Timing of a listening session
#[derive(Debug, Clone, Copy)]
pub struct ListenSettings {
    /// Give up if nothing is said within this window
    pub no_speech_timeout: Duration,
    /// Transcribe the partial utterance this often; `None` disables interim results
    pub interim_interval: Option<Duration>,
    /// Transcribe what was heard once the utterance grows this long
    pub max_utterance: Duration,
}

impl ListenSettings {
    fn max_utterance_samples(&self) -> usize {
        let samples = self.max_utterance.as_millis() * u128::from(SAMPLE_RATE) / 1000;
        usize::try_from(samples).unwrap_or(usize::MAX).max(1)
    }
}

impl From<&VoiceConfig> for ListenSettings {
    fn from(config: &VoiceConfig) -> Self {
        Self {
            no_speech_timeout: config.no_speech_timeout,
            interim_interval: config.interim_interval,
            max_utterance: config.max_utterance,
        }
    }
}

/// Audio feed of one listening session
trait SampleSource {
    /// Samples recorded since the last call
    fn take_samples(&mut self) -> Vec<f32>;

    /// Device failure reported since the last call
    fn take_error(&mut self) -> Option<String>;

    /// Stop recording once the utterance is buffered
    fn finish(&mut self);
}

impl SampleSource for AudioCapture {
    fn take_samples(&mut self) -> Vec<f32> {
        self.take_buffer()
    }

    fn take_error(&mut self) -> Option<String> {
        Self::take_error(self)
    }

    fn finish(&mut self) {
        self.stop();
    }
}

/// Turns a recorded utterance into text
trait Transcribe: Send + Sync {
    fn transcribe(&self, wav: &[u8]) -> Result<String>;
}

impl Transcribe for Transcriber {
    fn transcribe(&self, wav: &[u8]) -> Result<String> {
        Self::transcribe(self, wav)
    }
}

/// Opens the audio feed on the worker thread
type OpenSource = dyn Fn() -> Result<Box<dyn SampleSource>> + Send + Sync;

fn open_microphone() -> Result<Box<dyn SampleSource>> {
    let mut capture = AudioCapture::new()?;
    capture.start()?;
    Ok(Box::new(capture))
}

struct ActiveSession {
    id: SessionId,
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Captures one spoken question per session from the default microphone
pub struct MicrophoneCapture {
    events: CaptureEventSender,
    transcriber: Arc<dyn Transcribe>,
    open: Arc<OpenSource>,
    settings: ListenSettings,
    poll: Duration,
    available: bool,
    active: Option<ActiveSession>,
}

impl MicrophoneCapture {
    /// Create a capture adapter reporting on `events`
    ///
    /// Availability is checked once here; without an input device every
    /// `start` fails with `CapabilityUnavailable`.
    #[must_use]
    pub fn new(events: CaptureEventSender, transcriber: Transcriber, settings: ListenSettings) -> Self {
        let available = input_available();
        if !available {
            tracing::warn!("no input device found, speech capture disabled");
        }

        Self::with_source(
            events,
            Arc::new(transcriber),
            Arc::new(open_microphone),
            settings,
            available,
        )
    }

    fn with_source(
        events: CaptureEventSender,
        transcriber: Arc<dyn Transcribe>,
        open: Arc<OpenSource>,
        settings: ListenSettings,
        available: bool,
    ) -> Self {
        Self {
            events,
            transcriber,
            open,
            settings,
            poll: POLL_INTERVAL,
            available,
            active: None,
        }
    }
}

impl SpeechCapture for MicrophoneCapture {
    fn is_available(&self) -> bool {
        self.available
    }

    fn start(&mut self, session: SessionId) -> std::result::Result<(), VoiceError> {
        if !self.available {
            return Err(VoiceError::CapabilityUnavailable(Capability::SpeechCapture));
        }

        // The controller only starts from Idle, so a worker still winding
        // down belongs to an abandoned session
        if let Some(stale) = &self.active
            && !stale.handle.is_finished()
        {
            tracing::debug!(stale = stale.id, session, "replacing unfinished capture worker");
        }
        self.stop();

        let stop = Arc::new(AtomicBool::new(false));
        let worker = CaptureWorker {
            session,
            stop: Arc::clone(&stop),
            events: self.events.clone(),
            transcriber: Arc::clone(&self.transcriber),
            settings: self.settings,
            poll: self.poll,
        };
        let open = Arc::clone(&self.open);

        let handle = std::thread::Builder::new()
            .name(format!("capture-{session}"))
            .spawn(move || worker.run(open.as_ref()))
            .map_err(|e| CaptureError::Device(format!("failed to spawn capture thread: {e}")))?;

        self.active = Some(ActiveSession {
            id: session,
            stop,
            handle,
        });

        tracing::debug!(session, "listening session started");
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            active.stop.store(true, Ordering::Release);
            tracing::debug!(session = active.id, "listening session stopped");
        }
    }
}

impl Drop for MicrophoneCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Classify a failure to open the microphone
///
/// Platforms report a refused microphone as an ordinary stream error, so the
/// message is the only signal.
fn open_error(message: &str) -> CaptureError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("permission") || lower.contains("not authorized") {
        CaptureError::PermissionDenied
    } else {
        CaptureError::Device(message.to_string())
    }
}

struct CaptureWorker {
    session: SessionId,
    stop: Arc<AtomicBool>,
    events: CaptureEventSender,
    transcriber: Arc<dyn Transcribe>,
    settings: ListenSettings,
    poll: Duration,
}

impl CaptureWorker {
    fn run(self, open: &OpenSource) {
        let event = match open() {
            Ok(mut source) => self.listen(source.as_mut()),
            Err(e) => self.error(open_error(&e.to_string())),
        };
        // Receiver gone means the session loop has shut down
        let _ = self.events.send(event);
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    fn error(&self, error: CaptureError) -> CaptureEvent {
        tracing::warn!(session = self.session, error = %error, "listening session failed");
        CaptureEvent::Error {
            session: self.session,
            error,
        }
    }

    /// Capture until the utterance completes; returns the terminal event
    fn listen(&self, source: &mut dyn SampleSource) -> CaptureEvent {
        let session = self.session;

        let mut segmenter =
            UtteranceSegmenter::new().with_max_samples(self.settings.max_utterance_samples());
        let started = Instant::now();
        let mut last_interim = Instant::now();

        loop {
            if self.stopped() {
                return CaptureEvent::Ended { session };
            }

            std::thread::sleep(self.poll);

            if let Some(error) = source.take_error() {
                return self.error(CaptureError::Device(error));
            }

            let samples = source.take_samples();
            if !samples.is_empty() && segmenter.process(&samples) {
                break;
            }

            if !segmenter.heard_speech() {
                // Counts polls that delivered nothing, so a stalled stream still times out
                if started.elapsed() > self.settings.no_speech_timeout {
                    return self.error(CaptureError::NoSpeech);
                }
                last_interim = Instant::now();
                continue;
            }

            if let Some(interval) = self.settings.interim_interval
                && last_interim.elapsed() >= interval
            {
                last_interim = Instant::now();
                self.send_interim(segmenter.speech_buffer());
            }
        }

        source.finish();
        let speech = segmenter.take_speech_buffer();

        let transcript = samples_to_wav(&speech, SAMPLE_RATE)
            .and_then(|wav| self.transcriber.transcribe(&wav));

        if self.stopped() {
            return CaptureEvent::Ended { session };
        }

        match transcript {
            Ok(text) if text.is_empty() => self.error(CaptureError::NoSpeech),
            Ok(text) => CaptureEvent::Final {
                session,
                transcript: text,
            },
            Err(e) => self.error(CaptureError::Transcription(e.to_string())),
        }
    }

    /// Transcribe the partial utterance; failures only cost the interim result
    ///
    /// Long utterances upload only their most recent stretch.
    fn send_interim(&self, speech: &[f32]) {
        let recent = &speech[speech.len().saturating_sub(MAX_INTERIM_SAMPLES)..];
        let transcript = samples_to_wav(recent, SAMPLE_RATE)
            .and_then(|wav| self.transcriber.transcribe(&wav));

        match transcript {
            Ok(text) if !text.is_empty() && !self.stopped() => {
                let _ = self.events.send(CaptureEvent::Interim {
                    session: self.session,
                    transcript: text,
                });
            }
            Ok(_) => {}
            Err(e) => tracing::debug!(error = %e, "interim transcription failed"),
        }
    }
}
