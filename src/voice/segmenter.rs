//! Utterance segmentation
//!
//! Splits a microphone stream into one spoken question using RMS energy:
//! the utterance starts at the first loud chunk and is complete after enough
//! speech followed by a stretch of silence, or once it reaches the length
//! cap so steady background noise cannot hold a session open.

use super::SAMPLE_RATE;

/// Minimum audio energy threshold to consider speech
const ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum amount of speech for a complete utterance (0.3 seconds)
const MIN_SPEECH_SAMPLES: usize = SAMPLE_RATE as usize * 3 / 10;

/// Trailing silence that ends an utterance (1.2 seconds)
const END_SILENCE_SAMPLES: usize = SAMPLE_RATE as usize * 6 / 5;

/// Default length cap of one utterance (30 seconds)
pub const MAX_UTTERANCE_SAMPLES: usize = SAMPLE_RATE as usize * 30;

/// State of the segmenter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmenterState {
    /// Waiting for the first loud chunk
    Waiting,
    /// Speech detected, accumulating the utterance
    Speaking,
    /// Utterance finished; take the buffer
    Complete,
}

/// Accumulates one utterance from a stream of sample chunks
pub struct UtteranceSegmenter {
    state: SegmenterState,
    speech_buffer: Vec<f32>,
    silence_counter: usize,
    threshold: f32,
    max_samples: usize,
}

impl Default for UtteranceSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

impl UtteranceSegmenter {
    #[must_use]
    pub const fn new() -> Self {
        Self::with_threshold(ENERGY_THRESHOLD)
    }

    /// Segmenter with a custom speech energy threshold
    #[must_use]
    pub const fn with_threshold(threshold: f32) -> Self {
        Self {
            state: SegmenterState::Waiting,
            speech_buffer: Vec::new(),
            silence_counter: 0,
            threshold,
            max_samples: MAX_UTTERANCE_SAMPLES,
        }
    }

    /// Complete the utterance once it holds `max_samples`, silence or not
    #[must_use]
    pub fn with_max_samples(mut self, max_samples: usize) -> Self {
        self.max_samples = max_samples;
        self
    }

    /// Feed a chunk of samples
    ///
    /// Returns true once the utterance is complete. Chunks fed after that are
    /// ignored until [`reset`](Self::reset).
    pub fn process(&mut self, samples: &[f32]) -> bool {
        let energy = calculate_energy(samples);
        let is_speech = energy > self.threshold;

        match self.state {
            SegmenterState::Waiting => {
                if is_speech {
                    self.state = SegmenterState::Speaking;
                    self.speech_buffer.clear();
                    self.speech_buffer.extend_from_slice(samples);
                    self.silence_counter = 0;
                    tracing::trace!(energy, "speech started");
                }
            }
            SegmenterState::Speaking => {
                self.speech_buffer.extend_from_slice(samples);

                if is_speech {
                    self.silence_counter = 0;
                } else {
                    self.silence_counter += samples.len();
                }

                tracing::trace!(
                    buffer_len = self.speech_buffer.len(),
                    silence = self.silence_counter,
                    is_speech,
                    energy,
                    "speaking state"
                );

                if self.speech_buffer.len() >= self.max_samples {
                    tracing::debug!(
                        samples = self.speech_buffer.len(),
                        "utterance hit length cap"
                    );
                    self.speech_buffer.truncate(self.max_samples);
                    self.state = SegmenterState::Complete;
                } else if self.silence_counter > END_SILENCE_SAMPLES {
                    if self.speech_samples() > MIN_SPEECH_SAMPLES {
                        tracing::debug!(
                            samples = self.speech_buffer.len(),
                            "utterance complete"
                        );
                        self.state = SegmenterState::Complete;
                    } else {
                        // A click or cough, not a question
                        tracing::trace!("speech too short - resetting");
                        self.reset();
                    }
                }
            }
            SegmenterState::Complete => {}
        }

        self.state == SegmenterState::Complete
    }

    /// Samples accumulated so far, trailing silence included
    #[must_use]
    pub fn speech_buffer(&self) -> &[f32] {
        &self.speech_buffer
    }

    /// Take the accumulated utterance and start over
    pub fn take_speech_buffer(&mut self) -> Vec<f32> {
        let buffer = std::mem::take(&mut self.speech_buffer);
        self.reset();
        buffer
    }

    /// Whether any speech has been heard since the last reset
    #[must_use]
    pub fn heard_speech(&self) -> bool {
        self.state != SegmenterState::Waiting
    }

    /// Reset to the waiting state
    pub fn reset(&mut self) {
        self.state = SegmenterState::Waiting;
        self.speech_buffer.clear();
        self.silence_counter = 0;
    }

    #[must_use]
    pub const fn state(&self) -> SegmenterState {
        self.state
    }

    fn speech_samples(&self) -> usize {
        self.speech_buffer.len().saturating_sub(self.silence_counter)
    }
}

/// Calculate RMS energy of audio samples
#[allow(clippy::cast_precision_loss)]
fn calculate_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
