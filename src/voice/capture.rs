//! Microphone input stream
//!
//! Wraps a cpal input stream that appends mono samples to a shared buffer.
//! Stream errors raised on the audio thread are parked and picked up by the
//! listening worker on its next poll.

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig, SupportedStreamConfigRange};

use crate::{Error, Result};

/// Capture sample rate; what Whisper-style transcription expects
pub const SAMPLE_RATE: u32 = 16000;

/// Samples kept while nobody drains the buffer (60 seconds)
const MAX_BUFFERED_SAMPLES: usize = SAMPLE_RATE as usize * 60;

/// Whether the default host exposes an input device
#[must_use]
pub fn input_available() -> bool {
    cpal::default_host().default_input_device().is_some()
}

#[derive(Default)]
struct Shared {
    samples: Vec<f32>,
    error: Option<String>,
}

/// Mono 16 kHz recording from the default input device
///
/// Not `Send` on every platform: create and drop it on the thread that uses it.
pub struct AudioCapture {
    device: cpal::Device,
    config: StreamConfig,
    shared: Arc<Mutex<Shared>>,
    stream: Option<Stream>,
}

impl AudioCapture {
    /// Open the default input device
    ///
    /// Prefers a mono configuration; multi-channel input is downmixed.
    ///
    /// # Errors
    ///
    /// Returns error if there is no input device or it cannot record at
    /// [`SAMPLE_RATE`]
    pub fn new() -> Result<Self> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

        let ranges: Vec<SupportedStreamConfigRange> = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(format!("cannot query input device: {e}")))?
            .filter(|c| {
                c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
            })
            .collect();

        let range = ranges
            .iter()
            .find(|c| c.channels() == 1)
            .or_else(|| ranges.iter().min_by_key(|c| c.channels()))
            .cloned()
            .ok_or_else(|| {
                Error::Audio(format!("input device cannot record at {SAMPLE_RATE} Hz"))
            })?;

        let config = range.with_sample_rate(SampleRate(SAMPLE_RATE)).config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            channels = config.channels,
            "microphone opened"
        );

        Ok(Self {
            device,
            config,
            shared: Arc::default(),
            stream: None,
        })
    }

    /// Start recording; a no-op if already recording
    ///
    /// # Errors
    ///
    /// Returns error if the stream cannot be built or started
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let channels = usize::from(self.config.channels).max(1);
        let on_data = Arc::clone(&self.shared);
        let on_error = Arc::clone(&self.shared);

        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let Ok(mut shared) = on_data.lock() else {
                        return;
                    };
                    if channels == 1 {
                        shared.samples.extend_from_slice(data);
                    } else {
                        #[allow(clippy::cast_precision_loss)]
                        shared.samples.extend(
                            data.chunks(channels)
                                .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32),
                        );
                    }
                    let excess = shared.samples.len().saturating_sub(MAX_BUFFERED_SAMPLES);
                    if excess > 0 {
                        shared.samples.drain(..excess);
                    }
                },
                move |err| {
                    tracing::error!(error = %err, "microphone stream error");
                    if let Ok(mut shared) = on_error.lock() {
                        shared.error = Some(err.to_string());
                    }
                },
                None,
            )
            .map_err(|e| Error::Audio(format!("cannot open microphone stream: {e}")))?;

        stream
            .play()
            .map_err(|e| Error::Audio(format!("cannot start microphone stream: {e}")))?;
        self.stream = Some(stream);

        tracing::debug!("microphone recording");
        Ok(())
    }

    /// Stop recording; buffered samples are kept
    pub fn stop(&mut self) {
        if self.stream.take().is_some() {
            tracing::debug!("microphone stopped");
        }
    }

    /// Take the samples recorded since the last call
    #[must_use]
    pub fn take_buffer(&self) -> Vec<f32> {
        self.shared
            .lock()
            .map(|mut shared| std::mem::take(&mut shared.samples))
            .unwrap_or_default()
    }

    /// Take the stream error reported since the last call, if any
    #[must_use]
    pub fn take_error(&self) -> Option<String> {
        self.shared
            .lock()
            .ok()
            .and_then(|mut shared| shared.error.take())
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Encode mono samples as 16-bit PCM WAV, the upload format for transcription
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let audio_error = |e: hound::Error| Error::Audio(format!("WAV encoding failed: {e}"));
    let mut cursor = std::io::Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(audio_error)?;

    for &sample in samples {
        #[allow(clippy::cast_possible_truncation)]
        let pcm = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
        writer.write_sample(pcm).map_err(audio_error)?;
    }
    writer.finalize().map_err(audio_error)?;

    Ok(cursor.into_inner())
}
