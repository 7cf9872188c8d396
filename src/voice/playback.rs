//! Audio playback to speakers

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use crate::{Error, Result};

/// Sample rate for playback (matches common TTS output)
pub const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// How often the playing thread checks for completion or cancellation
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Whether the default host exposes an output device
#[must_use]
pub fn output_available() -> bool {
    cpal::default_host().default_output_device().is_some()
}

/// Plays audio to the default output device
///
/// Not `Send` on every platform: create and drop it on the thread that plays.
pub struct AudioPlayback {
    device: cpal::Device,
    config: StreamConfig,
}

impl AudioPlayback {
    /// Open the default output device at [`PLAYBACK_SAMPLE_RATE`]
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let supports_rate = |c: &cpal::SupportedStreamConfigRange, channels: u16| {
            c.channels() == channels
                && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
        };

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| supports_rate(c, 1))
            .or_else(|| {
                // Fallback: try stereo
                device
                    .supported_output_configs()
                    .ok()?
                    .find(|c| supports_rate(c, 2))
            })
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = PLAYBACK_SAMPLE_RATE,
            channels = config.channels,
            "audio playback initialized"
        );

        Ok(Self { device, config })
    }

    /// Play mono samples, blocking until done or until `cancel` is set
    ///
    /// Returns `Ok(true)` if playback ran to the end and `Ok(false)` if it
    /// was cancelled.
    ///
    /// # Errors
    ///
    /// Returns error if the output stream cannot be built or started
    pub fn play_until(&self, samples: Vec<f32>, cancel: &AtomicBool) -> Result<bool> {
        if samples.is_empty() {
            return Ok(true);
        }

        let channels = usize::from(self.config.channels);
        let sample_count = samples.len();
        let samples = Arc::new(samples);
        let position = Arc::new(AtomicUsize::new(0));

        let stream = {
            let samples = Arc::clone(&samples);
            let position = Arc::clone(&position);
            self.device
                .build_output_stream(
                    &self.config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let mut pos = position.load(Ordering::Relaxed);
                        for frame in data.chunks_mut(channels) {
                            let sample = samples.get(pos).copied().unwrap_or(0.0);
                            frame.fill(sample);
                            if pos < samples.len() {
                                pos += 1;
                            }
                        }
                        position.store(pos, Ordering::Relaxed);
                    },
                    |err| {
                        tracing::error!(error = %err, "audio playback error");
                    },
                    None,
                )
                .map_err(|e| Error::Audio(e.to_string()))?
        };

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        let duration_ms = (sample_count as u64 * 1000) / u64::from(PLAYBACK_SAMPLE_RATE);
        let timeout = Duration::from_millis(duration_ms + 500);
        let start = Instant::now();

        let completed = loop {
            if cancel.load(Ordering::Acquire) {
                break false;
            }
            if position.load(Ordering::Relaxed) >= sample_count || start.elapsed() > timeout {
                // Let the device drain its last buffer
                std::thread::sleep(Duration::from_millis(100));
                break true;
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        drop(stream);
        tracing::debug!(samples = sample_count, completed, "playback finished");

        Ok(completed)
    }

    /// Play MP3 bytes, blocking until done or cancelled
    ///
    /// # Errors
    ///
    /// Returns error if decoding or playback fails
    pub fn play_mp3_until(&self, mp3_data: &[u8], cancel: &AtomicBool) -> Result<bool> {
        let samples = decode_mp3(mp3_data)?;
        self.play_until(samples, cancel)
    }
}

/// Decode MP3 bytes to mono f32 samples
///
/// # Errors
///
/// Returns error if the data is not valid MP3
pub fn decode_mp3(mp3_data: &[u8]) -> Result<Vec<f32>> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if frame.channels == 2 {
                    // Stereo: average channels
                    samples.extend(frame.data.chunks(2).map(|chunk| {
                        let left = f32::from(chunk[0]) / 32768.0;
                        let right = f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                        f32::midpoint(left, right)
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            // ID3 tags and junk between frames
            Err(minimp3::Error::SkippedData) => {}
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    Ok(samples)
}
