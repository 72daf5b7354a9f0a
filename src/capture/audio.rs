//! Microphone audio capture.
//!
//! The capture device sits behind the [`AudioInput`] seam so the
//! coordinator can be driven by a scripted source in tests. The cpal
//! implementation captures at the device's native sample rate and
//! downsamples to the configured target rate in software.

use std::io::Cursor;
use std::time::Duration;

use async_trait::async_trait;
use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::AudioConfig;
use crate::error::{BuddyError, Result};

/// Channel buffer for raw capture chunks.
const CHUNK_CHANNEL_SIZE: usize = 64;

/// Poll interval for the thread holding the cpal stream alive.
const STREAM_POLL: Duration = Duration::from_millis(25);

/// A live capture stream: mono f32 chunks at `sample_rate` until the
/// session's cancellation token fires.
pub struct AudioStreamHandle {
    pub sample_rate: u32,
    pub chunks: mpsc::Receiver<Vec<f32>>,
}

/// An acquirable audio input device.
#[async_trait]
pub trait AudioInput: Send + Sync {
    /// Acquire the device and begin streaming until cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`BuddyError::Device`] when no device is available or the
    /// stream cannot be started; the caller stays idle in that case.
    async fn start(&self, cancel: CancellationToken) -> Result<AudioStreamHandle>;
}

/// System microphone via cpal.
pub struct CpalInput {
    config: AudioConfig,
}

impl CpalInput {
    /// Create a capture instance for the configured device.
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// List available input devices.
    ///
    /// # Errors
    ///
    /// Returns an error if devices cannot be enumerated.
    pub fn list_input_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| BuddyError::Device(format!("cannot enumerate devices: {e}")))?;

        let mut names = Vec::new();
        for device in devices {
            if let Ok(desc) = device.description() {
                names.push(desc.name().to_owned());
            }
        }
        Ok(names)
    }

    fn resolve_device(&self) -> Result<(cpal::Device, StreamConfig)> {
        let host = cpal::default_host();

        let device = if let Some(ref name) = self.config.input_device {
            host.input_devices()
                .map_err(|e| BuddyError::Device(format!("cannot enumerate devices: {e}")))?
                .find(|d| {
                    d.description()
                        .ok()
                        .map(|desc| desc.name() == name)
                        .unwrap_or(false)
                })
                .ok_or_else(|| BuddyError::Device(format!("input device '{name}' not found")))?
        } else {
            host.default_input_device()
                .ok_or_else(|| BuddyError::Device("no default input device".into()))?
        };

        let device_name = device
            .description()
            .map(|d| d.name().to_owned())
            .unwrap_or_else(|_| "<unknown>".into());
        info!("using input device: {device_name}");

        // Use the device's default config for best compatibility.
        let default_config = device
            .default_input_config()
            .map_err(|e| BuddyError::Device(format!("no default input config: {e}")))?;

        let stream_config = StreamConfig {
            channels: default_config.channels(),
            sample_rate: default_config.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };
        Ok((device, stream_config))
    }
}

#[async_trait]
impl AudioInput for CpalInput {
    async fn start(&self, cancel: CancellationToken) -> Result<AudioStreamHandle> {
        let (device, stream_config) = self.resolve_device()?;
        let native_rate = stream_config.sample_rate;
        let native_channels = stream_config.channels;
        let target_rate = self.config.sample_rate;

        if native_rate != target_rate {
            info!("will downsample from {native_rate}Hz to {target_rate}Hz");
        }

        let (tx, rx) = mpsc::channel(CHUNK_CHANNEL_SIZE);
        let (ready_tx, ready_rx) = oneshot::channel::<Result<()>>();

        // cpal streams are not Send; a dedicated thread owns the stream
        // for the lifetime of the session.
        std::thread::spawn(move || {
            let stream = match device.build_input_stream(
                &stream_config,
                move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                    let mono = if native_channels > 1 {
                        to_mono(data, native_channels)
                    } else {
                        data.to_vec()
                    };
                    let samples = if native_rate != target_rate {
                        downsample(&mono, native_rate, target_rate)
                    } else {
                        mono
                    };
                    // try_send keeps the audio callback non-blocking.
                    if tx.try_send(samples).is_err() {
                        debug!("capture channel full, dropping chunk");
                    }
                },
                move |err| {
                    error!("audio input stream error: {err}");
                },
                None,
            ) {
                Ok(s) => s,
                Err(e) => {
                    let _ = ready_tx.send(Err(BuddyError::Device(format!(
                        "failed to build input stream: {e}"
                    ))));
                    return;
                }
            };

            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(BuddyError::Device(format!(
                    "failed to start input stream: {e}"
                ))));
                return;
            }
            let _ = ready_tx.send(Ok(()));

            while !cancel.is_cancelled() {
                std::thread::sleep(STREAM_POLL);
            }
            drop(stream);
            info!("audio capture stopped");
        });

        ready_rx
            .await
            .map_err(|_| BuddyError::Device("capture thread exited".into()))??;

        info!("audio capture started: native {native_rate}Hz -> target {target_rate}Hz");
        Ok(AudioStreamHandle {
            sample_rate: target_rate,
            chunks: rx,
        })
    }
}

/// Convert interleaved multi-channel audio to mono by averaging channels.
fn to_mono(data: &[f32], channels: u16) -> Vec<f32> {
    let ch = channels as usize;
    data.chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

/// Simple linear-interpolation downsampler.
///
/// Sufficient for speech (energy below 8kHz); no anti-alias filter.
fn downsample(samples: &[f32], src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if src_rate == dst_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = src_rate as f64 / dst_rate as f64;
    let out_len = (samples.len() as f64 / ratio) as usize;
    let mut output = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let src_pos = i as f64 * ratio;
        let idx = src_pos as usize;
        let frac = src_pos - idx as f64;

        let sample = if idx + 1 < samples.len() {
            samples[idx] as f64 * (1.0 - frac) + samples[idx + 1] as f64 * frac
        } else {
            samples[idx.min(samples.len() - 1)] as f64
        };

        output.push(sample as f32);
    }

    output
}

/// Encode mono f32 samples as a 16-bit PCM WAV file in memory.
///
/// # Errors
///
/// Returns an error if WAV encoding fails.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| BuddyError::Device(format!("WAV encode failed: {e}")))?;
        for &sample in samples {
            let clamped = sample.clamp(-1.0, 1.0);
            let value = (clamped * f32::from(i16::MAX)) as i16;
            writer
                .write_sample(value)
                .map_err(|e| BuddyError::Device(format!("WAV encode failed: {e}")))?;
        }
        writer
            .finalize()
            .map_err(|e| BuddyError::Device(format!("WAV encode failed: {e}")))?;
    }
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn to_mono_averages_channels() {
        let stereo = [1.0, 0.0, 0.5, 0.5];
        assert_eq!(to_mono(&stereo, 2), vec![0.5, 0.5]);
    }

    #[test]
    fn downsample_halves_length() {
        let samples: Vec<f32> = (0..480).map(|i| i as f32 / 480.0).collect();
        let out = downsample(&samples, 48_000, 16_000);
        assert_eq!(out.len(), 160);
    }

    #[test]
    fn downsample_same_rate_is_identity() {
        let samples = vec![0.1, 0.2, 0.3];
        assert_eq!(downsample(&samples, 16_000, 16_000), samples);
    }

    #[test]
    fn encode_wav_produces_riff_header() {
        let samples = vec![0.0f32; 160];
        let wav = encode_wav(&samples, 16_000).unwrap();
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        // 44-byte header + 2 bytes per sample.
        assert_eq!(wav.len(), 44 + samples.len() * 2);
    }

    #[test]
    fn encode_wav_clamps_out_of_range() {
        let wav = encode_wav(&[2.0, -2.0], 16_000).unwrap();
        assert!(!wav.is_empty());
    }
}
