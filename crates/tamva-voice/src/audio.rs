//! Microphone capture using CPAL
//!
//! [`MicrophoneSource`] is a scoped device handle: the input stream lives exactly as long
//! as the source, so the device is released on every exit path, including errors and
//! unwinding. Samples are re-chunked into fixed-duration [`AudioFrame`]s for the VAD.
//!
//! The hand-off to the reader is bounded by `max_buffered_ms`. While nobody reads (speech
//! playback, a chat session) the queue fills and newer frames are dropped, so memory stays
//! flat; readers call `discard_pending` before listening again.

use crate::error::{VoiceError, VoiceResult};
use crate::frame::{AudioFrame, FrameSource};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Audio input configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Sample rate in Hz (default: 16000). Must be a rate WebRTC VAD accepts.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Frame duration in milliseconds (default: 30). WebRTC VAD accepts 10, 20 or 30.
    #[serde(default = "default_frame_ms")]
    pub frame_ms: u32,

    /// Input device name; `None` uses the host default.
    #[serde(default)]
    pub device: Option<String>,

    /// Audio held for a reader that is busy elsewhere (default: 10000ms).
    #[serde(default = "default_max_buffered_ms")]
    pub max_buffered_ms: u32,
}

fn default_sample_rate() -> u32 {
    16000
}

fn default_frame_ms() -> u32 {
    30
}

fn default_max_buffered_ms() -> u32 {
    10_000
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            frame_ms: default_frame_ms(),
            device: None,
            max_buffered_ms: default_max_buffered_ms(),
        }
    }
}

impl AudioConfig {
    /// Samples per frame (480 for 30ms at 16kHz).
    pub fn frame_samples(&self) -> usize {
        (self.sample_rate as usize * self.frame_ms as usize) / 1000
    }

    /// Frames the microphone queue holds before dropping new ones. At least one.
    pub fn queue_capacity(&self) -> usize {
        (self.max_buffered_ms / self.frame_ms.max(1)).max(1) as usize
    }

    pub fn validate(&self) -> VoiceResult<()> {
        if !matches!(self.sample_rate, 8000 | 16000 | 32000 | 48000) {
            return Err(VoiceError::Config(format!(
                "sample rate must be 8000, 16000, 32000 or 48000 Hz, got {}",
                self.sample_rate
            )));
        }
        if !matches!(self.frame_ms, 10 | 20 | 30) {
            return Err(VoiceError::Config(format!(
                "frame duration must be 10, 20 or 30 ms, got {}",
                self.frame_ms
            )));
        }
        Ok(())
    }
}

/// Live microphone stream. Drop to release the input device.
///
/// `next_frame` blocks the calling thread; do not call it from inside an async task.
pub struct MicrophoneSource {
    _stream: Stream,
    frame_rx: mpsc::Receiver<AudioFrame>,
    overflow: Arc<AtomicUsize>,
}

/// Re-chunks callback buffers into fixed frames and queues them without blocking.
struct FrameChunker {
    pending: Vec<f32>,
    frame_samples: usize,
    sample_rate: u32,
    tx: mpsc::Sender<AudioFrame>,
    overflow: Arc<AtomicUsize>,
}

impl FrameChunker {
    fn new(frame_samples: usize, sample_rate: u32, tx: mpsc::Sender<AudioFrame>) -> Self {
        Self {
            pending: Vec::with_capacity(frame_samples),
            frame_samples,
            sample_rate,
            tx,
            overflow: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn push(&mut self, data: &[f32]) {
        for &sample in data {
            self.pending.push(sample);
            if self.pending.len() < self.frame_samples {
                continue;
            }
            let samples = std::mem::replace(&mut self.pending, Vec::with_capacity(self.frame_samples));
            match self.tx.try_send(AudioFrame::new(samples, self.sample_rate)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    self.overflow.fetch_add(1, Ordering::Relaxed);
                }
                // Receiver gone means the source was dropped; nothing to do.
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
    }
}

impl MicrophoneSource {
    /// Open the configured input device and start streaming frames.
    pub fn open(config: &AudioConfig) -> VoiceResult<Self> {
        config.validate()?;
        info!(
            "🎤 Opening microphone ({}Hz, {}ms frames)",
            config.sample_rate, config.frame_ms
        );

        let device = select_input_device(config.device.as_deref())?;
        info!(
            "📱 Using input device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        let default_config = device.default_input_config()?;
        debug!("🔧 Default input config: {:?}", default_config);

        let frame_samples = config.frame_samples();
        let stream_config = StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(frame_samples as u32),
        };

        let (frame_tx, frame_rx) = mpsc::channel(config.queue_capacity());
        let mut chunker = FrameChunker::new(frame_samples, config.sample_rate, frame_tx);
        let overflow = Arc::clone(&chunker.overflow);

        let stream = device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| chunker.push(data),
            move |err| {
                warn!("Audio stream error: {}", err);
            },
            None,
        )?;

        stream.play()?;
        info!("✅ Microphone streaming");

        Ok(Self {
            _stream: stream,
            frame_rx,
            overflow,
        })
    }

    /// List available input devices
    pub fn list_input_devices() -> VoiceResult<Vec<String>> {
        let host = cpal::default_host();
        let devices = host.input_devices()?;

        let mut device_names = Vec::new();
        for device in devices {
            if let Ok(name) = device.name() {
                device_names.push(name);
            }
        }

        Ok(device_names)
    }
}

impl FrameSource for MicrophoneSource {
    fn next_frame(&mut self) -> VoiceResult<Option<AudioFrame>> {
        Ok(self.frame_rx.blocking_recv())
    }

    fn discard_pending(&mut self) {
        let mut dropped = 0usize;
        while self.frame_rx.try_recv().is_ok() {
            dropped += 1;
        }
        let overflowed = self.overflow.swap(0, Ordering::Relaxed);
        if dropped > 0 || overflowed > 0 {
            debug!(
                "Discarded {} buffered frames ({} dropped on a full queue)",
                dropped, overflowed
            );
        }
    }
}

impl Drop for MicrophoneSource {
    fn drop(&mut self) {
        debug!("🎤 Releasing microphone");
    }
}

fn select_input_device(name: Option<&str>) -> VoiceResult<Device> {
    let host = cpal::default_host();
    if let Some(wanted) = name {
        let devices = host.input_devices()?;
        for device in devices {
            if device.name().map(|n| n == wanted).unwrap_or(false) {
                return Ok(device);
            }
        }
        return Err(VoiceError::AudioDevice(format!(
            "input device '{}' not found",
            wanted
        )));
    }
    host.default_input_device()
        .ok_or_else(|| VoiceError::AudioDevice("No input device available".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_config_defaults() {
        let config = AudioConfig::default();
        assert_eq!(config.sample_rate, 16000);
        assert_eq!(config.frame_ms, 30);
        assert_eq!(config.frame_samples(), 480);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_unsupported_rate_and_frame() {
        let config = AudioConfig {
            sample_rate: 44100,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = AudioConfig {
            frame_ms: 25,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn queue_capacity_covers_the_buffered_window() {
        let config = AudioConfig::default();
        assert_eq!(config.queue_capacity(), 333);
        let tiny = AudioConfig {
            max_buffered_ms: 0,
            ..Default::default()
        };
        assert_eq!(tiny.queue_capacity(), 1);
    }

    #[test]
    fn chunker_drops_frames_once_the_queue_is_full() {
        let (tx, mut rx) = mpsc::channel(2);
        let mut chunker = FrameChunker::new(4, 16000, tx);

        // Five frames' worth, split across uneven callback buffers.
        chunker.push(&[0.1; 7]);
        chunker.push(&[0.2; 13]);

        assert_eq!(chunker.overflow.load(Ordering::Relaxed), 3);
        assert_eq!(chunker.pending.len(), 0);
        let first = rx.try_recv().expect("queued frame");
        assert_eq!(first.samples().len(), 4);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());

        // Reading made room again.
        chunker.push(&[0.3; 4]);
        assert_eq!(rx.try_recv().map(|f| f.samples()[0]).ok(), Some(0.3));
    }

    #[test]
    fn test_list_devices() {
        // This might fail in CI environments without audio devices
        let result = MicrophoneSource::list_input_devices();
        if let Ok(devices) = result {
            println!("Available input devices: {:?}", devices);
        }
    }
}
