//! Voice Activity Detection
//!
//! [`VoiceActivity`] classifies one frame as speech or non-speech. [`WebRtcVad`] wraps the
//! WebRTC VAD; [`EnergyVad`] is an RMS threshold used when WebRTC cannot be used
//! (unsupported rates, tests, very quiet rooms).

use crate::audio::AudioConfig;
use crate::error::{VoiceError, VoiceResult};
use crate::frame::AudioFrame;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use webrtc_vad::{SampleRate, Vad, VadMode};

/// Per-frame speech classifier.
pub trait VoiceActivity {
    fn is_speech(&mut self, frame: &AudioFrame) -> VoiceResult<bool>;
}

/// Which classifier to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VadBackend {
    WebRtc,
    Energy,
}

/// Configuration for VAD detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VadConfig {
    #[serde(default = "default_backend")]
    pub backend: VadBackend,

    /// WebRTC detection mode (0-3, where 3 is most aggressive)
    #[serde(default = "default_mode")]
    pub mode: u8,

    /// RMS level above which the energy backend reports speech.
    #[serde(default = "default_energy_threshold")]
    pub energy_threshold: f32,
}

fn default_backend() -> VadBackend {
    VadBackend::WebRtc
}

fn default_mode() -> u8 {
    3
}

fn default_energy_threshold() -> f32 {
    0.02
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            mode: default_mode(),
            energy_threshold: default_energy_threshold(),
        }
    }
}

/// Build the configured classifier for frames described by `audio`.
pub fn create_vad(config: &VadConfig, audio: &AudioConfig) -> VoiceResult<Box<dyn VoiceActivity>> {
    match config.backend {
        VadBackend::WebRtc => Ok(Box::new(WebRtcVad::new(config, audio)?)),
        VadBackend::Energy => Ok(Box::new(EnergyVad::new(config.energy_threshold))),
    }
}

/// Voice Activity Detector using WebRTC VAD. Not `Send`: build it on the thread that uses it.
pub struct WebRtcVad {
    vad: Vad,
    frame_samples: usize,
}

impl WebRtcVad {
    pub fn new(config: &VadConfig, audio: &AudioConfig) -> VoiceResult<Self> {
        info!(
            "🎙️ Initializing WebRTC VAD (sample_rate: {}Hz, mode: {})",
            audio.sample_rate, config.mode
        );

        audio
            .validate()
            .map_err(|e| VoiceError::VadInit(e.to_string()))?;

        let vad_mode = match config.mode {
            0 => VadMode::Quality,
            1 => VadMode::LowBitrate,
            2 => VadMode::Aggressive,
            3 => VadMode::VeryAggressive,
            other => {
                return Err(VoiceError::VadInit(format!(
                    "VAD mode must be 0-3, got {}",
                    other
                )))
            }
        };

        let sample_rate = match audio.sample_rate {
            8000 => SampleRate::Rate8kHz,
            16000 => SampleRate::Rate16kHz,
            32000 => SampleRate::Rate32kHz,
            48000 => SampleRate::Rate48kHz,
            other => return Err(VoiceError::VadInit(format!("Invalid sample rate: {}", other))),
        };

        let mut vad = Vad::new();
        vad.set_mode(vad_mode);
        vad.set_sample_rate(sample_rate);

        let frame_samples = audio.frame_samples();
        info!("✅ VAD initialized (frame: {} samples)", frame_samples);

        Ok(Self { vad, frame_samples })
    }

    pub fn frame_samples(&self) -> usize {
        self.frame_samples
    }
}

impl VoiceActivity for WebRtcVad {
    fn is_speech(&mut self, frame: &AudioFrame) -> VoiceResult<bool> {
        let audio = frame.samples();
        if audio.len() != self.frame_samples {
            return Err(VoiceError::VadProcessing(format!(
                "Expected {} samples, got {}",
                self.frame_samples,
                audio.len()
            )));
        }

        let audio_i16: Vec<i16> = audio
            .iter()
            .map(|&sample| (sample.clamp(-1.0, 1.0) * 32767.0) as i16)
            .collect();

        let is_speech = self
            .vad
            .is_voice_segment(&audio_i16)
            .map_err(|e| VoiceError::VadProcessing(format!("VAD processing failed: {:?}", e)))?;

        debug!("VAD result: {}", if is_speech { "SPEECH" } else { "SILENCE" });
        Ok(is_speech)
    }
}

/// RMS energy gate.
#[derive(Debug, Clone)]
pub struct EnergyVad {
    threshold: f32,
}

impl EnergyVad {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl VoiceActivity for EnergyVad {
    fn is_speech(&mut self, frame: &AudioFrame) -> VoiceResult<bool> {
        Ok(rms(frame.samples()) > self.threshold)
    }
}

fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vad_initialization() {
        let vad = WebRtcVad::new(&VadConfig::default(), &AudioConfig::default());
        assert!(vad.is_ok());
        assert_eq!(vad.unwrap().frame_samples(), 480); // 30ms at 16kHz
    }

    #[test]
    fn test_invalid_sample_rate() {
        let audio = AudioConfig {
            sample_rate: 44100,
            ..Default::default()
        };
        assert!(WebRtcVad::new(&VadConfig::default(), &audio).is_err());
    }

    #[test]
    fn test_invalid_mode() {
        let config = VadConfig {
            mode: 7,
            ..Default::default()
        };
        assert!(WebRtcVad::new(&config, &AudioConfig::default()).is_err());
    }

    #[test]
    fn test_frame_size_validation() {
        let mut vad = WebRtcVad::new(&VadConfig::default(), &AudioConfig::default()).unwrap();
        let wrong = AudioFrame::new(vec![0.0; 100], 16000);
        assert!(vad.is_speech(&wrong).is_err());
    }

    #[test]
    fn test_silence_detection() {
        let mut vad = WebRtcVad::new(&VadConfig::default(), &AudioConfig::default()).unwrap();
        let silence = AudioFrame::new(vec![0.0; 480], 16000);
        assert!(!vad.is_speech(&silence).unwrap());
    }

    #[test]
    fn energy_gate() {
        let mut vad = EnergyVad::new(0.02);
        assert!(!vad.is_speech(&AudioFrame::new(vec![0.0; 480], 16000)).unwrap());
        assert!(vad.is_speech(&AudioFrame::new(vec![0.5; 480], 16000)).unwrap());
    }

    #[test]
    fn factory_respects_backend() {
        let config = VadConfig {
            backend: VadBackend::Energy,
            ..Default::default()
        };
        let mut vad = create_vad(&config, &AudioConfig::default()).unwrap();
        assert!(vad.is_speech(&AudioFrame::new(vec![0.3; 480], 16000)).unwrap());
    }
}
