//! # TAM-VA Voice
//!
//! Blocking voice I/O for the TAM-VA command loop: microphone frames, voice-activity
//! endpointing, wake phrase spotting, transcription and speech output.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────────┐   ┌──────────────┐
//! │  Microphone  │ → │  WebRTC VAD  │ → │ UtteranceCapture │ → │  SttBackend  │
//! │    (cpal)    │   │  per frame   │   │ (1s trailing gap)│   │ (HTTP/whisper)│
//! └──────────────┘   └──────────────┘   └──────────────────┘   └──────────────┘
//!                                                                      ↓
//!                    ┌──────────────┐   ┌──────────────────┐
//!                    │   Speaker    │ ← │    TtsBackend    │ ← response text
//!                    │   (rodio)    │   │ primary/feedback │
//!                    └──────────────┘   └──────────────────┘
//! ```
//!
//! Every type here blocks the calling thread. Run it on a dedicated worker thread and
//! observe a [`CancellationSignal`] for shutdown.

pub mod audio;
pub mod cancel;
pub mod capture;
pub mod error;
pub mod frame;
pub mod stt;
pub mod vad;
pub mod voice_output;
pub mod wake;

pub use audio::{AudioConfig, MicrophoneSource};
pub use cancel::CancellationSignal;
pub use capture::{CaptureConfig, CaptureMachine, CaptureState, UtteranceCapture};
pub use error::{VoiceError, VoiceResult};
pub use frame::{AudioFrame, FrameSource, ReplaySource, Utterance};
pub use stt::{create_best_stt, HttpStt, PlaceholderStt, SttBackend, SttConfig};
#[cfg(feature = "whisper")]
pub use stt::WhisperStt;
pub use vad::{create_vad, EnergyVad, VadBackend, VadConfig, VoiceActivity, WebRtcVad};
pub use voice_output::{
    create_tts, AudioSink, DualVoice, HttpTts, PlaceholderTts, Speaker, TtsBackend, TtsConfig,
    VoiceBackendConfig, VoiceOutput,
};
pub use wake::{matches_wake_phrase, ContinuousWake, PhraseWakeDetector, WakeConfig, WakeDetector};
