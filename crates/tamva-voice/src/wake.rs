//! Wake phrase detection.
//!
//! [`PhraseWakeDetector`] listens for a configurable phrase (default: "hey tam va") by
//! endpointing short utterances with the VAD, transcribing them, and matching the
//! normalized transcript. The cancellation signal is checked on every frame, so a
//! pending wait ends within one frame duration of shutdown.

use crate::cancel::CancellationSignal;
use crate::capture::CaptureMachine;
use crate::error::VoiceResult;
use crate::frame::{FrameSource, Utterance};
use crate::stt::SttBackend;
use crate::vad::VoiceActivity;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for wake detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WakeConfig {
    /// The wake phrase to listen for (case and punctuation insensitive).
    #[serde(default = "default_wake_phrase")]
    pub phrase: String,

    /// When false, every turn starts listening immediately (no wake phrase).
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Silence that ends a wake-phrase candidate, in milliseconds.
    #[serde(default = "default_gap_ms")]
    pub gap_ms: u32,

    /// Longest candidate sent to STT; longer speech is cut and checked.
    #[serde(default = "default_max_window_ms")]
    pub max_window_ms: u32,
}

fn default_wake_phrase() -> String {
    "hey tam va".to_string()
}

fn default_enabled() -> bool {
    true
}

fn default_gap_ms() -> u32 {
    400
}

fn default_max_window_ms() -> u32 {
    3000
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            phrase: default_wake_phrase(),
            enabled: default_enabled(),
            gap_ms: default_gap_ms(),
            max_window_ms: default_max_window_ms(),
        }
    }
}

// ---------------------------------------------------------------------------
// Phrase matching
// ---------------------------------------------------------------------------

/// Check if a transcript contains the wake phrase.
///
/// Both sides are normalized (lowercase, punctuation to spaces, whitespace collapsed)
/// so "Hey, TAM-VA!" matches "hey tam va".
pub fn matches_wake_phrase(transcript: &str, phrase: &str) -> bool {
    let phrase = normalize_text(phrase);
    if phrase.is_empty() {
        return false;
    }
    let transcript = normalize_text(transcript);
    format!(" {} ", transcript).contains(&format!(" {} ", phrase))
}

fn normalize_text(text: &str) -> String {
    let spaced: String = text
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    spaced
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// Detectors
// ---------------------------------------------------------------------------

/// Blocks until the user asks for attention.
pub trait WakeDetector {
    /// Wait for the trigger. Returns `Ok(false)` when cancelled or the stream ended.
    fn wait_for_trigger(
        &mut self,
        frames: &mut dyn FrameSource,
        cancel: &CancellationSignal,
    ) -> VoiceResult<bool>;
}

/// VAD + STT phrase spotter.
pub struct PhraseWakeDetector {
    phrase: String,
    vad: Box<dyn VoiceActivity>,
    stt: Arc<dyn SttBackend>,
    silence_threshold: usize,
    max_frames: usize,
}

impl PhraseWakeDetector {
    pub fn new(
        config: &WakeConfig,
        frame_ms: u32,
        vad: Box<dyn VoiceActivity>,
        stt: Arc<dyn SttBackend>,
    ) -> Self {
        let frame_ms = frame_ms.max(1);
        Self {
            phrase: config.phrase.clone(),
            vad,
            stt,
            silence_threshold: (config.gap_ms / frame_ms) as usize,
            max_frames: (config.max_window_ms / frame_ms).max(1) as usize,
        }
    }

    fn heard_phrase(&self, utterance: Utterance) -> bool {
        match self.stt.transcribe(&utterance) {
            Ok(transcript) => {
                debug!("Wake candidate: '{}'", transcript);
                matches_wake_phrase(&transcript, &self.phrase)
            }
            Err(e) => {
                warn!("Wake candidate transcription failed: {}", e);
                false
            }
        }
    }
}

impl WakeDetector for PhraseWakeDetector {
    fn wait_for_trigger(
        &mut self,
        frames: &mut dyn FrameSource,
        cancel: &CancellationSignal,
    ) -> VoiceResult<bool> {
        info!("Listening for wake phrase '{}'", self.phrase);
        let mut machine = CaptureMachine::new(self.silence_threshold);

        loop {
            if cancel.is_cancelled() {
                return Ok(false);
            }
            let Some(frame) = frames.next_frame()? else {
                return Ok(false);
            };
            let is_speech = self.vad.is_speech(&frame)?;
            let candidate = match machine.push(frame, is_speech) {
                Some(done) => Some(done),
                None if machine.buffered_frames() >= self.max_frames => machine.finish(),
                None => None,
            };
            if let Some(done) = candidate {
                if self.heard_phrase(Utterance::new(done)) {
                    info!("Wake phrase detected");
                    return Ok(true);
                }
            }
        }
    }
}

/// Always-listening mode: triggers immediately unless cancelled.
#[derive(Debug, Default)]
pub struct ContinuousWake;

impl WakeDetector for ContinuousWake {
    fn wait_for_trigger(
        &mut self,
        _frames: &mut dyn FrameSource,
        cancel: &CancellationSignal,
    ) -> VoiceResult<bool> {
        Ok(!cancel.is_cancelled())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{AudioFrame, ReplaySource};
    use crate::stt::PlaceholderStt;
    use crate::vad::EnergyVad;

    fn frames(pattern: &[bool]) -> ReplaySource {
        ReplaySource::new(
            pattern
                .iter()
                .map(|&loud| AudioFrame::new(vec![if loud { 0.5 } else { 0.0 }; 480], 16000)),
        )
    }

    fn detector(transcript: &str) -> PhraseWakeDetector {
        let config = WakeConfig {
            gap_ms: 60,
            ..Default::default()
        };
        PhraseWakeDetector::new(
            &config,
            30,
            Box::new(EnergyVad::new(0.02)),
            Arc::new(PlaceholderStt::with_response(transcript)),
        )
    }

    #[test]
    fn phrase_matching_is_normalized() {
        assert!(matches_wake_phrase("Hey, TAM-VA!", "hey tam va"));
        assert!(matches_wake_phrase("ok so hey tam va open notepad", "hey tam va"));
        assert!(!matches_wake_phrase("hey tamara", "hey tam va"));
        assert!(!matches_wake_phrase("", "hey tam va"));
        assert!(!matches_wake_phrase("anything", "  "));
    }

    #[test]
    fn triggers_on_matching_transcript() {
        let mut source = frames(&[false, true, true, false, false, false, false]);
        let mut wake = detector("Hey Tam Va");
        let cancel = CancellationSignal::new();
        assert!(wake.wait_for_trigger(&mut source, &cancel).unwrap());
        // Endpoint fires on the third silent frame; the last frame stays unread.
        assert_eq!(source.remaining(), 1);
    }

    #[test]
    fn ignores_other_speech_until_stream_ends() {
        let mut source = frames(&[true, false, false, false, true, false, false, false]);
        let mut wake = detector("what time is it");
        let cancel = CancellationSignal::new();
        assert!(!wake.wait_for_trigger(&mut source, &cancel).unwrap());
        assert_eq!(source.remaining(), 0);
    }

    #[test]
    fn cancelled_wait_returns_without_reading() {
        let mut source = frames(&[true, true, false, false, false]);
        let mut wake = detector("hey tam va");
        let cancel = CancellationSignal::new();
        cancel.cancel();
        assert!(!wake.wait_for_trigger(&mut source, &cancel).unwrap());
        assert_eq!(source.remaining(), 5);
    }

    #[test]
    fn continuous_mode_respects_cancel() {
        let mut source = frames(&[]);
        let cancel = CancellationSignal::new();
        assert!(ContinuousWake.wait_for_trigger(&mut source, &cancel).unwrap());
        cancel.cancel();
        assert!(!ContinuousWake.wait_for_trigger(&mut source, &cancel).unwrap());
    }
}
