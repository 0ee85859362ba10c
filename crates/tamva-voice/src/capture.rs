//! Utterance capture: VAD-gated endpointing of a continuous frame stream.
//!
//! [`CaptureMachine`] is the pure state machine (Idle → Speaking ⇄ TrailingSilence → flush).
//! [`UtteranceCapture`] drives it from a [`FrameSource`] and applies the minimum-duration rule.
//!
//! Endpoint: the utterance ends when the consecutive silence count exceeds the threshold
//! (`round(trailing_silence_ms / frame_ms)`). The frame that pushes the count over the
//! threshold marks the endpoint and is not part of the utterance, so a completed utterance
//! holds every frame from the first speech frame through the threshold-th silence frame.

use crate::cancel::CancellationSignal;
use crate::error::VoiceResult;
use crate::frame::{AudioFrame, FrameSource, Utterance};
use crate::vad::VoiceActivity;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Configuration for endpointing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Trailing silence that ends an utterance (default: 1000ms)
    #[serde(default = "default_trailing_silence_ms")]
    pub trailing_silence_ms: u32,

    /// Utterances shorter than this are dropped as "no command" (default: 500ms)
    #[serde(default = "default_min_utterance_ms")]
    pub min_utterance_ms: u32,
}

fn default_trailing_silence_ms() -> u32 {
    1000
}

fn default_min_utterance_ms() -> u32 {
    500
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            trailing_silence_ms: default_trailing_silence_ms(),
            min_utterance_ms: default_min_utterance_ms(),
        }
    }
}

impl CaptureConfig {
    /// Consecutive silent frames tolerated before the endpoint fires.
    pub fn silence_threshold_frames(&self, frame_ms: u32) -> usize {
        if frame_ms == 0 {
            return 0;
        }
        ((self.trailing_silence_ms + frame_ms / 2) / frame_ms) as usize
    }

    pub fn min_utterance(&self) -> Duration {
        Duration::from_millis(self.min_utterance_ms as u64)
    }
}

/// State of the endpointing machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Speaking,
    TrailingSilence,
}

/// Frame-by-frame endpointing state machine. Owned by one capture loop, never shared.
#[derive(Debug)]
pub struct CaptureMachine {
    state: CaptureState,
    silence_threshold: usize,
    silent_frames: usize,
    buffer: Vec<AudioFrame>,
}

impl CaptureMachine {
    pub fn new(silence_threshold: usize) -> Self {
        Self {
            state: CaptureState::Idle,
            silence_threshold,
            silent_frames: 0,
            buffer: Vec::new(),
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn buffered_frames(&self) -> usize {
        self.buffer.len()
    }

    /// Feed one classified frame. Returns the completed frame list when the endpoint fires.
    pub fn push(&mut self, frame: AudioFrame, is_speech: bool) -> Option<Vec<AudioFrame>> {
        match (self.state, is_speech) {
            (CaptureState::Idle, true) => {
                debug!("🎤 Speech started");
                self.state = CaptureState::Speaking;
                self.silent_frames = 0;
                self.buffer.clear();
                self.buffer.push(frame);
            }

            (CaptureState::Idle, false) => {}

            (CaptureState::Speaking, true) | (CaptureState::TrailingSilence, true) => {
                self.state = CaptureState::Speaking;
                self.silent_frames = 0;
                self.buffer.push(frame);
            }

            (CaptureState::Speaking, false) | (CaptureState::TrailingSilence, false) => {
                self.silent_frames += 1;
                if self.silent_frames > self.silence_threshold {
                    debug!("🤫 Trailing silence reached after {} frames", self.buffer.len());
                    return self.take();
                }
                self.state = CaptureState::TrailingSilence;
                self.buffer.push(frame);
            }
        }
        None
    }

    /// Flush whatever speech is buffered (stream ended, or a caller-imposed ceiling).
    pub fn finish(&mut self) -> Option<Vec<AudioFrame>> {
        if self.state == CaptureState::Idle {
            return None;
        }
        self.take()
    }

    fn take(&mut self) -> Option<Vec<AudioFrame>> {
        self.state = CaptureState::Idle;
        self.silent_frames = 0;
        Some(std::mem::take(&mut self.buffer))
    }
}

/// Blocking capture of one utterance from a frame stream.
pub struct UtteranceCapture {
    config: CaptureConfig,
    frame_ms: u32,
    vad: Box<dyn VoiceActivity>,
    stream_ended: bool,
}

impl UtteranceCapture {
    pub fn new(config: CaptureConfig, frame_ms: u32, vad: Box<dyn VoiceActivity>) -> Self {
        Self {
            config,
            frame_ms,
            vad,
            stream_ended: false,
        }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// True when the last `capture` call returned because the frame stream ended.
    pub fn stream_ended(&self) -> bool {
        self.stream_ended
    }

    /// Block until an utterance is endpointed or the stream ends.
    ///
    /// `Ok(None)` is the "no command" outcome: no speech at all, or speech shorter than
    /// the minimum duration. There is no time ceiling here besides the silence endpoint.
    pub fn capture(&mut self, frames: &mut dyn FrameSource) -> VoiceResult<Option<Utterance>> {
        self.capture_within(frames, &CancellationSignal::new(), None)
    }

    /// Like [`capture`](Self::capture), with two ways out for the caller.
    ///
    /// `cancel` is checked before every frame; once set, buffered audio is discarded and
    /// `Ok(None)` returned. `idle_limit` bounds how long the capture waits for speech to
    /// start. It does not apply once speech has begun.
    pub fn capture_within(
        &mut self,
        frames: &mut dyn FrameSource,
        cancel: &CancellationSignal,
        idle_limit: Option<Duration>,
    ) -> VoiceResult<Option<Utterance>> {
        let mut machine = CaptureMachine::new(self.config.silence_threshold_frames(self.frame_ms));
        let mut idle = Duration::ZERO;
        self.stream_ended = false;

        loop {
            if cancel.is_cancelled() {
                debug!("Capture cancelled");
                return Ok(None);
            }
            let Some(frame) = frames.next_frame()? else {
                debug!("Frame stream ended during capture");
                self.stream_ended = true;
                return Ok(machine.finish().and_then(|f| self.finalize(f)));
            };
            let is_speech = self.vad.is_speech(&frame)?;
            if machine.state() == CaptureState::Idle && !is_speech {
                idle += frame.duration();
                if idle_limit.is_some_and(|limit| idle >= limit) {
                    debug!("No speech within {:?}", idle);
                    return Ok(None);
                }
            }
            if let Some(done) = machine.push(frame, is_speech) {
                return Ok(self.finalize(done));
            }
        }
    }

    fn finalize(&self, frames: Vec<AudioFrame>) -> Option<Utterance> {
        let utterance = Utterance::new(frames);
        if utterance.duration() < self.config.min_utterance() {
            debug!("⏭️ Utterance too short ({:?}), ignoring", utterance.duration());
            return None;
        }
        info!(
            "🎯 Utterance captured: {:?}, {} frames",
            utterance.duration(),
            utterance.frame_count()
        );
        Some(utterance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(level: f32) -> AudioFrame {
        AudioFrame::new(vec![level; 480], 16000)
    }

    #[test]
    fn threshold_rounds_to_frames() {
        let config = CaptureConfig::default();
        assert_eq!(config.silence_threshold_frames(30), 33);
        assert_eq!(config.silence_threshold_frames(20), 50);
        assert_eq!(config.silence_threshold_frames(10), 100);
    }

    #[test]
    fn idle_ignores_silence() {
        let mut machine = CaptureMachine::new(2);
        assert!(machine.push(frame(0.0), false).is_none());
        assert_eq!(machine.state(), CaptureState::Idle);
        assert_eq!(machine.buffered_frames(), 0);
        assert!(machine.finish().is_none());
    }

    #[test]
    fn speech_resets_silence_counter() {
        let mut machine = CaptureMachine::new(2);
        machine.push(frame(0.5), true);
        machine.push(frame(0.0), false);
        machine.push(frame(0.0), false);
        assert_eq!(machine.state(), CaptureState::TrailingSilence);
        machine.push(frame(0.5), true);
        assert_eq!(machine.state(), CaptureState::Speaking);
        machine.push(frame(0.0), false);
        machine.push(frame(0.0), false);
        let done = machine.push(frame(0.0), false).expect("endpoint");
        // 1 speech + 2 silence + 1 speech + 2 silence
        assert_eq!(done.len(), 6);
        assert_eq!(machine.state(), CaptureState::Idle);
    }

    #[test]
    fn endpoint_excludes_the_exceeding_frame() {
        let mut machine = CaptureMachine::new(3);
        machine.push(frame(0.5), true);
        for _ in 0..3 {
            assert!(machine.push(frame(0.0), false).is_none());
        }
        let done = machine.push(frame(0.0), false).expect("endpoint");
        assert_eq!(done.len(), 4);
    }

    #[test]
    fn finish_flushes_partial_speech() {
        let mut machine = CaptureMachine::new(10);
        machine.push(frame(0.5), true);
        machine.push(frame(0.0), false);
        assert_eq!(machine.finish().map(|f| f.len()), Some(2));
        assert_eq!(machine.state(), CaptureState::Idle);
    }
}
