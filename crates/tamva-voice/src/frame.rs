//! Audio frames, completed utterances, and the frame source seam.

use crate::error::VoiceResult;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// One fixed-duration chunk of mono PCM (f32, -1.0..1.0). Immutable once captured.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    samples: Vec<f32>,
    sample_rate: u32,
    captured_at: Instant,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            captured_at: Instant::now(),
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// Duration covered by this frame's samples.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.samples.len() as u64 * 1_000_000_000 / self.sample_rate as u64)
    }
}

/// A complete spoken command: every frame from the first speech frame to the endpoint.
///
/// Produced once per capture and consumed once by transcription.
#[derive(Debug, Clone)]
pub struct Utterance {
    frames: Vec<AudioFrame>,
    duration: Duration,
    sample_rate: u32,
    completed_at: DateTime<Utc>,
}

impl Utterance {
    pub fn new(frames: Vec<AudioFrame>) -> Self {
        let duration = frames.iter().map(AudioFrame::duration).sum();
        let sample_rate = frames.first().map(AudioFrame::sample_rate).unwrap_or(0);
        Self {
            frames,
            duration,
            sample_rate,
            completed_at: Utc::now(),
        }
    }

    pub fn frames(&self) -> &[AudioFrame] {
        &self.frames
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }

    pub fn is_empty(&self) -> bool {
        self.frames.iter().all(|f| f.samples().is_empty())
    }

    /// Concatenated PCM of all frames, in capture order.
    pub fn samples(&self) -> Vec<f32> {
        let total = self.frames.iter().map(|f| f.samples().len()).sum();
        let mut out = Vec::with_capacity(total);
        for frame in &self.frames {
            out.extend_from_slice(frame.samples());
        }
        out
    }
}

/// A blocking stream of audio frames (microphone, file replay, test script).
pub trait FrameSource {
    /// Block until the next frame. `Ok(None)` means the stream has ended.
    fn next_frame(&mut self) -> VoiceResult<Option<AudioFrame>>;

    /// Drop frames buffered while nobody was reading (e.g. during playback of a cue).
    fn discard_pending(&mut self) {}
}

/// Frame source that replays a fixed list of frames, then ends.
#[derive(Debug, Default)]
pub struct ReplaySource {
    frames: VecDeque<AudioFrame>,
}

impl ReplaySource {
    pub fn new(frames: impl IntoIterator<Item = AudioFrame>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }

    /// Frames not yet read.
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for ReplaySource {
    fn next_frame(&mut self) -> VoiceResult<Option<AudioFrame>> {
        Ok(self.frames.pop_front())
    }
}
