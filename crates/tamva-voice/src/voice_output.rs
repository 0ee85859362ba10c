//! **VoiceOutput**: speech synthesis backends, rodio playback, and the two-voice speaker.
//!
//! The primary voice speaks responses; the feedback voice speaks short cues and apologies.
//! When the primary voice is missing or fails, the feedback voice says so instead.

use crate::error::{VoiceError, VoiceResult};
use rodio::{OutputStream, OutputStreamHandle, Sink, Source};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const PRIMARY_UNAVAILABLE: &str = "My main voice is currently unavailable.";
pub const PRIMARY_FAILED: &str = "I encountered an error with my voice synthesis.";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// One OpenAI-compatible speech endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceBackendConfig {
    /// Disabled backends are treated as unavailable.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Base URL without trailing slash (e.g. https://api.openai.com/v1).
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub api_key: Option<String>,

    /// tts-1 (fast) or tts-1-hd.
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_voice")]
    pub voice: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "tts-1".to_string()
}

fn default_voice() -> String {
    "nova".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for VoiceBackendConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            base_url: default_base_url(),
            api_key: None,
            model: default_model(),
            voice: default_voice(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Primary and feedback voices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TtsConfig {
    #[serde(default)]
    pub primary: VoiceBackendConfig,

    #[serde(default = "default_feedback")]
    pub feedback: VoiceBackendConfig,
}

fn default_feedback() -> VoiceBackendConfig {
    VoiceBackendConfig {
        voice: "alloy".to_string(),
        timeout_secs: 20,
        ..Default::default()
    }
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            primary: VoiceBackendConfig::default(),
            feedback: default_feedback(),
        }
    }
}

// ---------------------------------------------------------------------------
// Synthesis
// ---------------------------------------------------------------------------

/// Backend that turns text into encoded audio bytes (WAV/MP3).
pub trait TtsBackend: Send + Sync {
    /// Synthesize text to audio bytes. Return an empty vec to skip playback.
    fn synthesize(&self, text: &str) -> VoiceResult<Vec<u8>>;

    fn name(&self) -> &str {
        "tts"
    }
}

/// Returns empty audio so nothing plays.
#[derive(Debug, Default)]
pub struct PlaceholderTts;

impl TtsBackend for PlaceholderTts {
    fn synthesize(&self, _text: &str) -> VoiceResult<Vec<u8>> {
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "placeholder"
    }
}

/// OpenAI-compatible `/audio/speech` client.
#[derive(Debug, Clone)]
pub struct HttpTts {
    base_url: String,
    api_key: String,
    model: String,
    voice: String,
    client: reqwest::blocking::Client,
}

impl HttpTts {
    pub fn from_config(config: &VoiceBackendConfig) -> VoiceResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| VoiceError::Config("TTS backend requires an API key".to_string()))?;
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| VoiceError::Tts(e.to_string()))?;
        Ok(Self {
            base_url: config.base_url.clone(),
            api_key,
            model: config.model.clone(),
            voice: config.voice.clone(),
            client,
        })
    }
}

impl TtsBackend for HttpTts {
    fn synthesize(&self, text: &str) -> VoiceResult<Vec<u8>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/audio/speech", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
            "voice": self.voice,
        });
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| VoiceError::Tts(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().unwrap_or_default();
            return Err(VoiceError::Tts(format!("TTS API error {}: {}", status, body)));
        }
        let bytes = res.bytes().map_err(|e| VoiceError::Tts(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    fn name(&self) -> &str {
        &self.voice
    }
}

/// Build a backend, or `None` when it is disabled or cannot be configured.
pub fn create_tts(config: &VoiceBackendConfig) -> Option<Box<dyn TtsBackend>> {
    if !config.enabled {
        return None;
    }
    match HttpTts::from_config(config) {
        Ok(tts) => {
            info!("🔊 TTS voice '{}' ready ({})", config.voice, config.model);
            Some(Box::new(tts))
        }
        Err(e) => {
            warn!("TTS voice '{}' unavailable: {}", config.voice, e);
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Playback
// ---------------------------------------------------------------------------

/// Something that plays encoded audio to completion.
pub trait AudioSink {
    fn play_blocking(&self, bytes: &[u8]) -> VoiceResult<()>;
}

/// rodio playback on the default output device. Not `Send`: build it on the thread that plays.
pub struct VoiceOutput {
    _stream: OutputStream,
    _stream_handle: OutputStreamHandle,
    sink: Sink,
}

impl VoiceOutput {
    pub fn new() -> VoiceResult<Self> {
        let (stream, stream_handle) =
            OutputStream::try_default().map_err(|e| VoiceError::Playback(e.to_string()))?;
        let sink = Sink::try_new(&stream_handle).map_err(|e| VoiceError::Playback(e.to_string()))?;
        info!("🔈 VoiceOutput: sink ready");
        Ok(Self {
            _stream: stream,
            _stream_handle: stream_handle,
            sink,
        })
    }

    /// Queue encoded audio bytes (WAV/MP3).
    pub fn play_bytes(&self, bytes: &[u8]) -> VoiceResult<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        let source = rodio::Decoder::new(Cursor::new(bytes.to_vec()))
            .map_err(|e| VoiceError::Playback(format!("Decode failed: {}", e)))?;
        self.sink.append(source.convert_samples::<f32>());
        Ok(())
    }

    pub fn stop(&self) {
        self.sink.stop();
    }

    pub fn is_playing(&self) -> bool {
        !self.sink.empty()
    }

    pub fn sleep_until_end(&self) {
        self.sink.sleep_until_end();
    }
}

impl AudioSink for VoiceOutput {
    fn play_blocking(&self, bytes: &[u8]) -> VoiceResult<()> {
        self.play_bytes(bytes)?;
        self.sleep_until_end();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Speaker
// ---------------------------------------------------------------------------

/// Two independent voices. Both calls block until playback finishes and never fail.
pub trait Speaker {
    fn speak_primary(&self, text: &str);
    fn speak_feedback(&self, text: &str);
}

/// Primary + feedback voice sharing one output sink.
pub struct DualVoice {
    primary: Option<Box<dyn TtsBackend>>,
    feedback: Option<Box<dyn TtsBackend>>,
    sink: Box<dyn AudioSink>,
}

impl DualVoice {
    pub fn new(
        primary: Option<Box<dyn TtsBackend>>,
        feedback: Option<Box<dyn TtsBackend>>,
        sink: Box<dyn AudioSink>,
    ) -> Self {
        if primary.is_none() {
            warn!("Primary voice is not available");
        }
        if feedback.is_none() {
            warn!("Feedback voice is not available");
        }
        Self {
            primary,
            feedback,
            sink,
        }
    }

    /// Build both voices from config and open the default output device.
    pub fn from_config(config: &TtsConfig) -> VoiceResult<Self> {
        let sink = VoiceOutput::new()?;
        Ok(Self::new(
            create_tts(&config.primary),
            create_tts(&config.feedback),
            Box::new(sink),
        ))
    }

    fn say(&self, tts: &dyn TtsBackend, text: &str) -> VoiceResult<()> {
        let bytes = tts.synthesize(text)?;
        self.sink.play_blocking(&bytes)
    }
}

impl Speaker for DualVoice {
    fn speak_primary(&self, text: &str) {
        let Some(primary) = self.primary.as_deref() else {
            self.speak_feedback(PRIMARY_UNAVAILABLE);
            return;
        };
        info!("🗣️ Speaking ({}): {}", primary.name(), text);
        if let Err(e) = self.say(primary, text) {
            error!("Primary voice failed: {}", e);
            self.speak_feedback(PRIMARY_FAILED);
        }
    }

    fn speak_feedback(&self, text: &str) {
        let Some(feedback) = self.feedback.as_deref() else {
            warn!("Feedback voice not available. Cannot speak: '{}'", text);
            return;
        };
        debug!("Speaking feedback ({}): {}", feedback.name(), text);
        if let Err(e) = self.say(feedback, text) {
            error!("Feedback voice failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct TaggedTts {
        tag: &'static str,
        fail: bool,
    }

    impl TtsBackend for TaggedTts {
        fn synthesize(&self, text: &str) -> VoiceResult<Vec<u8>> {
            if self.fail {
                return Err(VoiceError::Tts("boom".to_string()));
            }
            Ok(format!("{}:{}", self.tag, text).into_bytes())
        }
    }

    #[derive(Clone, Default)]
    struct RecordingSink(Arc<Mutex<Vec<String>>>);

    impl AudioSink for RecordingSink {
        fn play_blocking(&self, bytes: &[u8]) -> VoiceResult<()> {
            self.0
                .lock()
                .unwrap()
                .push(String::from_utf8_lossy(bytes).into_owned());
            Ok(())
        }
    }

    fn voice(primary: Option<bool>, feedback: bool) -> (DualVoice, RecordingSink) {
        let sink = RecordingSink::default();
        let primary = primary.map(|fail| {
            Box::new(TaggedTts { tag: "primary", fail }) as Box<dyn TtsBackend>
        });
        let feedback = feedback.then(|| {
            Box::new(TaggedTts {
                tag: "feedback",
                fail: false,
            }) as Box<dyn TtsBackend>
        });
        (DualVoice::new(primary, feedback, Box::new(sink.clone())), sink)
    }

    #[test]
    fn placeholder_tts_returns_empty() {
        assert!(PlaceholderTts.synthesize("hello").unwrap().is_empty());
    }

    #[test]
    fn primary_speaks_when_healthy() {
        let (voice, sink) = voice(Some(false), true);
        voice.speak_primary("hello");
        assert_eq!(*sink.0.lock().unwrap(), vec!["primary:hello".to_string()]);
    }

    #[test]
    fn missing_primary_falls_back_to_feedback_notice() {
        let (voice, sink) = voice(None, true);
        voice.speak_primary("hello");
        assert_eq!(
            *sink.0.lock().unwrap(),
            vec![format!("feedback:{}", PRIMARY_UNAVAILABLE)]
        );
    }

    #[test]
    fn failing_primary_apologizes_on_feedback() {
        let (voice, sink) = voice(Some(true), true);
        voice.speak_primary("hello");
        assert_eq!(
            *sink.0.lock().unwrap(),
            vec![format!("feedback:{}", PRIMARY_FAILED)]
        );
    }

    #[test]
    fn missing_feedback_is_silent() {
        let (voice, sink) = voice(None, false);
        voice.speak_primary("hello");
        voice.speak_feedback("Yes?");
        assert!(sink.0.lock().unwrap().is_empty());
    }

    #[test]
    fn disabled_or_keyless_backend_is_unavailable() {
        let config = VoiceBackendConfig {
            enabled: false,
            api_key: Some("k".to_string()),
            ..Default::default()
        };
        assert!(create_tts(&config).is_none());
        assert!(create_tts(&VoiceBackendConfig::default()).is_none());
        let config = VoiceBackendConfig {
            api_key: Some("k".to_string()),
            ..Default::default()
        };
        assert!(create_tts(&config).is_some());
    }
}
