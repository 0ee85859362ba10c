//! **Speech-to-Text (STT)**: convert a captured [`Utterance`] into text.
//!
//! Implement [`SttBackend`] for local Whisper (whisper-rs, `whisper` feature) or a remote
//! OpenAI-compatible transcription endpoint. Empty or invalid audio is an error; an empty
//! transcript is not.

use crate::error::{VoiceError, VoiceResult};
use crate::frame::Utterance;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Vocabulary hints passed as the initial prompt so command words transcribe reliably.
pub const DEFAULT_TRANSCRIPTION_HINTS: &str = "TAM-VA, Notepad, Chrome, VS Code, volume, mute, open, close, search, find, play, stop, email, mail, file, folder, weather, news, calculator, send, message, chat, WhatsApp.";

/// STT configuration (shared by the HTTP and Whisper backends)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SttConfig {
    /// Base URL without trailing slash (e.g. https://api.openai.com/v1).
    #[serde(default = "default_stt_base_url")]
    pub base_url: String,
    /// Bearer API key. Without it the HTTP backend is unavailable.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Model: whisper-1, whisper-large-v3, etc.
    #[serde(default = "default_stt_model")]
    pub model: String,
    /// Spoken language hint (ISO-639-1).
    #[serde(default = "default_language")]
    pub language: String,
    /// Initial prompt / vocabulary hints.
    #[serde(default = "default_hints")]
    pub hints: String,
    /// Path to a ggml Whisper model; used when built with the `whisper` feature.
    #[serde(default)]
    pub whisper_model_path: Option<String>,
    #[serde(default = "default_stt_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_stt_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_stt_model() -> String {
    "whisper-1".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_hints() -> String {
    DEFAULT_TRANSCRIPTION_HINTS.to_string()
}

fn default_stt_timeout_secs() -> u64 {
    30
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            base_url: default_stt_base_url(),
            api_key: None,
            model: default_stt_model(),
            language: default_language(),
            hints: default_hints(),
            whisper_model_path: None,
            timeout_secs: default_stt_timeout_secs(),
        }
    }
}

/// Backend for converting an utterance to text.
pub trait SttBackend: Send + Sync {
    /// Transcribe one utterance. Fails on empty or invalid audio.
    fn transcribe(&self, utterance: &Utterance) -> VoiceResult<String>;

    /// Short label for status logs.
    fn name(&self) -> &str;
}

fn ensure_audio(utterance: &Utterance) -> VoiceResult<()> {
    if utterance.is_empty() {
        return Err(VoiceError::Stt("utterance contains no audio".to_string()));
    }
    if utterance.sample_rate() == 0 {
        return Err(VoiceError::Stt("utterance has no sample rate".to_string()));
    }
    Ok(())
}

/// Encode f32 PCM (mono) to 16-bit WAV bytes for API upload.
fn pcm_f32_to_wav(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32;
    let mut buf = Vec::with_capacity(44 + data_len as usize);
    // RIFF header
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&(36 + data_len).to_le_bytes());
    buf.extend_from_slice(b"WAVE");
    // fmt subchunk: PCM, mono, 16-bit
    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes());
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&(sample_rate * 2).to_le_bytes());
    buf.extend_from_slice(&2u16.to_le_bytes());
    buf.extend_from_slice(&16u16.to_le_bytes());
    // data subchunk
    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_len.to_le_bytes());
    for &s in samples {
        let i = (s.clamp(-1.0, 1.0) * 32767.0).round() as i16;
        buf.extend_from_slice(&i.to_le_bytes());
    }
    buf
}

/// Placeholder STT: returns a fixed string. Use for exercising the loop without Whisper/API.
#[derive(Debug, Default)]
pub struct PlaceholderStt {
    /// If set, return this instead of the default message.
    pub response: Option<String>,
}

impl PlaceholderStt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(s: impl Into<String>) -> Self {
        Self {
            response: Some(s.into()),
        }
    }
}

impl SttBackend for PlaceholderStt {
    fn transcribe(&self, utterance: &Utterance) -> VoiceResult<String> {
        ensure_audio(utterance)?;
        if let Some(ref r) = self.response {
            return Ok(r.clone());
        }
        Ok(format!(
            "[STT placeholder: {} frames, {:.1}s]",
            utterance.frame_count(),
            utterance.duration().as_secs_f32()
        ))
    }

    fn name(&self) -> &str {
        "placeholder"
    }
}

/// OpenAI-compatible transcription API (OpenAI Whisper, Groq, OpenRouter, local servers).
#[derive(Debug, Clone)]
pub struct HttpStt {
    base_url: String,
    api_key: String,
    model: String,
    language: String,
    prompt: String,
    client: reqwest::blocking::Client,
}

impl HttpStt {
    pub fn from_config(config: &SttConfig) -> VoiceResult<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| VoiceError::Config("HTTP STT requires an API key".to_string()))?;
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| VoiceError::Stt(e.to_string()))?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: config.model.clone(),
            language: config.language.clone(),
            prompt: config.hints.clone(),
            client,
        })
    }
}

impl SttBackend for HttpStt {
    fn transcribe(&self, utterance: &Utterance) -> VoiceResult<String> {
        ensure_audio(utterance)?;
        let wav = pcm_f32_to_wav(&utterance.samples(), utterance.sample_rate());
        let url = format!("{}/audio/transcriptions", self.base_url);
        let part = reqwest::blocking::multipart::Part::bytes(wav)
            .file_name("utterance.wav")
            .mime_str("audio/wav")
            .map_err(|e| VoiceError::Stt(e.to_string()))?;
        let mut form = reqwest::blocking::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("language", self.language.clone());
        if !self.prompt.trim().is_empty() {
            form = form.text("prompt", self.prompt.clone());
        }
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .map_err(|e| VoiceError::Stt(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().unwrap_or_default();
            return Err(VoiceError::Stt(format!("STT API error {}: {}", status, body)));
        }
        let json: serde_json::Value = res.json().map_err(|e| VoiceError::Stt(e.to_string()))?;
        let text = json
            .get("text")
            .and_then(|t| t.as_str())
            .unwrap_or("")
            .trim()
            .to_string();
        debug!("Raw transcription: '{}'", text);
        Ok(text)
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(feature = "whisper")]
mod whisper_stt {
    use super::*;
    use std::sync::Mutex;
    use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

    /// Local Whisper STT on a ggml model (e.g. ggml-small.en.bin). Audio must be 16 kHz mono.
    pub struct WhisperStt {
        #[allow(dead_code)]
        context: WhisperContext,
        state: Mutex<whisper_rs::WhisperState>,
        language: String,
        prompt: String,
    }

    impl WhisperStt {
        pub fn new(model_path: &str, language: &str, prompt: &str) -> VoiceResult<Self> {
            let context =
                WhisperContext::new_with_params(model_path, WhisperContextParameters::default())
                    .map_err(|e| VoiceError::Stt(format!("Whisper load failed: {}", e)))?;
            let state = context
                .create_state()
                .map_err(|e| VoiceError::Stt(format!("Whisper state init failed: {}", e)))?;
            Ok(Self {
                context,
                state: Mutex::new(state),
                language: language.to_string(),
                prompt: prompt.to_string(),
            })
        }
    }

    impl SttBackend for WhisperStt {
        fn transcribe(&self, utterance: &Utterance) -> VoiceResult<String> {
            ensure_audio(utterance)?;
            if utterance.sample_rate() != 16000 {
                return Err(VoiceError::Stt(format!(
                    "Whisper expects 16 kHz; got {} Hz",
                    utterance.sample_rate()
                )));
            }
            let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
            params.set_print_progress(false);
            params.set_print_realtime(false);
            params.set_no_timestamps(true);
            params.set_language(Some(&self.language));
            params.set_initial_prompt(&self.prompt);

            let mut state = self
                .state
                .lock()
                .map_err(|e| VoiceError::Stt(format!("Whisper lock poisoned: {}", e)))?;
            state
                .full(params, &utterance.samples())
                .map_err(|e| VoiceError::Stt(format!("Whisper inference failed: {}", e)))?;
            let text = state
                .as_iter()
                .filter_map(|seg| seg.to_str().ok().map(str::to_string))
                .collect::<Vec<_>>()
                .join(" ")
                .trim()
                .to_string();
            Ok(text)
        }

        fn name(&self) -> &str {
            "whisper"
        }
    }
}

#[cfg(feature = "whisper")]
pub use whisper_stt::WhisperStt;

/// Create the best available STT backend.
///
/// Priority: (1) local Whisper when built with `whisper` and a model path is configured,
/// (2) the HTTP backend when an API key is configured, (3) error. Transcription is a
/// required collaborator, so there is no silent placeholder fallback here.
pub fn create_best_stt(config: &SttConfig) -> VoiceResult<Box<dyn SttBackend>> {
    #[cfg(feature = "whisper")]
    {
        if let Some(path) = config.whisper_model_path.as_deref().map(str::trim) {
            if !path.is_empty() {
                match whisper_stt::WhisperStt::new(path, &config.language, &config.hints) {
                    Ok(w) => {
                        info!("STT: [Whisper] (local, {})", path);
                        return Ok(Box::new(w));
                    }
                    Err(e) => warn!("Whisper unavailable, trying HTTP STT: {}", e),
                }
            }
        }
    }
    #[cfg(not(feature = "whisper"))]
    {
        if config.whisper_model_path.is_some() {
            warn!("stt.whisper_model_path is set but the `whisper` feature is not enabled");
        }
    }

    let http = HttpStt::from_config(config)?;
    info!("STT: [HTTP] ({})", http.base_url);
    Ok(Box::new(http))
}
