//! Assistant configuration: defaults, then `tamva.toml`, then environment.
//!
//! | Env | Section field |
//! |-----|---------------|
//! | TAMVA_CONFIG | path of the TOML file (default `tamva.toml`) |
//! | TAMVA_SAMPLE_RATE / TAMVA_FRAME_MS / TAMVA_INPUT_DEVICE | audio |
//! | TAMVA_VAD_MODE / TAMVA_TRAILING_SILENCE_MS / TAMVA_MIN_UTTERANCE_MS | audio.vad, audio.capture |
//! | TAMVA_WAKE_PHRASE / TAMVA_WAKE_ENABLED | wake |
//! | TAMVA_LLM_BASE_URL / TAMVA_LLM_API_KEY (or OPENAI_API_KEY, GROQ_API_KEY) | llm |
//! | TAMVA_AGENT_MODEL / TAMVA_CORRECTION_MODEL / TAMVA_SESSION_MODEL | llm |
//! | TAMVA_STT_BASE_URL / TAMVA_STT_API_KEY / TAMVA_STT_MODEL / TAMVA_WHISPER_MODEL | stt |
//! | TAMVA_TTS_API_KEY / TAMVA_TTS_VOICE / TAMVA_FEEDBACK_VOICE / TAMVA_FEEDBACK_ENABLED | tts |
//! | TAMVA_BRIDGE_URL / TAMVA_BRIDGE_TOKEN / TAMVA_CONTACT_THRESHOLD / TAMVA_POLL_INTERVAL_SECS | messaging |
//! | TAMVA_ROUTING_POLICY | router (`session_first` \| `fast_path_first`) |
//! | TAMVA_ERROR_BACKOFF_MS / TAMVA_LISTEN_TIMEOUT_MS | runtime |
//! | TAMVA_HISTORY_PATH | history |
//!
//! Speech keys fall back to the LLM key when unset.

use crate::error::{AssistantError, AssistantResult};
use crate::history::HistoryConfig;
use crate::llm::LlmConfig;
use crate::messaging::MessagingConfig;
use crate::router::{RouterConfig, RoutingPolicy};
use crate::turn::RuntimeConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tamva_voice::{AudioConfig, CaptureConfig, SttConfig, TtsConfig, VadConfig, WakeConfig};
use tracing::{debug, info};

pub const CONFIG_PATH_ENV: &str = "TAMVA_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "tamva.toml";

/// Microphone, VAD and endpointing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioSection {
    #[serde(flatten)]
    pub input: AudioConfig,

    #[serde(default)]
    pub vad: VadConfig,

    #[serde(default)]
    pub capture: CaptureConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantConfig {
    #[serde(default)]
    pub audio: AudioSection,
    #[serde(default)]
    pub wake: WakeConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub stt: SttConfig,
    #[serde(default)]
    pub tts: TtsConfig,
    #[serde(default)]
    pub messaging: MessagingConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

impl AssistantConfig {
    /// Load from `TAMVA_CONFIG` (or `tamva.toml`) plus the process environment.
    ///
    /// A missing default file means built-in defaults; a missing file named by
    /// `TAMVA_CONFIG` is an error.
    pub fn load() -> AssistantResult<Self> {
        let explicit = std::env::var(CONFIG_PATH_ENV)
            .ok()
            .filter(|p| !p.trim().is_empty());
        let mut config = match &explicit {
            Some(path) => Self::load_from_path(path)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::load_from_path(DEFAULT_CONFIG_PATH)?
            }
            None => {
                debug!("No {} found; using defaults", DEFAULT_CONFIG_PATH);
                Self::default()
            }
        };
        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> AssistantResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            AssistantError::Config(format!("read {}: {}", path.display(), e))
        })?;
        info!("Loaded configuration from {}", path.display());
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> AssistantResult<Self> {
        toml::from_str(text).map_err(|e| AssistantError::Config(format!("parse config: {}", e)))
    }

    /// Apply environment overrides. `lookup` returns the raw value of a variable.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let audio = &mut self.audio;
        env.parse("TAMVA_SAMPLE_RATE", &mut audio.input.sample_rate);
        env.parse("TAMVA_FRAME_MS", &mut audio.input.frame_ms);
        if let Some(device) = env.opt_string("TAMVA_INPUT_DEVICE") {
            audio.input.device = Some(device);
        }
        env.parse("TAMVA_VAD_MODE", &mut audio.vad.mode);
        env.parse("TAMVA_TRAILING_SILENCE_MS", &mut audio.capture.trailing_silence_ms);
        env.parse("TAMVA_MIN_UTTERANCE_MS", &mut audio.capture.min_utterance_ms);

        if let Some(phrase) = env.opt_string("TAMVA_WAKE_PHRASE") {
            self.wake.phrase = phrase;
        }
        self.wake.enabled = env.bool("TAMVA_WAKE_ENABLED", self.wake.enabled);

        let llm = &mut self.llm;
        if let Some(url) = env.opt_string("TAMVA_LLM_BASE_URL") {
            llm.base_url = url;
        }
        if let Some(key) = env
            .opt_string("TAMVA_LLM_API_KEY")
            .or_else(|| env.opt_string("OPENAI_API_KEY"))
            .or_else(|| env.opt_string("GROQ_API_KEY"))
        {
            llm.api_key = Some(key);
        }
        if let Some(model) = env.opt_string("TAMVA_AGENT_MODEL") {
            llm.agent_model = model;
        }
        if let Some(model) = env.opt_string("TAMVA_CORRECTION_MODEL") {
            llm.correction_model = model;
        }
        if let Some(model) = env.opt_string("TAMVA_SESSION_MODEL") {
            llm.session_model = model;
        }

        let stt = &mut self.stt;
        if let Some(url) = env.opt_string("TAMVA_STT_BASE_URL") {
            stt.base_url = url;
        }
        if let Some(key) = env.opt_string("TAMVA_STT_API_KEY") {
            stt.api_key = Some(key);
        }
        if let Some(model) = env.opt_string("TAMVA_STT_MODEL") {
            stt.model = model;
        }
        if let Some(path) = env.opt_string("TAMVA_WHISPER_MODEL") {
            stt.whisper_model_path = Some(path);
        }

        let tts = &mut self.tts;
        if let Some(key) = env.opt_string("TAMVA_TTS_API_KEY") {
            tts.primary.api_key = Some(key.clone());
            tts.feedback.api_key = Some(key);
        }
        if let Some(voice) = env.opt_string("TAMVA_TTS_VOICE") {
            tts.primary.voice = voice;
        }
        if let Some(voice) = env.opt_string("TAMVA_FEEDBACK_VOICE") {
            tts.feedback.voice = voice;
        }
        tts.feedback.enabled = env.bool("TAMVA_FEEDBACK_ENABLED", tts.feedback.enabled);

        let messaging = &mut self.messaging;
        if let Some(url) = env.opt_string("TAMVA_BRIDGE_URL") {
            messaging.bridge_url = url;
        }
        if let Some(token) = env.opt_string("TAMVA_BRIDGE_TOKEN") {
            messaging.token = Some(token);
        }
        env.parse("TAMVA_CONTACT_THRESHOLD", &mut messaging.confidence_threshold);
        env.parse("TAMVA_POLL_INTERVAL_SECS", &mut messaging.poll_interval_secs);

        env.parse::<RoutingPolicy>("TAMVA_ROUTING_POLICY", &mut self.router.policy);
        env.parse("TAMVA_ERROR_BACKOFF_MS", &mut self.runtime.error_backoff_ms);
        env.parse("TAMVA_LISTEN_TIMEOUT_MS", &mut self.runtime.listen_timeout_ms);
        if let Some(path) = env.opt_string("TAMVA_HISTORY_PATH") {
            self.history.path = Some(PathBuf::from(path));
        }

        self.inherit_speech_keys();
    }

    fn inherit_speech_keys(&mut self) {
        let Some(key) = self.llm.api_key.clone().filter(|k| !k.trim().is_empty()) else {
            return;
        };
        for slot in [
            &mut self.stt.api_key,
            &mut self.tts.primary.api_key,
            &mut self.tts.feedback.api_key,
        ] {
            if slot.as_deref().map_or(true, |k| k.trim().is_empty()) {
                *slot = Some(key.clone());
            }
        }
    }

    pub fn validate(&self) -> AssistantResult<()> {
        self.audio
            .input
            .validate()
            .map_err(|e| AssistantError::Config(e.to_string()))?;
        if self.audio.vad.mode > 3 {
            return Err(AssistantError::Config(format!(
                "VAD mode must be 0..=3, got {}",
                self.audio.vad.mode
            )));
        }
        if self.messaging.confidence_threshold > 100 {
            return Err(AssistantError::Config(format!(
                "contact confidence threshold must be 0..=100, got {}",
                self.messaging.confidence_threshold
            )));
        }
        if self.messaging.poll_interval_secs == 0 {
            return Err(AssistantError::Config(
                "poll interval must be at least one second".to_string(),
            ));
        }
        if self.wake.enabled && self.wake.phrase.trim().is_empty() {
            return Err(AssistantError::Config(
                "wake phrase is empty but wake detection is enabled".to_string(),
            ));
        }
        Ok(())
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn opt_string(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str, default: bool) -> bool {
        match self.opt_string(name) {
            Some(v) => matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on"),
            None => default,
        }
    }

    /// Overwrite `slot` when the variable parses; leave it alone otherwise.
    fn parse<T: FromStr>(&self, name: &str, slot: &mut T) {
        if let Some(raw) = self.opt_string(name) {
            match raw.parse::<T>() {
                Ok(v) => *slot = v,
                Err(_) => debug!("Ignoring unparsable {}={}", name, raw),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = AssistantConfig::default();
        assert_eq!(config.audio.input.sample_rate, 16000);
        assert_eq!(config.audio.input.frame_ms, 30);
        assert_eq!(config.audio.vad.mode, 3);
        assert_eq!(config.audio.capture.trailing_silence_ms, 1000);
        assert_eq!(config.audio.capture.min_utterance_ms, 500);
        assert_eq!(config.wake.phrase, "hey tam va");
        assert_eq!(config.messaging.confidence_threshold, 70);
        assert_eq!(config.messaging.poll_interval_secs, 15);
        assert_eq!(config.router.policy, RoutingPolicy::SessionFirst);
        assert_eq!(config.runtime.error_backoff_ms, 2000);
        assert_eq!(config.runtime.listen_timeout_ms, 8000);
        assert_eq!(config.audio.input.max_buffered_ms, 10_000);
        assert_eq!(config.runtime.ack_cue, "Yes?");
        assert!(config.history.path.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = AssistantConfig::from_toml_str(
            r#"
            [audio]
            frame_ms = 20

            [audio.capture]
            trailing_silence_ms = 600

            [router]
            policy = "fast_path_first"
            "#,
        )
        .unwrap();
        assert_eq!(config.audio.input.frame_ms, 20);
        assert_eq!(config.audio.input.sample_rate, 16000);
        assert_eq!(config.audio.capture.trailing_silence_ms, 600);
        assert_eq!(config.audio.capture.min_utterance_ms, 500);
        assert_eq!(config.router.policy, RoutingPolicy::FastPathFirst);
        assert_eq!(config.wake.phrase, "hey tam va");
    }

    #[test]
    fn env_overrides_and_key_inheritance() {
        let mut config = AssistantConfig::default();
        config.apply_env(lookup(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("TAMVA_WAKE_ENABLED", "false"),
            ("TAMVA_ROUTING_POLICY", "fast-path-first"),
            ("TAMVA_CONTACT_THRESHOLD", "80"),
            ("TAMVA_POLL_INTERVAL_SECS", "not a number"),
            ("TAMVA_FEEDBACK_VOICE", "echo"),
            ("TAMVA_LISTEN_TIMEOUT_MS", "0"),
        ]));
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.stt.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.tts.primary.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.tts.feedback.voice, "echo");
        assert!(!config.wake.enabled);
        assert_eq!(config.router.policy, RoutingPolicy::FastPathFirst);
        assert_eq!(config.messaging.confidence_threshold, 80);
        assert_eq!(config.messaging.poll_interval_secs, 15);
        assert_eq!(config.runtime.listen_timeout(), None);
    }

    #[test]
    fn explicit_speech_key_is_not_overwritten() {
        let mut config = AssistantConfig::default();
        config.apply_env(lookup(&[
            ("TAMVA_LLM_API_KEY", "llm"),
            ("TAMVA_STT_API_KEY", "stt"),
        ]));
        assert_eq!(config.stt.api_key.as_deref(), Some("stt"));
        assert_eq!(config.tts.feedback.api_key.as_deref(), Some("llm"));
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = AssistantConfig::default();
        config.audio.input.frame_ms = 25;
        assert!(matches!(config.validate(), Err(AssistantError::Config(_))));

        let mut config = AssistantConfig::default();
        config.messaging.confidence_threshold = 101;
        assert!(config.validate().is_err());

        let mut config = AssistantConfig::default();
        config.wake.phrase = "  ".to_string();
        assert!(config.validate().is_err());
        config.wake.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn load_from_missing_path_is_config_error() {
        let err = AssistantConfig::load_from_path("/nonexistent/tamva.toml").unwrap_err();
        assert!(matches!(err, AssistantError::Config(_)));
    }
}
