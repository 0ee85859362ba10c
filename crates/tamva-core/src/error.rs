//! Error taxonomy for the command loop.
//!
//! "No command captured" is not listed here: capture returns `Option<Utterance>` and the
//! turn controller treats `None` as a normal no-op.

use tamva_voice::VoiceError;
use thiserror::Error;

pub type AssistantResult<T> = Result<T, AssistantError>;

#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("Transcription failed: {0}")]
    TranscriptionError(String),

    #[error("Agent failed: {0}")]
    AgentError(String),

    /// Identity unresolved, below the confidence threshold, or the chat could not be opened.
    #[error("Session start failed: {0}")]
    SessionStartFailure(String),

    #[error("Message delivery failed: {0}")]
    SendFailure(String),

    /// Checking the chat for a reply failed. The session keeps polling.
    #[error("Reply poll failed: {0}")]
    PollFailure(String),

    /// A required collaborator could not be built. Aborts the runtime before any turn runs.
    #[error("Initialization failed: {0}")]
    FatalInitError(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("History error: {0}")]
    History(String),

    #[error("Voice error: {0}")]
    Voice(#[from] VoiceError),
}

impl AssistantError {
    /// Errors that end the whole run rather than one turn.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FatalInitError(_) | Self::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voice_errors_convert() {
        let err: AssistantError = VoiceError::Stt("no audio".to_string()).into();
        assert!(matches!(err, AssistantError::Voice(_)));
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("no audio"));
    }

    #[test]
    fn init_and_config_errors_are_fatal() {
        assert!(AssistantError::FatalInitError("mic".into()).is_fatal());
        assert!(AssistantError::Config("bad rate".into()).is_fatal());
        assert!(!AssistantError::AgentError("timeout".into()).is_fatal());
        assert!(!AssistantError::PollFailure("bridge down".into()).is_fatal());
    }
}
