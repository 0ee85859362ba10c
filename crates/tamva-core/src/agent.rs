//! Text collaborators around the transcript: correction before routing, and the general
//! reasoning agent for everything the router does not handle locally.

use crate::error::{AssistantError, AssistantResult};
use crate::history::{ConversationTurn, Role};
use crate::llm::{ChatCompletion, ChatMessage, CompletionOptions};
use crate::prompts::{correction_user_prompt, AGENT_SYSTEM};
use std::sync::Arc;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Correction
// ---------------------------------------------------------------------------

/// Cleans up a raw transcription. Never fails: on any problem it returns the input.
pub trait TranscriptCorrector {
    fn correct(&self, text: &str) -> String;
}

#[derive(Debug, Default)]
pub struct PassThroughCorrector;

impl TranscriptCorrector for PassThroughCorrector {
    fn correct(&self, text: &str) -> String {
        text.to_string()
    }
}

/// LLM correction pass: temperature 0, short output.
pub struct LlmCorrector {
    llm: Arc<dyn ChatCompletion>,
    options: CompletionOptions,
}

impl LlmCorrector {
    pub fn new(llm: Arc<dyn ChatCompletion>, model: impl Into<String>) -> Self {
        Self {
            llm,
            options: CompletionOptions {
                model: model.into(),
                temperature: 0.0,
                max_tokens: Some(50),
            },
        }
    }
}

impl TranscriptCorrector for LlmCorrector {
    fn correct(&self, text: &str) -> String {
        if text.trim().is_empty() {
            return text.to_string();
        }
        let messages = [ChatMessage::user(correction_user_prompt(text))];
        match self.llm.complete(&messages, &self.options) {
            Ok(corrected) => {
                let corrected = corrected.trim().trim_matches('"').trim();
                if corrected.is_empty() {
                    return text.to_string();
                }
                if corrected != text {
                    info!("✏️ Corrected transcription: '{}' -> '{}'", text, corrected);
                }
                corrected.to_string()
            }
            Err(e) => {
                warn!("Transcript correction failed, using raw text: {}", e);
                text.to_string()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Reasoning agent
// ---------------------------------------------------------------------------

/// General request handler. `history` holds the conversation before this request.
pub trait ReasoningAgent {
    fn run(&self, text: &str, history: &[ConversationTurn]) -> AssistantResult<String>;
}

pub struct ChatAgent {
    llm: Arc<dyn ChatCompletion>,
    options: CompletionOptions,
}

impl ChatAgent {
    pub fn new(llm: Arc<dyn ChatCompletion>, model: impl Into<String>) -> Self {
        Self {
            llm,
            options: CompletionOptions {
                model: model.into(),
                temperature: 0.0,
                max_tokens: None,
            },
        }
    }

    fn build_messages(text: &str, history: &[ConversationTurn]) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(AGENT_SYSTEM));
        messages.extend(history.iter().map(|turn| match turn.role {
            Role::User => ChatMessage::user(turn.text.clone()),
            Role::Assistant => ChatMessage::assistant(turn.text.clone()),
        }));
        messages.push(ChatMessage::user(text));
        messages
    }
}

impl ReasoningAgent for ChatAgent {
    fn run(&self, text: &str, history: &[ConversationTurn]) -> AssistantResult<String> {
        debug!("Agent request with {} prior turns", history.len());
        let messages = Self::build_messages(text, history);
        self.llm
            .complete(&messages, &self.options)
            .map_err(|e| AssistantError::AgentError(e.to_string()))
    }
}
