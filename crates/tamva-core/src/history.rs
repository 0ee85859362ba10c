//! Main conversation history: chronological (user, assistant) turns fed to the reasoning agent.
//!
//! Turns are never mutated after append. Chat-session messages are kept elsewhere
//! (see `session::SessionState`) and never enter this log.

use crate::error::{AssistantError, AssistantResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
    pub at: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            at: Utc::now(),
        }
    }
}

/// Append-only conversation log.
pub trait ConversationHistory {
    fn append(&mut self, turn: ConversationTurn) -> AssistantResult<()>;

    fn turns(&self) -> &[ConversationTurn];

    /// Append a user turn and the assistant's answer, in that order.
    fn append_exchange(&mut self, user: &str, assistant: &str) -> AssistantResult<()> {
        self.append(ConversationTurn::new(Role::User, user))?;
        self.append(ConversationTurn::new(Role::Assistant, assistant))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// JSONL file to persist turns to. `None` keeps history in memory only.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Build the configured history store.
pub fn create_history(config: &HistoryConfig) -> AssistantResult<Box<dyn ConversationHistory>> {
    match &config.path {
        Some(path) => Ok(Box::new(JsonlHistory::open(path)?)),
        None => Ok(Box::new(InMemoryHistory::default())),
    }
}

#[derive(Debug, Default)]
pub struct InMemoryHistory {
    turns: Vec<ConversationTurn>,
}

impl ConversationHistory for InMemoryHistory {
    fn append(&mut self, turn: ConversationTurn) -> AssistantResult<()> {
        self.turns.push(turn);
        Ok(())
    }

    fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }
}

/// History persisted as one JSON object per line. Existing lines are loaded on open.
#[derive(Debug)]
pub struct JsonlHistory {
    path: PathBuf,
    turns: Vec<ConversationTurn>,
}

impl JsonlHistory {
    pub fn open(path: impl AsRef<Path>) -> AssistantResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut turns = Vec::new();
        if path.exists() {
            let content = fs::read_to_string(&path)
                .map_err(|e| AssistantError::History(format!("{}: {}", path.display(), e)))?;
            for (n, line) in content.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<ConversationTurn>(line) {
                    Ok(turn) => turns.push(turn),
                    Err(e) => warn!("Skipping malformed history line {}: {}", n + 1, e),
                }
            }
            info!("📜 Loaded {} history turns from {}", turns.len(), path.display());
        } else if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| AssistantError::History(format!("{}: {}", parent.display(), e)))?;
        }
        Ok(Self { path, turns })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConversationHistory for JsonlHistory {
    fn append(&mut self, turn: ConversationTurn) -> AssistantResult<()> {
        let line =
            serde_json::to_string(&turn).map_err(|e| AssistantError::History(e.to_string()))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| AssistantError::History(format!("{}: {}", self.path.display(), e)))?;
        writeln!(file, "{}", line).map_err(|e| AssistantError::History(e.to_string()))?;
        self.turns.push(turn);
        Ok(())
    }

    fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }
}
