//! # TAM-VA Core
//!
//! The command loop behind the voice assistant: what to do with an utterance once it has
//! been heard, and the worker that keeps hearing them.
//!
//! ```text
//!   foreground                          worker thread
//! ┌─────────────┐  StatusUpdate   ┌──────────────────────────────────────────────┐
//! │  presenter  │ ◀────────────── │ TurnController                               │
//! │  (daemon)   │                 │  wake → cue → capture → STT → correct        │
//! │             │  cancel()       │   → CommandRouter ─┬─ FastAction             │
//! │   Ctrl-C  ──┼───────────────▶ │                    ├─ AgentRequest (LLM)     │
//! └─────────────┘ CancellationSig │                    └─ SessionRequest         │
//!                                 │                         └─ AutonomousSession │
//!                                 └──────────────────────────────────────────────┘
//! ```
//!
//! Build the collaborators inside [`OrchestratorRuntime::start`]'s factory and hand the
//! resulting [`TurnController`] back; the runtime owns cancellation and the join.

pub mod actions;
pub mod agent;
pub mod config;
pub mod error;
pub mod history;
pub mod llm;
pub mod messaging;
pub mod prompts;
pub mod router;
pub mod runtime;
pub mod session;
pub mod status;
pub mod turn;

pub use actions::{control_volume, open_calculator, FastAction, FastPathTable, VolumeChange};
pub use agent::{ChatAgent, LlmCorrector, PassThroughCorrector, ReasoningAgent, TranscriptCorrector};
pub use config::{AssistantConfig, AudioSection};
pub use error::{AssistantError, AssistantResult};
pub use history::{
    create_history, ConversationHistory, ConversationTurn, HistoryConfig, InMemoryHistory,
    JsonlHistory, Role,
};
pub use llm::{ChatClient, ChatCompletion, ChatError, ChatMessage, CompletionOptions, LlmConfig};
pub use messaging::{
    resolve_contact, similarity, ChatHandle, HttpMessagingBridge, MessagingConfig,
    MessagingSurface,
};
pub use router::{
    CommandRouter, FastPathMatcher, Matcher, RouterConfig, RoutingDecision, RoutingPolicy,
    SessionTriggerMatcher,
};
pub use runtime::{OrchestratorRuntime, RuntimeHandle, WorkerExit};
pub use session::{
    AutonomousSession, ChatMessageGenerator, MessageGenerator, SessionPhase, SessionReport,
    SessionRole, SessionState, SessionTurn,
};
pub use status::{status_channel, Severity, StatusReporter, StatusUpdate};
pub use turn::{
    ExitReason, RunSummary, RuntimeConfig, TurnCollaborators, TurnController, TurnLoop,
    TurnOutcome, TurnPhase,
};
