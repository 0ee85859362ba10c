//! Prompt templates for transcript correction, the reasoning agent, and chat sessions.

pub mod agent;
pub mod correction;
pub mod session;

pub use agent::AGENT_SYSTEM;
pub use correction::{correction_user_prompt, CORRECTION_USER_TEMPLATE};
pub use session::SESSION_PERSONA_SYSTEM;
