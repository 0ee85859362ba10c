//! **AutonomousSession**: an unattended chat with one contact, driven by polling.
//!
//! ```text
//! Starting ──open fails──────────────────────────────▶ Aborted
//!    │ open ok
//!    ▼
//! Opened ──opener fails to generate or send──────────▶ Aborted
//!    │ opener sent
//!    ▼
//! AwaitingReply ◀──────────────┐
//!    │ new incoming message    │ reply sent (or failed, reported)
//!    ▼                         │
//! Composing ───────────────────┘
//!
//! any state after Opened ──cancellation──▶ Closed (chat released, nothing sent after)
//! ```
//!
//! There is no maximum duration. The session ends only on cancellation or start failure.
//! Its message log ([`SessionState`]) is private and never reaches the main history.

use crate::error::{AssistantError, AssistantResult};
use crate::llm::{ChatCompletion, ChatMessage, CompletionOptions};
use crate::messaging::{ChatHandle, MessagingSurface};
use crate::prompts::SESSION_PERSONA_SYSTEM;
use crate::status::{Severity, StatusReporter};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tamva_voice::CancellationSignal;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Starting,
    Opened,
    AwaitingReply,
    Composing,
    Closed,
    Aborted,
}

/// Who wrote a session message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    /// Sent by the assistant on the user's behalf.
    Me,
    /// Received from the contact.
    Them,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionTurn {
    pub role: SessionRole,
    pub text: String,
    pub at: DateTime<Utc>,
}

/// Session-local state: target, exchanged messages, and the last incoming message seen.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    target: String,
    turns: Vec<SessionTurn>,
    last_seen: Option<String>,
}

impl SessionState {
    fn new(target: &str) -> Self {
        Self {
            target: target.to_string(),
            ..Default::default()
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn turns(&self) -> &[SessionTurn] {
        &self.turns
    }

    fn push(&mut self, role: SessionRole, text: &str) {
        self.turns.push(SessionTurn {
            role,
            text: text.to_string(),
            at: Utc::now(),
        });
    }

    /// Record `incoming` if it differs from the last message seen.
    fn observe(&mut self, incoming: String) -> Option<String> {
        if self.last_seen.as_deref() == Some(incoming.as_str()) {
            return None;
        }
        self.last_seen = Some(incoming.clone());
        Some(incoming)
    }
}

/// Writes the next message from the session history. An empty history asks for an opener.
pub trait MessageGenerator {
    fn generate(&self, history: &[SessionTurn]) -> AssistantResult<String>;
}

/// LLM-backed generator: persona prompt, temperature 0.8, short messages.
pub struct ChatMessageGenerator {
    llm: Arc<dyn ChatCompletion>,
    options: CompletionOptions,
}

impl ChatMessageGenerator {
    pub fn new(llm: Arc<dyn ChatCompletion>, model: impl Into<String>) -> Self {
        Self {
            llm,
            options: CompletionOptions {
                model: model.into(),
                temperature: 0.8,
                max_tokens: Some(150),
            },
        }
    }
}

impl MessageGenerator for ChatMessageGenerator {
    fn generate(&self, history: &[SessionTurn]) -> AssistantResult<String> {
        let mut messages = vec![ChatMessage::system(SESSION_PERSONA_SYSTEM)];
        messages.extend(history.iter().map(|turn| match turn.role {
            SessionRole::Me => ChatMessage::assistant(turn.text.clone()),
            SessionRole::Them => ChatMessage::user(turn.text.clone()),
        }));
        let text = self
            .llm
            .complete(&messages, &self.options)
            .map_err(|e| AssistantError::AgentError(format!("session message: {}", e)))?;
        let text = text.trim().trim_matches('"').trim();
        if text.is_empty() {
            return Err(AssistantError::AgentError(
                "session message was empty".to_string(),
            ));
        }
        Ok(text.to_string())
    }
}

/// Result of a session that started.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    pub target: String,
    /// Resolved contact name.
    pub contact: String,
    pub final_phase: SessionPhase,
    pub messages_sent: usize,
    pub messages_received: usize,
    pub send_failures: usize,
    /// Every phase entered, in order.
    pub transitions: Vec<SessionPhase>,
}

pub struct AutonomousSession {
    surface: Box<dyn MessagingSurface>,
    generator: Box<dyn MessageGenerator>,
    poll_interval: Duration,
}

impl AutonomousSession {
    pub fn new(
        surface: Box<dyn MessagingSurface>,
        generator: Box<dyn MessageGenerator>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            surface,
            generator,
            poll_interval,
        }
    }

    /// Run a session with `target` until `cancel` is set.
    ///
    /// `Err(SessionStartFailure)` means nothing was left open. Mid-session failures
    /// (send, poll, generation) are reported and the session keeps polling.
    pub fn run(
        &mut self,
        target: &str,
        cancel: &CancellationSignal,
        status: &StatusReporter,
    ) -> AssistantResult<SessionReport> {
        let target = target.trim();
        if target.is_empty() {
            return Err(AssistantError::SessionStartFailure(
                "no chat target given".to_string(),
            ));
        }

        let mut run = SessionRun::new(target);
        status.update(format!("Entering chat mode with {}...", target), Severity::Session);

        let handle = match self.surface.open(target) {
            Ok(handle) => handle,
            Err(e) => {
                run.enter(SessionPhase::Aborted);
                status.update(
                    format!("Failed to start a chat with {}: {}", target, e),
                    Severity::Error,
                );
                return Err(start_failure(e));
            }
        };
        run.contact = handle.contact.clone();
        run.enter(SessionPhase::Opened);

        // Anything already in the chat is history, not a reply to us.
        match self.surface.poll_reply(&handle) {
            Ok(existing) => run.state.last_seen = existing,
            Err(e) => debug!("Baseline poll failed: {}", e),
        }

        if cancel.is_cancelled() {
            return Ok(self.close(run, &handle, status));
        }

        status.update(
            format!("Thinking of an opening line for {}...", handle.contact),
            Severity::Thinking,
        );
        if let Err(e) = self.send_opener(&mut run, &handle, cancel) {
            self.surface.close(&handle);
            run.enter(SessionPhase::Aborted);
            status.update(
                format!("Failed to send the first message to {}: {}", handle.contact, e),
                Severity::Error,
            );
            return Err(start_failure(e));
        }
        if cancel.is_cancelled() {
            return Ok(self.close(run, &handle, status));
        }

        run.enter(SessionPhase::AwaitingReply);
        status.update(
            format!("Message sent. Waiting for a reply from {}...", handle.contact),
            Severity::Session,
        );

        while !cancel.wait_timeout(self.poll_interval) {
            let incoming = match self.surface.poll_reply(&handle) {
                Ok(Some(text)) => run.state.observe(text),
                Ok(None) => None,
                Err(e) => {
                    warn!("Polling {} failed: {}", handle.contact, e);
                    None
                }
            };
            let Some(incoming) = incoming else {
                continue;
            };

            info!("📨 New message from {}", handle.contact);
            status.update(
                format!("New reply from {}: '{}'", handle.contact, incoming),
                Severity::Success,
            );
            run.state.push(SessionRole::Them, &incoming);
            run.received += 1;

            run.enter(SessionPhase::Composing);
            status.update("Thinking of a reply...", Severity::Thinking);
            self.compose_reply(&mut run, &handle, cancel, status);
            if cancel.is_cancelled() {
                break;
            }
            run.enter(SessionPhase::AwaitingReply);
        }

        Ok(self.close(run, &handle, status))
    }

    fn send_opener(
        &mut self,
        run: &mut SessionRun,
        handle: &ChatHandle,
        cancel: &CancellationSignal,
    ) -> AssistantResult<()> {
        let opener = self.generator.generate(&[])?;
        if cancel.is_cancelled() {
            return Ok(());
        }
        self.surface.send(handle, &opener)?;
        run.state.push(SessionRole::Me, &opener);
        run.sent += 1;
        Ok(())
    }

    fn compose_reply(
        &mut self,
        run: &mut SessionRun,
        handle: &ChatHandle,
        cancel: &CancellationSignal,
        status: &StatusReporter,
    ) {
        let reply = match self.generator.generate(run.state.turns()) {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Could not compose a reply: {}", e);
                status.update(format!("Could not compose a reply: {}", e), Severity::Error);
                return;
            }
        };
        if cancel.is_cancelled() {
            return;
        }
        match self.surface.send(handle, &reply) {
            Ok(()) => {
                run.state.push(SessionRole::Me, &reply);
                run.sent += 1;
                status.update(
                    "Reply sent. Waiting for the next response...",
                    Severity::Session,
                );
            }
            Err(e) => {
                run.send_failures += 1;
                warn!("Reply to {} not delivered: {}", handle.contact, e);
                status.update(
                    format!("Failed to send reply to {}.", handle.contact),
                    Severity::Error,
                );
            }
        }
    }

    fn close(
        &mut self,
        mut run: SessionRun,
        handle: &ChatHandle,
        status: &StatusReporter,
    ) -> SessionReport {
        self.surface.close(handle);
        run.enter(SessionPhase::Closed);
        info!(
            "Exiting chat mode with {} ({} sent, {} received)",
            handle.contact, run.sent, run.received
        );
        status.update(format!("Chat with {} ended.", handle.contact), Severity::Idle);
        run.into_report()
    }
}

fn start_failure(e: AssistantError) -> AssistantError {
    match e {
        AssistantError::SessionStartFailure(_) => e,
        other => AssistantError::SessionStartFailure(other.to_string()),
    }
}

/// Mutable bookkeeping for one `run` call.
struct SessionRun {
    state: SessionState,
    contact: String,
    sent: usize,
    received: usize,
    send_failures: usize,
    transitions: Vec<SessionPhase>,
}

impl SessionRun {
    fn new(target: &str) -> Self {
        Self {
            state: SessionState::new(target),
            contact: String::new(),
            sent: 0,
            received: 0,
            send_failures: 0,
            transitions: vec![SessionPhase::Starting],
        }
    }

    fn enter(&mut self, phase: SessionPhase) {
        debug!(target_name = %self.state.target, "session phase {:?}", phase);
        self.transitions.push(phase);
    }

    fn into_report(self) -> SessionReport {
        SessionReport {
            target: self.state.target,
            contact: self.contact,
            final_phase: self.transitions.last().copied().unwrap_or(SessionPhase::Starting),
            messages_sent: self.sent,
            messages_received: self.received,
            send_failures: self.send_failures,
            transitions: self.transitions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatError;
    use crate::status::status_channel;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Log {
        sent: Vec<String>,
        closed: usize,
    }

    /// Replies are served one per poll; `cancel_after` polls sets the signal.
    struct ScriptedSurface {
        open_ok: bool,
        polls: VecDeque<Option<String>>,
        fail_sends: bool,
        cancel_after: Option<(usize, CancellationSignal)>,
        poll_count: usize,
        log: Arc<Mutex<Log>>,
    }

    impl ScriptedSurface {
        fn new(polls: &[Option<&str>], log: Arc<Mutex<Log>>) -> Self {
            Self {
                open_ok: true,
                polls: polls.iter().map(|p| p.map(str::to_string)).collect(),
                fail_sends: false,
                cancel_after: None,
                poll_count: 0,
                log,
            }
        }
    }

    impl MessagingSurface for ScriptedSurface {
        fn open(&mut self, identity: &str) -> AssistantResult<ChatHandle> {
            if !self.open_ok {
                return Err(AssistantError::SessionStartFailure("no match".into()));
            }
            Ok(ChatHandle {
                id: "c1".into(),
                contact: format!("{} (Work)", identity),
            })
        }

        fn send(&mut self, _handle: &ChatHandle, text: &str) -> AssistantResult<()> {
            if self.fail_sends {
                return Err(AssistantError::SendFailure("offline".into()));
            }
            self.log.lock().unwrap().sent.push(text.to_string());
            Ok(())
        }

        fn poll_reply(&mut self, _handle: &ChatHandle) -> AssistantResult<Option<String>> {
            self.poll_count += 1;
            if let Some((n, cancel)) = &self.cancel_after {
                if self.poll_count >= *n {
                    cancel.cancel();
                }
            }
            Ok(self.polls.pop_front().flatten())
        }

        fn close(&mut self, _handle: &ChatHandle) {
            self.log.lock().unwrap().closed += 1;
        }
    }

    struct CountingGenerator;

    impl MessageGenerator for CountingGenerator {
        fn generate(&self, history: &[SessionTurn]) -> AssistantResult<String> {
            Ok(format!("msg after {}", history.len()))
        }
    }

    fn session(surface: ScriptedSurface) -> AutonomousSession {
        AutonomousSession::new(
            Box::new(surface),
            Box::new(CountingGenerator),
            Duration::from_millis(1),
        )
    }

    #[test]
    fn empty_target_fails_before_opening() {
        let log = Arc::new(Mutex::new(Log::default()));
        let mut s = session(ScriptedSurface::new(&[], log.clone()));
        let (status, _rx) = status_channel();
        let err = s.run("  ", &CancellationSignal::new(), &status).unwrap_err();
        assert!(matches!(err, AssistantError::SessionStartFailure(_)));
        assert!(log.lock().unwrap().sent.is_empty());
    }

    #[test]
    fn open_failure_aborts_without_sending() {
        let log = Arc::new(Mutex::new(Log::default()));
        let mut surface = ScriptedSurface::new(&[], log.clone());
        surface.open_ok = false;
        let (status, mut rx) = status_channel();
        let err = session(surface)
            .run("Aswin", &CancellationSignal::new(), &status)
            .unwrap_err();
        assert!(matches!(err, AssistantError::SessionStartFailure(_)));
        assert!(log.lock().unwrap().sent.is_empty());
        let mut saw_error = false;
        while let Ok(update) = rx.try_recv() {
            saw_error |= update.severity == Severity::Error;
        }
        assert!(saw_error);
    }

    #[test]
    fn opener_send_failure_is_start_failure_and_releases_chat() {
        let log = Arc::new(Mutex::new(Log::default()));
        let mut surface = ScriptedSurface::new(&[], log.clone());
        surface.fail_sends = true;
        let (status, _rx) = status_channel();
        let err = session(surface)
            .run("Aswin", &CancellationSignal::new(), &status)
            .unwrap_err();
        assert!(matches!(err, AssistantError::SessionStartFailure(_)));
        assert_eq!(log.lock().unwrap().closed, 1);
    }

    #[test]
    fn replies_to_new_messages_only() {
        let log = Arc::new(Mutex::new(Log::default()));
        let cancel = CancellationSignal::new();
        // Baseline poll sees an old message; then: same old, new, repeat, none, new.
        let mut surface = ScriptedSurface::new(
            &[Some("old"), Some("old"), Some("hey!"), Some("hey!"), None, Some("lol")],
            log.clone(),
        );
        surface.cancel_after = Some((7, cancel.clone()));
        let (status, _rx) = status_channel();

        let report = session(surface).run("Riya", &cancel, &status).unwrap();

        assert_eq!(report.contact, "Riya (Work)");
        assert_eq!(report.messages_received, 2);
        assert_eq!(report.messages_sent, 3);
        assert_eq!(report.final_phase, SessionPhase::Closed);
        assert_eq!(
            log.lock().unwrap().sent,
            vec!["msg after 0", "msg after 2", "msg after 4"]
        );
        assert_eq!(log.lock().unwrap().closed, 1);
        assert_eq!(
            &report.transitions[..4],
            &[
                SessionPhase::Starting,
                SessionPhase::Opened,
                SessionPhase::AwaitingReply,
                SessionPhase::Composing
            ]
        );
    }

    #[test]
    fn cancel_during_poll_sends_nothing_more() {
        let log = Arc::new(Mutex::new(Log::default()));
        let cancel = CancellationSignal::new();
        // The poll that delivers a new message also sets the signal.
        let mut surface = ScriptedSurface::new(&[None, Some("you there?")], log.clone());
        surface.cancel_after = Some((2, cancel.clone()));
        let (status, _rx) = status_channel();

        let report = session(surface).run("Riya", &cancel, &status).unwrap();

        assert_eq!(report.final_phase, SessionPhase::Closed);
        assert_eq!(report.messages_received, 1);
        assert_eq!(log.lock().unwrap().sent, vec!["msg after 0"]);
    }

    /// Delivers the first message, fails every later send.
    struct FlakySurface {
        inner: ScriptedSurface,
        sends: usize,
    }

    impl MessagingSurface for FlakySurface {
        fn open(&mut self, identity: &str) -> AssistantResult<ChatHandle> {
            self.inner.open(identity)
        }

        fn send(&mut self, handle: &ChatHandle, text: &str) -> AssistantResult<()> {
            self.sends += 1;
            if self.sends > 1 {
                return Err(AssistantError::SendFailure("offline".into()));
            }
            self.inner.send(handle, text)
        }

        fn poll_reply(&mut self, handle: &ChatHandle) -> AssistantResult<Option<String>> {
            self.inner.poll_reply(handle)
        }

        fn close(&mut self, handle: &ChatHandle) {
            self.inner.close(handle)
        }
    }

    #[test]
    fn mid_session_send_failure_keeps_polling() {
        let log = Arc::new(Mutex::new(Log::default()));
        let cancel = CancellationSignal::new();
        let mut inner = ScriptedSurface::new(&[None, Some("hi"), Some("hello?")], log.clone());
        inner.cancel_after = Some((4, cancel.clone()));
        let mut s = AutonomousSession::new(
            Box::new(FlakySurface { inner, sends: 0 }),
            Box::new(CountingGenerator),
            Duration::from_millis(1),
        );
        let (status, _rx) = status_channel();

        let report = s.run("Riya", &cancel, &status).unwrap();

        assert_eq!(report.messages_received, 2);
        assert_eq!(report.messages_sent, 1);
        assert_eq!(report.send_failures, 2);
        assert_eq!(report.final_phase, SessionPhase::Closed);
        assert_eq!(log.lock().unwrap().closed, 1);
    }

    #[test]
    fn generator_maps_roles_and_strips_quotes() {
        struct Echo(Mutex<Vec<ChatMessage>>);
        impl ChatCompletion for Echo {
            fn complete(
                &self,
                messages: &[ChatMessage],
                options: &CompletionOptions,
            ) -> Result<String, ChatError> {
                assert_eq!(options.temperature, 0.8);
                assert_eq!(options.max_tokens, Some(150));
                *self.0.lock().unwrap() = messages.to_vec();
                Ok("\"Hey you 😉\"".to_string())
            }
        }
        let echo = Arc::new(Echo(Mutex::new(Vec::new())));
        let generator = ChatMessageGenerator::new(echo.clone(), "m");
        let history = vec![
            SessionTurn {
                role: SessionRole::Me,
                text: "hi".into(),
                at: Utc::now(),
            },
            SessionTurn {
                role: SessionRole::Them,
                text: "hello".into(),
                at: Utc::now(),
            },
        ];
        assert_eq!(generator.generate(&history).unwrap(), "Hey you 😉");
        let roles: Vec<String> = echo.0.lock().unwrap().iter().map(|m| m.role.clone()).collect();
        assert_eq!(roles, vec!["system", "assistant", "user"]);
    }
}
