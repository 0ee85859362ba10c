//! **TurnController**: one conversational turn per call, looped until cancelled.
//!
//! ```text
//! AwaitingWake → Acknowledging → Capturing → Interpreting → Routing → Responding → Idle
//!                                    │ (no command)                  │
//!                                    └──▶ Idle                        └──▶ InSession(target) → Idle
//! ```
//!
//! Every stage returns a `Result`; `run_turn` folds them into one [`TurnOutcome`]. A failed
//! turn is reported, apologized for on the feedback voice, and followed by a backoff.
//! It never ends the loop. Only cancellation, a closed audio input, or a fatal error does.
//!
//! After the wake phrase, capture waits at most `listen_timeout_ms` for speech to start and
//! stops early on cancellation, so a false wake cannot hold the worker.

use crate::agent::{ReasoningAgent, TranscriptCorrector};
use crate::error::{AssistantError, AssistantResult};
use crate::history::ConversationHistory;
use crate::router::{CommandRouter, RoutingDecision};
use crate::session::{AutonomousSession, SessionReport};
use crate::status::{Severity, StatusReporter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tamva_voice::{
    CancellationSignal, FrameSource, Speaker, SttBackend, UtteranceCapture, WakeDetector,
};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Pause after a failed turn, in milliseconds.
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,

    /// Spoken on the feedback voice right after the wake phrase.
    #[serde(default = "default_ack_cue")]
    pub ack_cue: String,

    /// Spoken on the feedback voice after a failed turn.
    #[serde(default = "default_apology")]
    pub apology: String,

    /// How long to wait for the command to start after the wake phrase. 0 waits forever.
    #[serde(default = "default_listen_timeout_ms")]
    pub listen_timeout_ms: u64,
}

fn default_error_backoff_ms() -> u64 {
    2000
}

fn default_ack_cue() -> String {
    "Yes?".to_string()
}

fn default_apology() -> String {
    "I have run into an unexpected error.".to_string()
}

fn default_listen_timeout_ms() -> u64 {
    8000
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            error_backoff_ms: default_error_backoff_ms(),
            ack_cue: default_ack_cue(),
            apology: default_apology(),
            listen_timeout_ms: default_listen_timeout_ms(),
        }
    }
}

impl RuntimeConfig {
    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    pub fn listen_timeout(&self) -> Option<Duration> {
        (self.listen_timeout_ms > 0).then(|| Duration::from_millis(self.listen_timeout_ms))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    AwaitingWake,
    Acknowledging,
    Capturing,
    Interpreting,
    Routing,
    Responding,
    /// Normal turns are suspended while a chat session runs.
    InSession(String),
}

#[derive(Debug)]
pub enum TurnOutcome {
    /// Nothing usable was said.
    NoOp,
    /// A fast action or the agent answered.
    Responded { decision: RoutingDecision, response: String },
    /// A chat session ran and was closed by cancellation.
    SessionEnded(SessionReport),
    /// The chat session could not start; control returns to the turn loop.
    SessionAborted(String),
    Failed(AssistantError),
    Cancelled,
    /// The frame stream ended. Nothing more can be heard.
    InputClosed,
}

/// Why `run` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Cancelled,
    InputClosed,
    /// A turn failed with an error no later turn can recover from.
    Fatal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub turns: usize,
    pub responses: usize,
    pub sessions: usize,
    pub failures: usize,
    pub exit: ExitReason,
}

/// Everything a turn talks to. Built on the worker thread; audio handles are not `Send`.
pub struct TurnCollaborators {
    pub frames: Box<dyn FrameSource>,
    pub wake: Box<dyn WakeDetector>,
    pub capture: UtteranceCapture,
    pub stt: Arc<dyn SttBackend>,
    pub corrector: Box<dyn TranscriptCorrector>,
    pub router: CommandRouter,
    pub agent: Box<dyn ReasoningAgent>,
    pub session: AutonomousSession,
    pub speaker: Box<dyn Speaker>,
    pub history: Box<dyn ConversationHistory>,
}

pub struct TurnController {
    parts: TurnCollaborators,
    config: RuntimeConfig,
    status: StatusReporter,
    cancel: CancellationSignal,
    phase: TurnPhase,
}

impl TurnController {
    pub fn new(
        parts: TurnCollaborators,
        config: RuntimeConfig,
        status: StatusReporter,
        cancel: CancellationSignal,
    ) -> Self {
        Self {
            parts,
            config,
            status,
            cancel,
            phase: TurnPhase::Idle,
        }
    }

    pub fn phase(&self) -> &TurnPhase {
        &self.phase
    }

    pub fn history(&self) -> &dyn ConversationHistory {
        self.parts.history.as_ref()
    }

    fn enter(&mut self, phase: TurnPhase) {
        debug!("turn phase {:?}", phase);
        self.phase = phase;
    }

    /// Run one turn. Never panics on collaborator failure; errors come back as `Failed`.
    pub fn run_turn(&mut self) -> TurnOutcome {
        let outcome = match self.try_turn() {
            Ok(outcome) => outcome,
            Err(e) => TurnOutcome::Failed(e),
        };
        self.enter(TurnPhase::Idle);
        outcome
    }

    fn try_turn(&mut self) -> AssistantResult<TurnOutcome> {
        if self.cancel.is_cancelled() {
            return Ok(TurnOutcome::Cancelled);
        }

        self.enter(TurnPhase::AwaitingWake);
        self.status
            .update("Idle. Listening for wake phrase...", Severity::Idle);
        // Whatever queued while we were busy is stale, our own voice included.
        self.parts.frames.discard_pending();
        let triggered = self
            .parts
            .wake
            .wait_for_trigger(self.parts.frames.as_mut(), &self.cancel)?;
        if self.cancel.is_cancelled() {
            return Ok(TurnOutcome::Cancelled);
        }
        if !triggered {
            return Ok(TurnOutcome::InputClosed);
        }

        self.enter(TurnPhase::Acknowledging);
        self.status
            .update("Wake phrase detected! Listening...", Severity::Listening);
        self.parts.speaker.speak_feedback(&self.config.ack_cue);
        // Frames queued during the cue would be the cue itself.
        self.parts.frames.discard_pending();

        self.enter(TurnPhase::Capturing);
        let captured = self.parts.capture.capture_within(
            self.parts.frames.as_mut(),
            &self.cancel,
            self.config.listen_timeout(),
        )?;
        let Some(utterance) = captured else {
            if self.cancel.is_cancelled() {
                return Ok(TurnOutcome::Cancelled);
            }
            if self.parts.capture.stream_ended() {
                return Ok(TurnOutcome::InputClosed);
            }
            debug!("No command captured");
            return Ok(TurnOutcome::NoOp);
        };

        self.enter(TurnPhase::Interpreting);
        self.status.update("Transcribing...", Severity::Thinking);
        let raw = self
            .parts
            .stt
            .transcribe(&utterance)
            .map_err(|e| AssistantError::TranscriptionError(e.to_string()))?;
        let text = self.parts.corrector.correct(&raw).trim().to_string();
        if text.is_empty() {
            debug!("Transcription was empty");
            return Ok(TurnOutcome::NoOp);
        }
        info!("🗣️ Heard: '{}'", text);

        self.enter(TurnPhase::Routing);
        let decision = self.parts.router.route(&text);

        match decision {
            RoutingDecision::FastAction(result) => {
                self.status
                    .update(format!("Executing: '{}'", text), Severity::Success);
                self.respond(&text, RoutingDecision::FastAction(result.clone()), result)
            }
            RoutingDecision::AgentRequest(request) => {
                self.status
                    .update(format!("Thinking about: '{}'", request), Severity::Thinking);
                let response = self
                    .parts
                    .agent
                    .run(&request, self.parts.history.turns())?;
                self.respond(&text, RoutingDecision::AgentRequest(request), response)
            }
            RoutingDecision::SessionRequest(target) => Ok(self.enter_session(&text, target)),
        }
    }

    fn respond(
        &mut self,
        user_text: &str,
        decision: RoutingDecision,
        response: String,
    ) -> AssistantResult<TurnOutcome> {
        self.enter(TurnPhase::Responding);
        self.record(user_text, &response);
        self.status.update("Responding...", Severity::Success);
        self.parts.speaker.speak_primary(&response);
        Ok(TurnOutcome::Responded { decision, response })
    }

    fn enter_session(&mut self, user_text: &str, target: String) -> TurnOutcome {
        self.enter(TurnPhase::InSession(target.clone()));
        let ack = format!("Starting a chat with {}.", target);
        self.record(user_text, &ack);
        self.parts.speaker.speak_primary(&ack);

        let result = self.parts.session.run(&target, &self.cancel, &self.status);
        // Nothing read the microphone during the session.
        self.parts.frames.discard_pending();
        match result {
            Ok(report) => TurnOutcome::SessionEnded(report),
            Err(e) => {
                warn!("Chat session with {} did not start: {}", target, e);
                self.parts
                    .speaker
                    .speak_feedback(&format!("I couldn't start a chat with {}.", target));
                TurnOutcome::SessionAborted(e.to_string())
            }
        }
    }

    fn record(&mut self, user_text: &str, assistant_text: &str) {
        if let Err(e) = self.parts.history.append_exchange(user_text, assistant_text) {
            warn!("Could not record conversation turn: {}", e);
        }
    }

    /// Loop turns until cancelled or the audio input closes.
    pub fn run(&mut self) -> RunSummary {
        info!("🚀 Turn loop started");
        let mut summary = RunSummary {
            turns: 0,
            responses: 0,
            sessions: 0,
            failures: 0,
            exit: ExitReason::Cancelled,
        };

        loop {
            let outcome = self.run_turn();
            summary.turns += 1;
            match outcome {
                TurnOutcome::NoOp => {}
                TurnOutcome::Responded { .. } => summary.responses += 1,
                TurnOutcome::SessionEnded(report) => {
                    summary.sessions += 1;
                    debug!("Session report: {:?}", report);
                }
                TurnOutcome::SessionAborted(reason) => {
                    self.status
                        .update(format!("Chat session failed: {}", reason), Severity::Error);
                }
                TurnOutcome::Failed(e) if e.is_fatal() => {
                    summary.failures += 1;
                    error!("Turn failed fatally: {}", e);
                    self.status.update(format!("FATAL: {}", e), Severity::Fatal);
                    summary.exit = ExitReason::Fatal;
                    break;
                }
                TurnOutcome::Failed(e) => {
                    summary.failures += 1;
                    error!("Turn failed: {}", e);
                    self.status.update(format!("Error: {}", e), Severity::Error);
                    self.parts.speaker.speak_feedback(&self.config.apology);
                    if self.cancel.wait_timeout(self.config.error_backoff()) {
                        break;
                    }
                }
                TurnOutcome::Cancelled => break,
                TurnOutcome::InputClosed => {
                    error!("Audio input closed");
                    self.status
                        .update("Audio input closed. Assistant stopped.", Severity::Fatal);
                    summary.exit = ExitReason::InputClosed;
                    break;
                }
            }
            if self.cancel.is_cancelled() {
                break;
            }
        }

        info!(
            "Turn loop stopped after {} turns ({} failed)",
            summary.turns, summary.failures
        );
        summary
    }
}

/// What the runtime's worker thread drives.
pub trait TurnLoop {
    fn run(&mut self) -> RunSummary;
}

impl TurnLoop for TurnController {
    fn run(&mut self) -> RunSummary {
        TurnController::run(self)
    }
}
