//! One-way status surface from the background worker to the foreground presenter.
//!
//! Updates are fire-and-forget: sending never blocks, and a missing presenter is ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::trace;

/// Visual class of a status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Idle,
    Listening,
    Thinking,
    Success,
    Session,
    Error,
    /// Terminal: the worker has stopped (init failure, input closed).
    Fatal,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Idle => "idle",
            Severity::Listening => "listening",
            Severity::Thinking => "thinking",
            Severity::Success => "success",
            Severity::Session => "session",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Severity::Fatal)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub text: String,
    pub severity: Severity,
    pub at: DateTime<Utc>,
}

/// Sending half of the status channel. Cheap to clone.
#[derive(Debug, Clone)]
pub struct StatusReporter {
    tx: mpsc::UnboundedSender<StatusUpdate>,
}

impl StatusReporter {
    pub fn update(&self, text: impl Into<String>, severity: Severity) {
        let update = StatusUpdate {
            text: text.into(),
            severity,
            at: Utc::now(),
        };
        trace!(severity = severity.label(), "status: {}", update.text);
        // Presenter gone means we are shutting down.
        let _ = self.tx.send(update);
    }
}

/// Create the status channel: the reporter goes to the worker, the receiver to the presenter.
pub fn status_channel() -> (StatusReporter, mpsc::UnboundedReceiver<StatusUpdate>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (StatusReporter { tx }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn updates_arrive_in_order() {
        let (reporter, mut rx) = status_channel();
        reporter.update("Listening...", Severity::Listening);
        reporter.clone().update("Done", Severity::Success);
        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert_eq!(first.text, "Listening...");
        assert_eq!(second.severity, Severity::Success);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn update_without_presenter_is_ignored() {
        let (reporter, rx) = status_channel();
        drop(rx);
        reporter.update("nobody listening", Severity::Idle);
    }

    #[test]
    fn only_fatal_is_terminal() {
        assert!(Severity::Fatal.is_terminal());
        assert!(!Severity::Error.is_terminal());
        assert_eq!(Severity::Session.label(), "session");
    }
}
