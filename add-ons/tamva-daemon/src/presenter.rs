//! Console presentation surface: one coloured line per status update.

use std::io::{self, IsTerminal, Write};
use tamva_core::{Severity, StatusUpdate};

const RESET: &str = "\x1b[0m";

fn colour(severity: Severity) -> &'static str {
    match severity {
        Severity::Idle => "\x1b[90m",
        Severity::Listening => "\x1b[36m",
        Severity::Thinking => "\x1b[33m",
        Severity::Success => "\x1b[32m",
        Severity::Session => "\x1b[35m",
        Severity::Error => "\x1b[31m",
        Severity::Fatal => "\x1b[1;31m",
    }
}

pub struct ConsolePresenter {
    colour: bool,
}

impl ConsolePresenter {
    pub fn new() -> Self {
        Self {
            colour: io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none(),
        }
    }

    pub fn render(&self, update: &StatusUpdate) -> String {
        let time = update.at.with_timezone(&chrono::Local).format("%H:%M:%S");
        let label = format!("{:<9}", update.severity.label().to_uppercase());
        if self.colour {
            let c = colour(update.severity);
            format!("{} {}{}{} {}", time, c, label, RESET, update.text)
        } else {
            format!("{} {} {}", time, label, update.text)
        }
    }

    pub fn show(&self, update: &StatusUpdate) {
        let mut out = io::stdout().lock();
        let _ = writeln!(out, "{}", self.render(update));
        let _ = out.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_rendering_has_label_and_text() {
        let presenter = ConsolePresenter { colour: false };
        let update = StatusUpdate {
            text: "Wake phrase detected! Listening...".to_string(),
            severity: Severity::Listening,
            at: chrono::Utc::now(),
        };
        let line = presenter.render(&update);
        assert!(line.contains("LISTENING"));
        assert!(line.ends_with("Wake phrase detected! Listening..."));
        assert!(!line.contains('\x1b'));
    }
}
