//! Fast-path actions: phrases handled locally with no agent call.
//!
//! Each binding is a nullary action returning the text to speak. System side effects
//! (mixer, launching the calculator) are best-effort; a failed command is logged and the
//! confirmation is still returned for volume changes.

use std::fmt;
use std::process::Command;
use tracing::{info, warn};

pub type FastAction = Box<dyn Fn() -> String + Send + Sync>;

/// Ordered phrase → action table. Earlier bindings win when several phrases match.
#[derive(Default)]
pub struct FastPathTable {
    entries: Vec<(String, FastAction)>,
}

impl fmt::Debug for FastPathTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FastPathTable")
            .field("phrases", &self.phrases().collect::<Vec<_>>())
            .finish()
    }
}

impl FastPathTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Volume up/down/mute and the calculator.
    pub fn with_defaults() -> Self {
        Self::new()
            .bind("increase volume", || control_volume(VolumeChange::Up))
            .bind("decrease volume", || control_volume(VolumeChange::Down))
            .bind("mute", || control_volume(VolumeChange::Mute))
            .bind("open calculator", open_calculator)
    }

    /// Add a binding. The phrase is matched case-insensitively.
    pub fn bind(
        mut self,
        phrase: impl Into<String>,
        action: impl Fn() -> String + Send + Sync + 'static,
    ) -> Self {
        self.entries
            .push((phrase.into().to_lowercase(), Box::new(action)));
        self
    }

    /// First binding whose phrase occurs in `lowered`.
    pub fn find(&self, lowered: &str) -> Option<(&str, &FastAction)> {
        self.entries
            .iter()
            .find(|(phrase, _)| lowered.contains(phrase.as_str()))
            .map(|(phrase, action)| (phrase.as_str(), action))
    }

    pub fn phrases(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(p, _)| p.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeChange {
    Up,
    Down,
    Mute,
}

impl fmt::Display for VolumeChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VolumeChange::Up => "up",
            VolumeChange::Down => "down",
            VolumeChange::Mute => "mute",
        })
    }
}

pub fn control_volume(change: VolumeChange) -> String {
    info!("🔊 Setting volume: {}", change);
    if let Some(mut cmd) = volume_command(change) {
        match cmd.status() {
            Ok(status) if status.success() => {}
            Ok(status) => warn!("Volume command exited with {}", status),
            Err(e) => warn!("Volume command failed: {}", e),
        }
    }
    format!("Volume set to {}.", change)
}

fn volume_command(change: VolumeChange) -> Option<Command> {
    if cfg!(target_os = "linux") {
        let arg = match change {
            VolumeChange::Up => "5%+",
            VolumeChange::Down => "5%-",
            VolumeChange::Mute => "toggle",
        };
        let mut cmd = Command::new("amixer");
        cmd.args(["-q", "sset", "Master", arg]);
        Some(cmd)
    } else if cfg!(target_os = "macos") {
        let script = match change {
            VolumeChange::Up => "set volume output volume ((output volume of (get volume settings)) + 6)",
            VolumeChange::Down => "set volume output volume ((output volume of (get volume settings)) - 6)",
            VolumeChange::Mute => "set volume output muted not (output muted of (get volume settings))",
        };
        let mut cmd = Command::new("osascript");
        cmd.args(["-e", script]);
        Some(cmd)
    } else {
        None
    }
}

pub fn open_calculator() -> String {
    let mut cmd = if cfg!(target_os = "windows") {
        Command::new("calc")
    } else if cfg!(target_os = "macos") {
        let mut c = Command::new("open");
        c.args(["-a", "Calculator"]);
        c
    } else {
        Command::new("gnome-calculator")
    };
    match cmd.spawn() {
        Ok(_) => "Opening calculator.".to_string(),
        Err(e) => {
            warn!("Could not launch calculator: {}", e);
            "I couldn't open the calculator.".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_binds_expected_phrases() {
        let table = FastPathTable::with_defaults();
        let phrases: Vec<&str> = table.phrases().collect();
        assert_eq!(
            phrases,
            vec!["increase volume", "decrease volume", "mute", "open calculator"]
        );
    }

    #[test]
    fn find_is_substring_and_ordered() {
        let table = FastPathTable::new()
            .bind("Mute", || "muted".to_string())
            .bind("mute the tv", || "tv".to_string());
        let (phrase, action) = table.find("please mute the tv").unwrap();
        assert_eq!(phrase, "mute");
        assert_eq!(action(), "muted");
        assert!(table.find("volume up").is_none());
    }

    #[test]
    fn volume_confirmation_text() {
        assert_eq!(VolumeChange::Down.to_string(), "down");
        assert_eq!(format!("Volume set to {}.", VolumeChange::Mute), "Volume set to mute.");
    }
}
