use std::{
    fmt::Display,
    sync::{LazyLock, RwLock},
};

use aptsync_events::PhaseState;
use nu_ansi_term::Color::{self, Blue, Cyan, Green, Red, Yellow};

pub struct Icons;

impl Icons {
    pub const CHECK: &str = "✓";
    pub const CROSS: &str = "✗";
    pub const PENDING: &str = "○";
    pub const RUNNING: &str = "…";
}

pub static COLOR: LazyLock<RwLock<bool>> = LazyLock::new(|| RwLock::new(true));
pub static PROGRESS: LazyLock<RwLock<bool>> = LazyLock::new(|| RwLock::new(true));

pub fn progress_enabled() -> bool {
    *PROGRESS.read().unwrap_or_else(|e| e.into_inner())
}

pub fn set_color(enabled: bool) {
    *COLOR.write().unwrap_or_else(|e| e.into_inner()) = enabled;
}

pub fn set_progress(enabled: bool) {
    *PROGRESS.write().unwrap_or_else(|e| e.into_inner()) = enabled;
}

pub struct Colored<T: Display>(pub Color, pub T);

impl<T: Display> Display for Colored<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let color = COLOR.read().unwrap_or_else(|e| e.into_inner());
        if *color {
            write!(f, "{}", self.0.prefix())?;
            self.1.fmt(f)?;
            write!(f, "{}", self.0.suffix())
        } else {
            self.1.fmt(f)
        }
    }
}

/// Phase state with its icon, coloured by outcome.
pub fn state_label(state: PhaseState) -> String {
    let (color, icon) = match state {
        PhaseState::NotStarted => (Blue, Icons::PENDING),
        PhaseState::Running => (Cyan, Icons::RUNNING),
        PhaseState::Success => (Green, Icons::CHECK),
        PhaseState::Failed => (Red, Icons::CROSS),
        PhaseState::Skipped => (Yellow, Icons::PENDING),
    };
    Colored(color, format!("{icon} {state}")).to_string()
}

pub fn format_seconds(seconds: Option<u64>) -> String {
    match seconds {
        Some(s) if s >= 60 => format!("{}m{:02}s", s / 60, s % 60),
        Some(s) => format!("{s}s"),
        None => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_seconds() {
        assert_eq!(format_seconds(None), "-");
        assert_eq!(format_seconds(Some(7)), "7s");
        assert_eq!(format_seconds(Some(125)), "2m05s");
    }

    #[test]
    fn test_state_label_text() {
        assert!(state_label(PhaseState::Failed).contains("failed"));
        assert!(state_label(PhaseState::NotStarted).contains("not-started"));
    }
}
