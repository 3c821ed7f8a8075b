//! Run status enumeration and the terminal-status set.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a Run as reported by the run service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// Run accepted but not yet started.
    #[default]
    Queued,
    /// Run actively executing.
    Running,
    /// Run completed successfully.
    Succeeded,
    /// Run completed and reported failure.
    Failed,
    /// Run was cancelled by user or system.
    Cancelled,
    /// Run was aborted by the host infrastructure.
    Error,
}

impl RunStatus {
    /// Wire-format name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The set of statuses after which a run can no longer change.
///
/// Whether CANCELLED and ERROR are terminal varies between service
/// contract versions, so the set is injected into the completion detector
/// instead of hard-coded. This is the only terminal list in the workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalStatuses(Vec<RunStatus>);

impl TerminalStatuses {
    /// Build a terminal set from an explicit list of statuses.
    pub fn new(statuses: impl IntoIterator<Item = RunStatus>) -> Self {
        Self(statuses.into_iter().collect())
    }

    /// Whether the given status ends a run.
    pub fn contains(&self, status: RunStatus) -> bool {
        self.0.contains(&status)
    }
}

impl Default for TerminalStatuses {
    fn default() -> Self {
        Self::new([
            RunStatus::Succeeded,
            RunStatus::Failed,
            RunStatus::Cancelled,
            RunStatus::Error,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_format() {
        let json = serde_json::to_string(&RunStatus::Succeeded).unwrap();
        assert_eq!(json, r#""SUCCEEDED""#);

        let status: RunStatus = serde_json::from_str(r#""CANCELLED""#).unwrap();
        assert_eq!(status, RunStatus::Cancelled);
    }

    #[test]
    fn test_default_terminal_set() {
        let terminal = TerminalStatuses::default();
        assert!(terminal.contains(RunStatus::Succeeded));
        assert!(terminal.contains(RunStatus::Failed));
        assert!(terminal.contains(RunStatus::Cancelled));
        assert!(terminal.contains(RunStatus::Error));
        assert!(!terminal.contains(RunStatus::Queued));
        assert!(!terminal.contains(RunStatus::Running));
    }

    #[test]
    fn test_custom_terminal_set() {
        let terminal = TerminalStatuses::new([RunStatus::Succeeded, RunStatus::Failed]);
        assert!(!terminal.contains(RunStatus::Cancelled));
    }
}
