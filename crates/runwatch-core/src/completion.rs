//! Terminal-state detection for observed runs.
//!
//! The detector folds a run's event feed into a single answer: is the run
//! still going, and if not, how did it end. It is fed every observed event
//! exactly once per position (consumers resume by offset), and its answer
//! never changes once the run is terminal, so replaying an already-seen
//! terminal event is harmless.

use tracing::debug;

use crate::event::{EventOrigin, EventPayload, RunEvent};
use crate::status::{RunStatus, TerminalStatuses};

/// How a finished run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The run succeeded, with its final output when one was reported.
    Succeeded(Option<String>),
    /// The run failed; carries the reported detail.
    Failed(String),
}

/// Answer produced by [`CompletionDetector::completion`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    StillRunning,
    Finished(Verdict),
}

/// Folds observed events into a completion answer.
///
/// The latest SYSTEM-origin status change is the authoritative run status.
/// A USER-origin terminal event carries the definitive payload and takes
/// precedence for the returned verdict; a terminal status alone still ends
/// the run, with `Succeeded(None)` or a generated failure detail.
#[derive(Debug)]
pub struct CompletionDetector {
    terminal: TerminalStatuses,
    status: RunStatus,
    verdict: Option<Verdict>,
}

impl CompletionDetector {
    /// Detector with the canonical terminal-status set.
    pub fn new() -> Self {
        Self::with_terminal_statuses(TerminalStatuses::default())
    }

    /// Detector with a deployment-specific terminal-status set.
    pub fn with_terminal_statuses(terminal: TerminalStatuses) -> Self {
        Self {
            terminal,
            status: RunStatus::default(),
            verdict: None,
        }
    }

    /// Fold one observed event into the detector state.
    pub fn observe(&mut self, event: &RunEvent) {
        match &event.payload {
            EventPayload::RunSucceeded { output } => {
                if self.verdict.is_none() {
                    self.verdict = Some(Verdict::Succeeded(output.clone()));
                }
            }
            EventPayload::RunFailed { status_detail } => {
                if self.verdict.is_none() {
                    self.verdict = Some(Verdict::Failed(status_detail.clone()));
                }
            }
            EventPayload::RunError { error } => {
                if self.verdict.is_none() {
                    self.verdict = Some(Verdict::Failed(error.clone()));
                }
            }
            EventPayload::StatusChange { status } if event.origin == EventOrigin::System => {
                // A terminal status is final; later transitions are ignored.
                if !self.terminal.contains(self.status) {
                    self.status = *status;
                }
            }
            EventPayload::StatusChange { .. } | EventPayload::TextChunk { .. } => {}
            EventPayload::Unrecognized { event_type, .. } => {
                debug!(event_type = %event_type, seq = event.seq, "ignoring unrecognized event");
            }
        }
    }

    /// Latest authoritative run status.
    pub fn status(&self) -> RunStatus {
        self.status
    }

    /// Current completion answer.
    pub fn completion(&self) -> Completion {
        if let Some(verdict) = &self.verdict {
            return Completion::Finished(verdict.clone());
        }

        if self.terminal.contains(self.status) {
            let verdict = match self.status {
                RunStatus::Succeeded => Verdict::Succeeded(None),
                status => Verdict::Failed(format!(
                    "run reached status {status} without a result event"
                )),
            };
            return Completion::Finished(verdict);
        }

        Completion::StillRunning
    }
}

impl Default for CompletionDetector {
    fn default() -> Self {
        Self::new()
    }
}
