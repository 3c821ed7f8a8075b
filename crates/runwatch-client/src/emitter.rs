//! Completion publishing for hosted programs.
//!
//! A program running inside the service reports its own progress and
//! outcome by publishing events onto its run's feed. The host injects the
//! run id into the program's environment; without it there is nothing to
//! publish onto.

use tracing::debug;

use runwatch_core::{EventPayload, RunId};

use crate::config::Config;
use crate::error::EmitError;
use crate::transport::{EventSubmission, RunTransport};

/// Publishes USER-origin events from inside a hosted program.
pub struct RunEmitter<T> {
    transport: T,
    run_id: RunId,
}

impl<T: RunTransport> RunEmitter<T> {
    /// Emitter for an explicit run id.
    pub fn new(transport: T, run_id: RunId) -> Self {
        Self { transport, run_id }
    }

    /// Emitter for the host-injected run id in `config`.
    pub fn from_config(config: &Config, transport: T) -> Result<Self, EmitError> {
        let run_id = config.run_id.clone().ok_or(EmitError::MissingRunId)?;
        Ok(Self::new(transport, run_id))
    }

    /// The run this emitter publishes onto.
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Report the run as succeeded with its final output.
    pub async fn succeeded(&self, output: impl Into<String>) -> Result<(), EmitError> {
        self.publish(EventPayload::RunSucceeded {
            output: Some(output.into()),
        })
        .await
    }

    /// Report the run as failed.
    pub async fn failed(&self, detail: impl Into<String>) -> Result<(), EmitError> {
        self.publish(EventPayload::RunFailed {
            status_detail: detail.into(),
        })
        .await
    }

    /// Stream an incremental text fragment.
    pub async fn token(&self, fragment: impl Into<String>) -> Result<(), EmitError> {
        self.publish(EventPayload::TextChunk {
            token: fragment.into(),
        })
        .await
    }

    /// Publish an arbitrary payload onto the run's feed.
    pub async fn publish(&self, payload: EventPayload) -> Result<(), EmitError> {
        let event = EventSubmission::user(&payload);
        debug!(run_id = %self.run_id, event_type = %event.event_type, "publishing event");

        self.transport.publish_event(&self.run_id, &event).await?;
        Ok(())
    }
}
