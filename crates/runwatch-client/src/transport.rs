//! Transport contract for the run service.
//!
//! The service is an external collaborator; this module pins down the
//! operations the client consumes and the wire shapes they exchange.

use std::collections::HashMap;
use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use runwatch_core::{EventId, EventOrigin, EventPayload, LogEntry, RunEvent, RunId, RunStatus, StructureId};

use crate::error::TransportError;

/// A newly created run.
#[derive(Debug, Clone, Deserialize)]
pub struct RunHandle {
    pub run_id: RunId,
    pub status: RunStatus,
}

/// Point-in-time snapshot of a run.
#[derive(Debug, Clone, Deserialize)]
pub struct RunSnapshot {
    pub status: RunStatus,
    #[serde(default)]
    pub output: Option<String>,
}

/// One page of events from the polling endpoint.
///
/// `next_offset` is the position to pass to the next fetch; events are
/// ordered by sequence position.
#[derive(Debug, Clone, Deserialize)]
pub struct EventPage {
    pub events: Vec<RunEvent>,
    pub next_offset: u64,
}

/// An event published by a hosted program. The service assigns the
/// sequence position; the client supplies a stable identity so a retried
/// publish is recognizable as a replay.
#[derive(Debug, Clone, Serialize)]
pub struct EventSubmission {
    pub id: EventId,
    pub origin: EventOrigin,
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: Value,
}

impl EventSubmission {
    /// Wrap a payload in a fresh USER-origin envelope.
    pub fn user(payload: &EventPayload) -> Self {
        Self {
            id: EventId::generate(),
            origin: EventOrigin::User,
            event_type: payload.wire_type().to_owned(),
            payload: payload.wire_payload(),
        }
    }
}

/// Live feed of a run's events.
pub type BoxedRunEventStream = Pin<Box<dyn Stream<Item = Result<RunEvent, TransportError>> + Send>>;

/// Operations the run service exposes to this client.
#[async_trait]
pub trait RunTransport: Send + Sync {
    /// Create a run of a structure with the given environment and
    /// arguments.
    async fn submit_run(
        &self,
        structure_id: &StructureId,
        env: &HashMap<String, String>,
        args: &[String],
    ) -> Result<RunHandle, TransportError>;

    /// Current status snapshot of a run.
    async fn get_run(&self, run_id: &RunId) -> Result<RunSnapshot, TransportError>;

    /// Events at or after `offset`, or from the beginning when `None`.
    async fn get_events(
        &self,
        run_id: &RunId,
        offset: Option<u64>,
    ) -> Result<EventPage, TransportError>;

    /// Live event feed, terminated by the service when the run ends.
    async fn event_stream(&self, run_id: &RunId) -> Result<BoxedRunEventStream, TransportError>;

    /// Captured logs; meaningful once the run is terminal.
    async fn get_logs(&self, run_id: &RunId) -> Result<Vec<LogEntry>, TransportError>;

    /// Publish an event onto a run's feed (hosted-program side).
    async fn publish_event(
        &self,
        run_id: &RunId,
        event: &EventSubmission,
    ) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_submission_envelope() {
        let submission = EventSubmission::user(&EventPayload::RunSucceeded {
            output: Some("done".to_string()),
        });

        let json = serde_json::to_value(&submission).unwrap();
        assert_eq!(json["origin"], "USER");
        assert_eq!(json["type"], "run_succeeded");
        assert_eq!(json["payload"]["output"], "done");
        assert!(json["id"].is_string());
    }
}
