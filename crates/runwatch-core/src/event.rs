//! Typed run events and their wire envelope.
//!
//! The run service delivers a heterogeneous feed of events per run. Each
//! record arrives as `{id, origin, seq, type, payload}`; classification
//! into [`EventPayload`] is total, with unrecognized types preserved as
//! [`EventPayload::Unrecognized`] rather than rejected.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::ids::EventId;
use crate::status::RunStatus;

/// Where an event was produced: the host infrastructure or the hosted
/// program itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventOrigin {
    System,
    User,
}

/// An event observed on a run's feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawEvent", into = "RawEvent")]
pub struct RunEvent {
    /// Stable identity of the event.
    pub id: EventId,
    /// Origin of the event.
    pub origin: EventOrigin,
    /// Position in the run's event sequence; strictly increasing.
    pub seq: u64,
    /// Classified event content.
    pub payload: EventPayload,
}

impl RunEvent {
    /// Create an event with a generated identity.
    pub fn new(origin: EventOrigin, seq: u64, payload: EventPayload) -> Self {
        Self {
            id: EventId::generate(),
            origin,
            seq,
            payload,
        }
    }

    /// The text fragment carried by a streaming event, if any.
    pub fn token(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::TextChunk { token } => Some(token),
            _ => None,
        }
    }
}

/// Classified content of a run event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    /// Incremental text fragment produced while the run is generating.
    TextChunk { token: String },
    /// The hosted program finished and reported its final output.
    RunSucceeded { output: Option<String> },
    /// The hosted program finished and reported failure.
    RunFailed { status_detail: String },
    /// The host infrastructure aborted the run.
    RunError { error: String },
    /// Status transition reported by the host.
    StatusChange { status: RunStatus },
    /// Any event type this client does not understand. Tolerated, never
    /// fatal.
    Unrecognized { event_type: String, payload: Value },
}

#[derive(Deserialize)]
struct TextChunkPayload {
    token: String,
}

#[derive(Deserialize)]
struct RunSucceededPayload {
    #[serde(default)]
    output: Option<String>,
}

#[derive(Deserialize)]
struct RunFailedPayload {
    status_detail: String,
}

#[derive(Deserialize)]
struct RunErrorPayload {
    error: String,
}

#[derive(Deserialize)]
struct StatusChangePayload {
    status: RunStatus,
}

impl EventPayload {
    /// Classify a raw `type`/`payload` pair.
    ///
    /// Total: every input maps to exactly one variant. Unknown type tags
    /// and malformed payloads both land in [`EventPayload::Unrecognized`]
    /// with the original record intact.
    pub fn classify(event_type: String, payload: Value) -> Self {
        let parsed = match event_type.as_str() {
            "text_chunk" => serde_json::from_value(payload.clone())
                .ok()
                .map(|TextChunkPayload { token }| Self::TextChunk { token }),
            "run_succeeded" => serde_json::from_value(payload.clone())
                .ok()
                .map(|RunSucceededPayload { output }| Self::RunSucceeded { output }),
            "run_failed" => serde_json::from_value(payload.clone())
                .ok()
                .map(|RunFailedPayload { status_detail }| Self::RunFailed { status_detail }),
            "run_error" => serde_json::from_value(payload.clone())
                .ok()
                .map(|RunErrorPayload { error }| Self::RunError { error }),
            "status_change" => serde_json::from_value(payload.clone())
                .ok()
                .map(|StatusChangePayload { status }| Self::StatusChange { status }),
            _ => None,
        };

        match parsed {
            Some(payload) => payload,
            None => Self::Unrecognized {
                event_type,
                payload,
            },
        }
    }

    /// Wire-format type tag of the event.
    pub fn wire_type(&self) -> &str {
        match self {
            Self::TextChunk { .. } => "text_chunk",
            Self::RunSucceeded { .. } => "run_succeeded",
            Self::RunFailed { .. } => "run_failed",
            Self::RunError { .. } => "run_error",
            Self::StatusChange { .. } => "status_change",
            Self::Unrecognized { event_type, .. } => event_type,
        }
    }

    /// Wire-format payload object of the event.
    pub fn wire_payload(&self) -> Value {
        match self {
            Self::TextChunk { token } => json!({ "token": token }),
            Self::RunSucceeded { output } => json!({ "output": output }),
            Self::RunFailed { status_detail } => json!({ "status_detail": status_detail }),
            Self::RunError { error } => json!({ "error": error }),
            Self::StatusChange { status } => json!({ "status": status }),
            Self::Unrecognized { payload, .. } => payload.clone(),
        }
    }
}

/// Wire envelope of a run event, before classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    pub id: EventId,
    pub origin: EventOrigin,
    pub seq: u64,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub payload: Value,
}

impl From<RawEvent> for RunEvent {
    fn from(raw: RawEvent) -> Self {
        Self {
            id: raw.id,
            origin: raw.origin,
            seq: raw.seq,
            payload: EventPayload::classify(raw.event_type, raw.payload),
        }
    }
}

impl From<RunEvent> for RawEvent {
    fn from(event: RunEvent) -> Self {
        Self {
            event_type: event.payload.wire_type().to_owned(),
            payload: event.payload.wire_payload(),
            id: event.id,
            origin: event.origin,
            seq: event.seq,
        }
    }
}
