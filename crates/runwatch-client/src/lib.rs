//! Client library for the structure run service.
//!
//! Submits runs, observes their event feed (offset polling or a live
//! stream) until a terminal state, fetches logs, and lets hosted programs
//! publish their own completion events back to the host.

pub mod config;
pub mod emitter;
pub mod error;
pub mod http;
pub mod transport;
pub mod watcher;

pub use config::{Config, Deployment};
pub use emitter::RunEmitter;
pub use error::{EmitError, TransportError, WatchError};
pub use http::HttpTransport;
pub use transport::{
    BoxedRunEventStream, EventPage, EventSubmission, RunHandle, RunSnapshot, RunTransport,
};
pub use watcher::{RunOutcome, Watcher};
