//! Error types for the run client.

use thiserror::Error;

/// Failures reaching or speaking to the run service.
///
/// These mean the run could not be observed; they say nothing about
/// whether the run itself succeeded. No retrying happens at this layer.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Network/HTTP failure.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("service returned {status} for {path}: {body}")]
    Api {
        status: reqwest::StatusCode,
        path: String,
        body: String,
    },

    /// The response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

/// Failures while observing a run to completion.
///
/// A run that ran and failed is not an error here; it comes back as
/// [`runwatch_core::Verdict::Failed`] inside a successful result.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The live event stream closed without a terminal event.
    #[error("event stream ended before the run reached a terminal state")]
    StreamExhausted,
}

/// Failures publishing events from a hosted program.
#[derive(Debug, Error)]
pub enum EmitError {
    /// Constructed outside a managed deployment.
    #[error("no run id available; the emitter needs the host-injected run id")]
    MissingRunId,

    #[error(transparent)]
    Transport(#[from] TransportError),
}
