//! Client configuration.
//!
//! All environment access happens here, once, at startup. The rest of the
//! crate receives an explicit [`Config`] value.

use std::env;
use std::time::Duration;

use tracing::warn;

use runwatch_core::{RunId, StructureId};

/// Base URL used when none is configured (the local emulator default).
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000";

/// Base URL of the run service.
pub const ENV_BASE_URL: &str = "RUNWATCH_BASE_URL";
/// Id of the structure to run.
pub const ENV_STRUCTURE_ID: &str = "RUNWATCH_STRUCTURE_ID";
/// Bearer credential for a networked deployment.
pub const ENV_API_KEY: &str = "RUNWATCH_API_KEY";
/// Inter-poll delay override, in milliseconds.
pub const ENV_POLL_INTERVAL_MS: &str = "RUNWATCH_POLL_INTERVAL_MS";
/// Run id injected by the host into hosted programs.
pub const ENV_RUN_ID: &str = "RUNWATCH_RUN_ID";

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How this process is deployed relative to the run service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deployment {
    /// Running inside the service itself; the host injected a run id and
    /// expects authorized calls.
    Managed,
    /// Running against a local or loopback service; no credential needed.
    Local,
}

/// Client configuration value object.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the run service.
    pub base_url: String,
    /// Structure to submit runs for.
    pub structure_id: Option<StructureId>,
    /// Bearer credential attached to every request when present.
    pub api_key: Option<String>,
    /// Delay between event polls.
    pub poll_interval: Duration,
    /// Run id injected by the host, present only in managed deployments.
    pub run_id: Option<RunId>,
    /// Deployment capability flag, resolved once at startup.
    pub deployment: Deployment,
}

impl Config {
    /// Configuration for a given service URL, with defaults everywhere
    /// else.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            structure_id: None,
            api_key: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            run_id: None,
            deployment: Deployment::Local,
        }
    }

    /// Set the structure id.
    pub fn with_structure_id(mut self, id: StructureId) -> Self {
        self.structure_id = Some(id);
        self
    }

    /// Set the bearer credential.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the inter-poll delay.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Resolve configuration from the process environment.
    ///
    /// A host-injected run id marks the deployment as managed. Managed
    /// deployments without a credential are allowed to proceed (the local
    /// emulator does not validate calls) but get a warning, since the
    /// hosted service rejects unauthorized requests.
    pub fn from_env() -> Self {
        let run_id = env::var(ENV_RUN_ID).ok().map(RunId::new);
        let deployment = if run_id.is_some() {
            Deployment::Managed
        } else {
            Deployment::Local
        };

        let api_key = env::var(ENV_API_KEY).ok();
        if deployment == Deployment::Managed && api_key.is_none() {
            warn!(
                env = ENV_API_KEY,
                "no API key configured for a managed deployment; calls to the host will not be authorized"
            );
        }

        let poll_interval = match env::var(ENV_POLL_INTERVAL_MS) {
            Ok(raw) => match raw.parse::<u64>() {
                Ok(ms) => Duration::from_millis(ms),
                Err(_) => {
                    warn!(env = ENV_POLL_INTERVAL_MS, value = %raw, "not a millisecond count; using default");
                    DEFAULT_POLL_INTERVAL
                }
            },
            Err(_) => DEFAULT_POLL_INTERVAL,
        };

        Self {
            base_url: env::var(ENV_BASE_URL).unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            structure_id: env::var(ENV_STRUCTURE_ID).ok().map(StructureId::new),
            api_key,
            poll_interval,
            run_id,
            deployment,
        }
    }
}
