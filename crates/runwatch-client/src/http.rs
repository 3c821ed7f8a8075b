//! reqwest-backed implementation of the transport contract.

use std::collections::HashMap;

use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use runwatch_core::{LogEntry, RunEvent, RunId, StructureId};

use crate::config::Config;
use crate::error::TransportError;
use crate::transport::{
    BoxedRunEventStream, EventPage, EventSubmission, RunHandle, RunSnapshot, RunTransport,
};

/// HTTP client for the run service REST API.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    inner: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(serde::Deserialize)]
struct LogsResponse {
    logs: Vec<LogEntry>,
}

impl HttpTransport {
    /// Create a new transport for the given base URL.
    pub fn new(base_url: &str) -> Self {
        Self {
            inner: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: None,
        }
    }

    /// Attach a bearer credential to every request.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Build a transport from a resolved configuration.
    pub fn from_config(config: &Config) -> Self {
        let transport = Self::new(&config.base_url);
        match &config.api_key {
            Some(key) => transport.with_api_key(key),
            None => transport,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn apply_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn check(path: &str, response: reqwest::Response) -> Result<reqwest::Response, TransportError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(TransportError::Api {
            status,
            path: path.to_string(),
            body,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, TransportError> {
        let url = self.endpoint(path);
        debug!(url = %url, "GET request");

        let request = self.apply_auth(self.inner.get(&url)).query(query);
        let response = Self::check(path, request.send().await?).await?;

        response
            .json()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, TransportError> {
        let url = self.endpoint(path);
        debug!(url = %url, "POST request");

        let request = self.apply_auth(self.inner.post(&url)).json(body);
        let response = Self::check(path, request.send().await?).await?;

        response
            .json()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }
}

/// Extract the payload of a server-sent-event `data:` line.
///
/// Returns `None` for comments, blank keep-alive lines, and other SSE
/// fields.
fn sse_data_payload(line: &str) -> Option<&str> {
    let payload = line.trim().strip_prefix("data:")?.trim();
    if payload.is_empty() {
        None
    } else {
        Some(payload)
    }
}

#[async_trait]
impl RunTransport for HttpTransport {
    async fn submit_run(
        &self,
        structure_id: &StructureId,
        env: &HashMap<String, String>,
        args: &[String],
    ) -> Result<RunHandle, TransportError> {
        let env_vars: Vec<_> = env
            .iter()
            .map(|(name, value)| json!({ "name": name, "value": value }))
            .collect();
        let body = json!({ "env_vars": env_vars, "args": args });

        self.post_json(&format!("/api/structures/{structure_id}/runs"), &body)
            .await
    }

    async fn get_run(&self, run_id: &RunId) -> Result<RunSnapshot, TransportError> {
        self.get_json(&format!("/api/structure-runs/{run_id}"), &[])
            .await
    }

    async fn get_events(
        &self,
        run_id: &RunId,
        offset: Option<u64>,
    ) -> Result<EventPage, TransportError> {
        let query: Vec<(&str, String)> = match offset {
            Some(offset) => vec![("offset", offset.to_string())],
            None => Vec::new(),
        };

        self.get_json(&format!("/api/structure-runs/{run_id}/events"), &query)
            .await
    }

    async fn event_stream(&self, run_id: &RunId) -> Result<BoxedRunEventStream, TransportError> {
        let path = format!("/api/structure-runs/{run_id}/events/stream");
        let url = self.endpoint(&path);
        debug!(url = %url, "opening event stream");

        let request = self.apply_auth(self.inner.get(&url));
        let response = Self::check(&path, request.send().await?).await?;

        let stream = try_stream! {
            let mut chunks = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk) = chunks.next().await {
                let bytes = chunk?;
                let text = std::str::from_utf8(&bytes)
                    .map_err(|e| TransportError::Decode(e.to_string()))?;
                buffer.push_str(text);

                while let Some(newline) = buffer.find('\n') {
                    let line: String = buffer.drain(..=newline).collect();
                    let Some(payload) = sse_data_payload(&line) else {
                        continue;
                    };

                    let event: RunEvent = serde_json::from_str(payload)
                        .map_err(|e| TransportError::Decode(e.to_string()))?;
                    yield event;
                }
            }
        };

        Ok(Box::pin(stream))
    }

    async fn get_logs(&self, run_id: &RunId) -> Result<Vec<LogEntry>, TransportError> {
        let response: LogsResponse = self
            .get_json(&format!("/api/structure-runs/{run_id}/logs"), &[])
            .await?;
        Ok(response.logs)
    }

    async fn publish_event(
        &self,
        run_id: &RunId,
        event: &EventSubmission,
    ) -> Result<(), TransportError> {
        let path = format!("/api/structure-runs/{run_id}/events");
        let url = self.endpoint(&path);
        debug!(url = %url, event_type = %event.event_type, "publishing event");

        let request = self.apply_auth(self.inner.post(&url)).json(event);
        Self::check(&path, request.send().await?).await?;
        Ok(())
    }
}
