//! Run observation: polling and push-stream consumers.
//!
//! A watcher owns one run observation at a time: it pulls events, forwards
//! streaming tokens for display the moment they arrive, feeds every event
//! into a completion detector, and returns once the run is terminal.
//! Observing several runs concurrently means one watcher per run; no state
//! is shared between observations.

use std::collections::HashMap;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use runwatch_core::{
    Completion, CompletionDetector, LogEntry, RunEvent, RunId, StructureId, TerminalStatuses,
    Verdict,
};

use crate::error::WatchError;
use crate::transport::{RunHandle, RunTransport};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Final result of observing a run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: RunId,
    /// How the run ended. A failed run is a verdict, not an error.
    pub verdict: Verdict,
    /// Logs captured by the service, fetched once after the terminal
    /// state.
    pub logs: Vec<LogEntry>,
}

/// Observes runs on a transport until they reach a terminal state.
pub struct Watcher<T> {
    transport: T,
    poll_interval: Duration,
    terminal: TerminalStatuses,
}

impl<T: RunTransport> Watcher<T> {
    /// Watcher with the canonical terminal-status set and a 1s poll
    /// interval.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            poll_interval: DEFAULT_POLL_INTERVAL,
            terminal: TerminalStatuses::default(),
        }
    }

    /// Set the delay between event polls.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set a deployment-specific terminal-status set.
    pub fn with_terminal_statuses(mut self, terminal: TerminalStatuses) -> Self {
        self.terminal = terminal;
        self
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Submit a run for the given structure.
    pub async fn submit(
        &self,
        structure_id: &StructureId,
        env: &HashMap<String, String>,
        args: &[String],
    ) -> Result<RunHandle, WatchError> {
        let handle = self.transport.submit_run(structure_id, env, args).await?;
        debug!(run_id = %handle.run_id, status = %handle.status, "run created");
        Ok(handle)
    }

    /// Observe a run by polling its event feed.
    ///
    /// Fetches events past the last-seen offset, applies each batch, and
    /// sleeps `poll_interval` between fetches. Runs without bound: a job
    /// that never terminates keeps the loop alive, so callers wanting a
    /// ceiling wrap this in `tokio::time::timeout`. Cancelling between
    /// iterations is safe; the offset only advances after a batch is fully
    /// applied.
    pub async fn watch(
        &self,
        run_id: &RunId,
        tokens: mpsc::UnboundedSender<String>,
    ) -> Result<RunOutcome, WatchError> {
        let mut detector = CompletionDetector::with_terminal_statuses(self.terminal.clone());
        let mut offset = None;

        loop {
            let page = self.transport.get_events(run_id, offset).await?;
            for event in &page.events {
                Self::apply(event, &tokens, &mut detector);
            }
            offset = Some(page.next_offset);

            if let Completion::Finished(verdict) = detector.completion() {
                return self.conclude(run_id, verdict).await;
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Observe a run over its live event stream.
    ///
    /// Hangs up as soon as the run is terminal instead of waiting for the
    /// service to close the feed. A stream that ends without a terminal
    /// event is reported as [`WatchError::StreamExhausted`].
    pub async fn watch_stream(
        &self,
        run_id: &RunId,
        tokens: mpsc::UnboundedSender<String>,
    ) -> Result<RunOutcome, WatchError> {
        let mut detector = CompletionDetector::with_terminal_statuses(self.terminal.clone());
        let mut events = self.transport.event_stream(run_id).await?;

        let verdict = loop {
            let Some(event) = events.next().await else {
                return Err(WatchError::StreamExhausted);
            };
            let event = event?;
            Self::apply(&event, &tokens, &mut detector);

            if let Completion::Finished(verdict) = detector.completion() {
                break verdict;
            }
        };

        // Hang up before fetching logs.
        drop(events);
        self.conclude(run_id, verdict).await
    }

    fn apply(
        event: &RunEvent,
        tokens: &mpsc::UnboundedSender<String>,
        detector: &mut CompletionDetector,
    ) {
        if let Some(token) = event.token() {
            if tokens.send(token.to_owned()).is_err() {
                warn!(seq = event.seq, "token receiver dropped");
            }
        }
        detector.observe(event);
    }

    async fn conclude(&self, run_id: &RunId, verdict: Verdict) -> Result<RunOutcome, WatchError> {
        let logs = self.transport.get_logs(run_id).await?;
        debug!(run_id = %run_id, log_lines = logs.len(), "run finished");

        Ok(RunOutcome {
            run_id: run_id.clone(),
            verdict,
            logs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use runwatch_core::{EventOrigin, EventPayload, LogStream, RunStatus};

    use crate::error::TransportError;
    use crate::transport::{BoxedRunEventStream, EventPage, EventSubmission, RunSnapshot};

    fn text_chunk(seq: u64, token: &str) -> RunEvent {
        RunEvent::new(
            EventOrigin::User,
            seq,
            EventPayload::TextChunk {
                token: token.to_string(),
            },
        )
    }

    fn succeeded(seq: u64, output: &str) -> RunEvent {
        RunEvent::new(
            EventOrigin::User,
            seq,
            EventPayload::RunSucceeded {
                output: Some(output.to_string()),
            },
        )
    }

    fn status_change(seq: u64, status: RunStatus) -> RunEvent {
        RunEvent::new(
            EventOrigin::System,
            seq,
            EventPayload::StatusChange { status },
        )
    }

    /// Transport serving scripted event pages and recording the offsets it
    /// was asked for.
    struct PagedTransport {
        pages: Mutex<Vec<EventPage>>,
        offsets_seen: Mutex<Vec<Option<u64>>>,
        logs: Vec<LogEntry>,
    }

    impl PagedTransport {
        fn new(pages: Vec<EventPage>) -> Self {
            Self {
                pages: Mutex::new(pages),
                offsets_seen: Mutex::new(Vec::new()),
                logs: vec![LogEntry {
                    stream: LogStream::Stdout,
                    message: "started".to_string(),
                }],
            }
        }
    }

    #[async_trait]
    impl RunTransport for PagedTransport {
        async fn submit_run(
            &self,
            _structure_id: &StructureId,
            _env: &HashMap<String, String>,
            _args: &[String],
        ) -> Result<RunHandle, TransportError> {
            Ok(RunHandle {
                run_id: RunId::new("run-1"),
                status: RunStatus::Queued,
            })
        }

        async fn get_run(&self, _run_id: &RunId) -> Result<RunSnapshot, TransportError> {
            Ok(RunSnapshot {
                status: RunStatus::Running,
                output: None,
            })
        }

        async fn get_events(
            &self,
            _run_id: &RunId,
            offset: Option<u64>,
        ) -> Result<EventPage, TransportError> {
            self.offsets_seen.lock().unwrap().push(offset);
            let mut pages = self.pages.lock().unwrap();
            assert!(!pages.is_empty(), "watcher polled past the last page");
            Ok(pages.remove(0))
        }

        async fn event_stream(
            &self,
            _run_id: &RunId,
        ) -> Result<BoxedRunEventStream, TransportError> {
            unimplemented!("polling tests only")
        }

        async fn get_logs(&self, _run_id: &RunId) -> Result<Vec<LogEntry>, TransportError> {
            Ok(self.logs.clone())
        }

        async fn publish_event(
            &self,
            _run_id: &RunId,
            _event: &EventSubmission,
        ) -> Result<(), TransportError> {
            Ok(())
        }
    }

    /// Transport serving one scripted live stream.
    struct StreamTransport {
        events: Mutex<Option<Vec<RunEvent>>>,
    }

    impl StreamTransport {
        fn new(events: Vec<RunEvent>) -> Self {
            Self {
                events: Mutex::new(Some(events)),
            }
        }
    }

    #[async_trait]
    impl RunTransport for StreamTransport {
        async fn submit_run(
            &self,
            _structure_id: &StructureId,
            _env: &HashMap<String, String>,
            _args: &[String],
        ) -> Result<RunHandle, TransportError> {
            Ok(RunHandle {
                run_id: RunId::new("run-1"),
                status: RunStatus::Queued,
            })
        }

        async fn get_run(&self, _run_id: &RunId) -> Result<RunSnapshot, TransportError> {
            Ok(RunSnapshot {
                status: RunStatus::Running,
                output: None,
            })
        }

        async fn get_events(
            &self,
            _run_id: &RunId,
            _offset: Option<u64>,
        ) -> Result<EventPage, TransportError> {
            unimplemented!("stream tests only")
        }

        async fn event_stream(
            &self,
            _run_id: &RunId,
        ) -> Result<BoxedRunEventStream, TransportError> {
            let events = self
                .events
                .lock()
                .unwrap()
                .take()
                .expect("stream opened twice");
            Ok(Box::pin(futures_util::stream::iter(
                events.into_iter().map(Ok::<_, TransportError>),
            )))
        }

        async fn get_logs(&self, _run_id: &RunId) -> Result<Vec<LogEntry>, TransportError> {
            Ok(Vec::new())
        }

        async fn publish_event(
            &self,
            _run_id: &RunId,
            _event: &EventSubmission,
        ) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn collect_tokens(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<String> {
        let mut tokens = Vec::new();
        while let Ok(token) = rx.try_recv() {
            tokens.push(token);
        }
        tokens
    }

    #[tokio::test]
    async fn test_poll_streams_tokens_and_returns_output() {
        let pages = vec![
            EventPage {
                events: vec![
                    status_change(0, RunStatus::Running),
                    text_chunk(1, "Hel"),
                    text_chunk(2, "lo"),
                ],
                next_offset: 3,
            },
            EventPage {
                events: vec![succeeded(3, "Hello"), status_change(4, RunStatus::Succeeded)],
                next_offset: 5,
            },
        ];
        let watcher =
            Watcher::new(PagedTransport::new(pages)).with_poll_interval(Duration::from_millis(1));

        let (tx, mut rx) = mpsc::unbounded_channel();
        let outcome = watcher.watch(&RunId::new("run-1"), tx).await.unwrap();

        assert_eq!(
            outcome.verdict,
            Verdict::Succeeded(Some("Hello".to_string()))
        );
        assert_eq!(collect_tokens(&mut rx), vec!["Hel", "lo"]);
        assert_eq!(outcome.logs.len(), 1);

        let offsets = watcher.transport().offsets_seen.lock().unwrap().clone();
        assert_eq!(offsets, vec![None, Some(3)]);
    }

    #[tokio::test]
    async fn test_poll_terminal_status_without_result_event() {
        let pages = vec![EventPage {
            events: vec![status_change(0, RunStatus::Failed)],
            next_offset: 1,
        }];
        let watcher =
            Watcher::new(PagedTransport::new(pages)).with_poll_interval(Duration::from_millis(1));

        let (tx, _rx) = mpsc::unbounded_channel();
        let outcome = watcher.watch(&RunId::new("run-1"), tx).await.unwrap();

        assert!(matches!(outcome.verdict, Verdict::Failed(_)));
    }

    #[tokio::test]
    async fn test_poll_respects_injected_terminal_set() {
        // CANCELLED is not terminal for this contract; the run keeps going
        // until the user event lands.
        let pages = vec![
            EventPage {
                events: vec![status_change(0, RunStatus::Cancelled)],
                next_offset: 1,
            },
            EventPage {
                events: vec![succeeded(1, "late")],
                next_offset: 2,
            },
        ];
        let watcher = Watcher::new(PagedTransport::new(pages))
            .with_poll_interval(Duration::from_millis(1))
            .with_terminal_statuses(TerminalStatuses::new([
                RunStatus::Succeeded,
                RunStatus::Failed,
            ]));

        let (tx, _rx) = mpsc::unbounded_channel();
        let outcome = watcher.watch(&RunId::new("run-1"), tx).await.unwrap();

        assert_eq!(outcome.verdict, Verdict::Succeeded(Some("late".to_string())));
    }

    #[tokio::test]
    async fn test_stream_stops_at_terminal_event() {
        // Events after the terminal one must never be consumed.
        let events = vec![
            text_chunk(0, "Hel"),
            text_chunk(1, "lo"),
            succeeded(2, "Hello"),
            text_chunk(3, "stale"),
        ];
        let watcher = Watcher::new(StreamTransport::new(events));

        let (tx, mut rx) = mpsc::unbounded_channel();
        let outcome = watcher
            .watch_stream(&RunId::new("run-1"), tx)
            .await
            .unwrap();

        assert_eq!(
            outcome.verdict,
            Verdict::Succeeded(Some("Hello".to_string()))
        );
        assert_eq!(collect_tokens(&mut rx), vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_stream_ending_without_terminal_event_is_an_error() {
        let events = vec![
            status_change(0, RunStatus::Running),
            text_chunk(1, "partial"),
            text_chunk(2, " answer"),
        ];
        let watcher = Watcher::new(StreamTransport::new(events));

        let (tx, _rx) = mpsc::unbounded_channel();
        let result = watcher.watch_stream(&RunId::new("run-1"), tx).await;

        assert!(matches!(result, Err(WatchError::StreamExhausted)));
    }

    #[tokio::test]
    async fn test_submit_then_watch_end_to_end() {
        let pages = vec![EventPage {
            events: vec![
                text_chunk(0, "Hel"),
                text_chunk(1, "lo"),
                succeeded(2, "Hello"),
            ],
            next_offset: 3,
        }];
        let watcher =
            Watcher::new(PagedTransport::new(pages)).with_poll_interval(Duration::from_millis(1));

        let handle = watcher
            .submit(
                &StructureId::new("struct-1"),
                &HashMap::new(),
                &["what is 2 + 2".to_string()],
            )
            .await
            .unwrap();
        assert_eq!(handle.status, RunStatus::Queued);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let outcome = watcher.watch(&handle.run_id, tx).await.unwrap();

        assert_eq!(collect_tokens(&mut rx).concat(), "Hello");
        assert_eq!(
            outcome.verdict,
            Verdict::Succeeded(Some("Hello".to_string()))
        );
    }
}
