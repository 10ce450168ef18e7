//! Pumping one model stream into one client stream
//!
//! The model call runs in its own task and feeds an mpsc channel; the HTTP
//! response drains the channel. If the client goes away the channel closes
//! and the task stops at its next send.

use std::sync::Arc;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use super::events::RelayEvent;
use crate::llm::{CompletionRequest, LlmClient};
use crate::stage::StageKind;

const CHANNEL_CAPACITY: usize = 64;
const KEEP_ALIVE_SECS: u64 = 15;

/// How a relay task ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Every fragment and the final `done` were delivered
    Completed,
    /// An `error` event was delivered
    Failed,
    /// The client stopped listening before the terminal event
    Disconnected,
}

/// Stream one completion to `tx`: chunks in order, then one terminal event
pub async fn run_relay(
    llm: Arc<dyn LlmClient>,
    request: CompletionRequest,
    stage: StageKind,
    tx: mpsc::Sender<RelayEvent>,
) -> RelayOutcome {
    debug!(%stage, "run_relay: called");

    let mut stream = match llm.complete_stream(request).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(%stage, status = ?e.status(), error = %e, "run_relay: model call failed before streaming");
            return finish(&tx, RelayEvent::error(e.to_string()), RelayOutcome::Failed).await;
        }
    };

    let mut full = String::new();
    let mut chunk_count = 0usize;
    while let Some(item) = stream.next().await {
        match item {
            Ok(fragment) => {
                full.push_str(&fragment);
                chunk_count += 1;
                if tx.send(RelayEvent::chunk(fragment)).await.is_err() {
                    info!(%stage, chunk_count, "Client disconnected mid-stream");
                    return RelayOutcome::Disconnected;
                }
            }
            Err(e) => {
                warn!(%stage, chunk_count, status = ?e.status(), error = %e, "run_relay: model stream failed");
                return finish(&tx, RelayEvent::error(e.to_string()), RelayOutcome::Failed).await;
            }
        }
    }

    info!(%stage, chunk_count, content_len = full.len(), "Stage stream completed");
    finish(&tx, RelayEvent::done(full), RelayOutcome::Completed).await
}

async fn finish(tx: &mpsc::Sender<RelayEvent>, event: RelayEvent, outcome: RelayOutcome) -> RelayOutcome {
    match tx.send(event).await {
        Ok(()) => outcome,
        Err(_) => {
            debug!("finish: client already gone");
            RelayOutcome::Disconnected
        }
    }
}

/// Start the relay task and hand back the receiving end
pub fn spawn_relay(
    llm: Arc<dyn LlmClient>,
    request: CompletionRequest,
    stage: StageKind,
) -> mpsc::Receiver<RelayEvent> {
    debug!(%stage, "spawn_relay: called");
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    tokio::spawn(async move {
        let outcome = run_relay(llm, request, stage, tx).await;
        debug!(%stage, ?outcome, "spawn_relay: task finished");
    });
    rx
}

/// Wrap a relay channel as an SSE response body
pub fn into_sse(rx: mpsc::Receiver<RelayEvent>) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let stream = ReceiverStream::new(rx).map(|event| event.to_sse_event());
    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(KEEP_ALIVE_SECS)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::mock::{MockLlmClient, MockReply};

    async fn drain(mut rx: mpsc::Receiver<RelayEvent>) -> Vec<RelayEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_chunks_then_single_done() {
        let llm = Arc::new(MockLlmClient::new(vec![MockReply::chunks(&["```json\n{\"pha", "ses\":[]}\n```"])]));
        let (tx, rx) = mpsc::channel(8);

        let outcome = run_relay(llm, CompletionRequest::new("x"), StageKind::Blueprint, tx).await;
        let events = drain(rx).await;

        assert_eq!(outcome, RelayOutcome::Completed);
        assert_eq!(
            events,
            vec![
                RelayEvent::chunk("```json\n{\"pha"),
                RelayEvent::chunk("ses\":[]}\n```"),
                RelayEvent::done("```json\n{\"phases\":[]}\n```"),
            ]
        );
    }

    #[tokio::test]
    async fn test_upstream_500_is_single_error_event() {
        let llm = Arc::new(MockLlmClient::new(vec![MockReply::Reject(500, "overloaded".to_string())]));
        let rx = spawn_relay(llm, CompletionRequest::new("x"), StageKind::Architecture);

        let events = drain(rx).await;

        assert_eq!(events.len(), 1);
        match &events[0] {
            RelayEvent::Error { error } => {
                assert!(error.contains("500"));
                assert!(error.contains("overloaded"));
            }
            other => panic!("expected error event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_mid_stream_failure_keeps_chunks_then_error() {
        let llm = Arc::new(MockLlmClient::new(vec![MockReply::FailAfter(
            vec!["## Over".to_string()],
            502,
            "bad gateway".to_string(),
        )]));
        let rx = spawn_relay(llm, CompletionRequest::new("x"), StageKind::Database);

        let events = drain(rx).await;

        assert_eq!(events.len(), 2);
        assert_eq!(events[0], RelayEvent::chunk("## Over"));
        assert!(events[1].is_terminal());
        assert!(matches!(events[1], RelayEvent::Error { .. }));
    }

    #[tokio::test]
    async fn test_closed_receiver_stops_quietly() {
        let llm = Arc::new(MockLlmClient::new(vec![MockReply::chunks(&["a", "b", "c"])]));
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let outcome = run_relay(llm, CompletionRequest::new("x"), StageKind::Api, tx).await;

        assert_eq!(outcome, RelayOutcome::Disconnected);
    }

    #[tokio::test]
    async fn test_empty_model_stream_is_empty_done() {
        let llm = Arc::new(MockLlmClient::new(vec![MockReply::Text(vec![])]));
        let rx = spawn_relay(llm, CompletionRequest::new("x"), StageKind::Api);
        assert_eq!(drain(rx).await, vec![RelayEvent::done("")]);
    }
}
