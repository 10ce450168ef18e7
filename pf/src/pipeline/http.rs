//! HTTP transport against a running relay

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;
use reqwest_eventsource::{Event, EventSource, retry};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::transport::{RelayEventStream, StageRequest, StageTransport, TransportError};
use crate::relay::{ClarifyRequest, RelayEvent, ValidationFailure};

/// Non-streaming clarify answer; `error` is only set on failure
#[derive(Debug, Deserialize)]
struct ClarifyResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    questions: Vec<String>,
    #[serde(default)]
    error: Option<String>,
}

pub struct HttpTransport {
    base_url: String,
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        debug!(%base_url, "HttpTransport::new: called");
        Self {
            base_url,
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Fetch the relay's health document
    pub async fn health(&self) -> Result<serde_json::Value, TransportError> {
        debug!("HttpTransport::health: called");
        let response = self
            .http
            .get(self.url("/api/health"))
            .send()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(error_for_status(status, response.text().await.unwrap_or_default()));
        }
        response
            .json()
            .await
            .map_err(|e| TransportError::Protocol(e.to_string()))
    }
}

/// Describe a non-success relay answer
fn error_for_status(status: StatusCode, body: String) -> TransportError {
    if status == StatusCode::BAD_REQUEST {
        let message = match serde_json::from_str::<ValidationFailure>(&body) {
            Ok(failure) if !failure.details.is_empty() => failure
                .details
                .iter()
                .map(|d| format!("{}: {}", d.field, d.message))
                .collect::<Vec<_>>()
                .join("; "),
            Ok(failure) => failure.error,
            Err(_) => body,
        };
        return TransportError::Validation(message);
    }
    TransportError::Http {
        status: status.as_u16(),
        message: body,
    }
}

async fn open_error(e: reqwest_eventsource::Error) -> TransportError {
    match e {
        reqwest_eventsource::Error::InvalidStatusCode(status, response) => {
            let body = response.text().await.unwrap_or_default();
            error_for_status(status, body)
        }
        reqwest_eventsource::Error::Transport(e) => TransportError::Connection(e.to_string()),
        reqwest_eventsource::Error::InvalidContentType(content_type, _) => {
            TransportError::Protocol(format!("expected an event stream, got {content_type:?}"))
        }
        other => TransportError::Protocol(other.to_string()),
    }
}

struct EventState {
    es: EventSource,
    finished: bool,
}

/// Stage events from an open source, ending after the first terminal event
fn relay_events(es: EventSource) -> RelayEventStream {
    let state = EventState { es, finished: false };
    Box::pin(futures::stream::unfold(state, |mut state| async move {
        if state.finished {
            return None;
        }
        loop {
            match state.es.next().await {
                None | Some(Err(reqwest_eventsource::Error::StreamEnded)) => return None,
                Some(Ok(Event::Open)) => continue,
                Some(Ok(Event::Message(message))) => match serde_json::from_str::<RelayEvent>(&message.data) {
                    Ok(event) => {
                        if event.is_terminal() {
                            state.es.close();
                            state.finished = true;
                        }
                        return Some((Ok(event), state));
                    }
                    Err(e) => {
                        debug!(error = %e, data = %message.data, "relay_events: skipping malformed event");
                        continue;
                    }
                },
                Some(Err(e)) => {
                    warn!(error = %e, "relay_events: stream broke");
                    state.es.close();
                    state.finished = true;
                    return Some((Err(TransportError::Connection(e.to_string())), state));
                }
            }
        }
    }))
}

#[async_trait]
impl StageTransport for HttpTransport {
    async fn clarify(&self, request: &ClarifyRequest) -> Result<Vec<String>, TransportError> {
        debug!("HttpTransport::clarify: called");
        let response = self
            .http
            .post(self.url("/api/clarify"))
            .json(request)
            .send()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        if status == StatusCode::BAD_REQUEST {
            return Err(error_for_status(status, body));
        }

        let parsed: ClarifyResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => return Err(error_for_status(status, body)),
            Err(e) => return Err(TransportError::Protocol(e.to_string())),
        };
        if !status.is_success() || !parsed.success {
            let message = parsed.error.unwrap_or_else(|| format!("clarify failed with {status}"));
            return Err(TransportError::Server(message));
        }
        info!(count = parsed.questions.len(), "Received clarifying questions");
        Ok(parsed.questions)
    }

    async fn open(&self, request: &StageRequest) -> Result<RelayEventStream, TransportError> {
        let stage = request.stage();
        debug!(%stage, "HttpTransport::open: called");
        let builder = self.http.post(self.url(stage.endpoint())).json(request);
        let mut es = EventSource::new(builder).map_err(|e| TransportError::Protocol(e.to_string()))?;
        es.set_retry_policy(Box::new(retry::Never));

        match es.next().await {
            Some(Ok(Event::Open)) => {
                debug!(%stage, "HttpTransport::open: stream open");
                Ok(relay_events(es))
            }
            Some(Ok(Event::Message(_))) => Err(TransportError::Protocol("event before open".to_string())),
            Some(Err(e)) => {
                es.close();
                Err(open_error(e).await)
            }
            None => Err(TransportError::Protocol("stream closed before opening".to_string())),
        }
    }
}
