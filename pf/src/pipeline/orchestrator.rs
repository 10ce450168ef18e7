//! Orchestrator - drives stages against a transport
//!
//! All state changes go through `PipelineState::apply`; the orchestrator only
//! decides which actions to feed it and publishes what happened.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::state::{Action, ErrorKind, IgnoreReason, Outcome, PipelineError, PipelineState, RunId};
use super::transport::{StageRequest, StageTransport};
use crate::events::EventEmitter;
use crate::relay::RelayEvent;
use crate::stage::StageKind;

/// How one `run_stage` call ended
#[derive(Debug, Clone, PartialEq)]
pub enum StageReport {
    Completed {
        stage: StageKind,
        content_len: usize,
    },
    Failed {
        stage: StageKind,
        kind: ErrorKind,
        message: String,
    },
    /// Another run of the same stage started while this one was in flight
    Superseded { stage: StageKind },
}

impl StageReport {
    pub fn is_completed(&self) -> bool {
        matches!(self, StageReport::Completed { .. })
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    transport: Arc<dyn StageTransport>,
    state: Arc<RwLock<PipelineState>>,
    emitter: EventEmitter,
}

impl Orchestrator {
    pub fn new(transport: Arc<dyn StageTransport>, emitter: EventEmitter) -> Self {
        debug!(session_id = emitter.session_id(), "Orchestrator::new: called");
        Self {
            transport,
            state: Arc::new(RwLock::new(PipelineState::new())),
            emitter,
        }
    }

    /// Shared handle to the live state
    pub fn state(&self) -> Arc<RwLock<PipelineState>> {
        self.state.clone()
    }

    pub async fn snapshot(&self) -> PipelineState {
        self.state.read().await.clone()
    }

    async fn apply(&self, action: Action) -> Outcome {
        self.state.write().await.apply(action)
    }

    pub async fn submit_intent(&self, intent: impl Into<String>) -> Result<(), PipelineError> {
        match self.apply(Action::SubmitIntent { intent: intent.into() }).await {
            Outcome::Rejected(e) => Err(e),
            _ => Ok(()),
        }
    }

    pub async fn answer(&self, index: usize, answer: impl Into<String>) -> Result<(), PipelineError> {
        match self
            .apply(Action::AnswerClarification {
                index,
                answer: answer.into(),
            })
            .await
        {
            Outcome::Rejected(e) => Err(e),
            _ => Ok(()),
        }
    }

    /// Gate, build the request, and start a new run of `stage`
    async fn begin(&self, stage: StageKind) -> Result<(RunId, StageRequest), PipelineError> {
        let mut state = self.state.write().await;
        if state.intent.is_some() && !state.is_enabled(stage) {
            return Err(PipelineError::StageLocked {
                stage,
                unlocked_through: state.unlocked_through,
            });
        }
        let request = state.context_for(stage)?;
        if let Outcome::Rejected(e) = state.apply(Action::StartStage { stage }) {
            return Err(e);
        }
        Ok((state.run_id(stage), request))
    }

    /// Run one stage to its terminal event
    ///
    /// Errors are returned only when the stage could not start; a stage that
    /// started and failed is a `StageReport::Failed`.
    pub async fn run_stage(&self, stage: StageKind) -> Result<StageReport, PipelineError> {
        debug!(%stage, "Orchestrator::run_stage: called");
        let (run_id, request) = match self.begin(stage).await {
            Ok(started) => started,
            Err(e) => {
                warn!(%stage, error = %e, "Stage could not start");
                self.emitter.stage_rejected(stage, &e.to_string());
                return Err(e);
            }
        };
        self.emitter.stage_started(stage, run_id);

        let terminal = match &request {
            StageRequest::Clarify(req) => match self.transport.clarify(req).await {
                Ok(questions) => match serde_json::to_string(&questions) {
                    Ok(content) => Action::Done { stage, run_id, content },
                    Err(e) => failed(stage, run_id, e.to_string(), ErrorKind::Parse),
                },
                Err(e) => failed(stage, run_id, e.to_string(), e.kind()),
            },
            _ => match self.stream_stage(stage, run_id, &request).await {
                Ok(action) => action,
                Err(report) => return Ok(report),
            },
        };

        Ok(self.conclude(stage, run_id, terminal).await)
    }

    /// Apply chunks as they arrive; returns the terminal action to apply
    async fn stream_stage(
        &self,
        stage: StageKind,
        run_id: RunId,
        request: &StageRequest,
    ) -> Result<Action, StageReport> {
        let mut events = match self.transport.open(request).await {
            Ok(events) => events,
            Err(e) => return Ok(failed(stage, run_id, e.to_string(), e.kind())),
        };

        while let Some(event) = events.next().await {
            match event {
                Ok(RelayEvent::Chunk { content }) => {
                    match self.apply(Action::Chunk {
                        stage,
                        run_id,
                        content: content.clone(),
                    })
                    .await
                    {
                        Outcome::Applied => self.emitter.chunk_applied(stage, run_id, &content),
                        Outcome::Ignored(IgnoreReason::StaleRun { .. }) => {
                            info!(%stage, run_id, "Run superseded; dropping its stream");
                            return Err(StageReport::Superseded { stage });
                        }
                        other => debug!(%stage, ?other, "Orchestrator::stream_stage: chunk not applied"),
                    }
                }
                Ok(RelayEvent::Done { content }) => return Ok(Action::Done { stage, run_id, content }),
                Ok(RelayEvent::Error { error }) => return Ok(failed(stage, run_id, error, ErrorKind::Gateway)),
                Err(e) => return Ok(failed(stage, run_id, e.to_string(), e.kind())),
            }
        }

        Ok(failed(
            stage,
            run_id,
            "stream ended without a terminal event".to_string(),
            ErrorKind::Transport,
        ))
    }

    /// Apply the terminal action and report what the state says about it
    async fn conclude(&self, stage: StageKind, run_id: RunId, terminal: Action) -> StageReport {
        let mut state = self.state.write().await;
        if let Outcome::Ignored(IgnoreReason::StaleRun { .. }) = state.apply(terminal) {
            info!(%stage, run_id, "Run superseded before its terminal event");
            return StageReport::Superseded { stage };
        }

        let Some(stream) = state.stream(stage).filter(|s| s.run_id == run_id) else {
            return StageReport::Superseded { stage };
        };

        if stream.is_failed() {
            let kind = stream.error_kind.unwrap_or(ErrorKind::Gateway);
            let message = stream.error.clone().unwrap_or_default();
            self.emitter.stage_failed(stage, run_id, kind, &message);
            return StageReport::Failed { stage, kind, message };
        }

        let content_len = stream.content.len();
        self.emitter.stage_completed(stage, run_id, content_len);
        if stage == StageKind::Blueprint
            && let Some(plan) = state.plan.as_ref()
        {
            self.emitter.plan_folded(plan.phases.len());
        }
        StageReport::Completed { stage, content_len }
    }

    /// Run every stage from `first` through the blueprint, stopping at the
    /// first one that doesn't complete
    pub async fn run_from(&self, first: StageKind) -> Result<Vec<StageReport>, PipelineError> {
        debug!(%first, "Orchestrator::run_from: called");
        let mut reports = Vec::new();
        for stage in StageKind::ALL.into_iter().filter(|s| *s >= first) {
            let report = self.run_stage(stage).await?;
            let completed = report.is_completed();
            reports.push(report);
            if !completed {
                break;
            }
        }
        Ok(reports)
    }

    pub async fn run_all(&self) -> Result<Vec<StageReport>, PipelineError> {
        self.run_from(StageKind::Clarify).await
    }
}

fn failed(stage: StageKind, run_id: RunId, message: String, kind: ErrorKind) -> Action {
    Action::Failed {
        stage,
        run_id,
        message,
        kind,
    }
}
