//! Pipeline state and its transitions
//!
//! `PipelineState` is a plain value. Every change goes through
//! [`PipelineState::apply`], which does no I/O, so the whole client-side state
//! machine can be driven and inspected synchronously.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::transport::StageRequest;
use crate::extract::extract_json;
use crate::plan::{BlueprintResult, Clarification, Plan, PlanError, fold_blueprint};
use crate::relay::requests::MIN_FIELD_LEN;
use crate::relay::{
    ApiDesignRequest, ArchitectureRequest, BlueprintRequest, ClarificationInput, ClarifyRequest, DatabaseRequest,
};
use crate::stage::{GenerationStage, StageKind};

/// Identifies one run of one stage; later runs get larger ids
pub type RunId = u64;

/// Why a stage ended in error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The model endpoint failed or refused
    Gateway,
    /// The model answered but the text was unusable
    Parse,
    /// The connection to the relay broke
    Transport,
    /// The relay rejected the request body
    Validation,
}

/// Live state of one stage
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StreamingState {
    pub is_streaming: bool,
    pub content: String,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    /// Zero until the stage first runs
    pub run_id: RunId,
}

impl StreamingState {
    /// The last run ended with `done`
    pub fn is_done(&self) -> bool {
        self.run_id > 0 && !self.is_streaming && self.error.is_none()
    }

    pub fn is_failed(&self) -> bool {
        !self.is_streaming && self.error.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    SubmitIntent {
        intent: String,
    },
    StartStage {
        stage: StageKind,
    },
    Chunk {
        stage: StageKind,
        run_id: RunId,
        content: String,
    },
    Done {
        stage: StageKind,
        run_id: RunId,
        content: String,
    },
    Failed {
        stage: StageKind,
        run_id: RunId,
        message: String,
        kind: ErrorKind,
    },
    AnswerClarification {
        index: usize,
        answer: String,
    },
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The event belongs to a run that has since been superseded
    StaleRun { current: RunId, received: RunId },
    /// The run already received its terminal event
    AfterTerminal,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Applied,
    Ignored(IgnoreReason),
    Rejected(PipelineError),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("stage {stage} is locked; unlocked through {unlocked_through}")]
    StageLocked {
        stage: StageKind,
        unlocked_through: GenerationStage,
    },

    #[error("no intent has been submitted")]
    NoIntent,

    #[error("intent must be at least {0} characters")]
    IntentTooShort(usize),

    #[error("stage {0} is still streaming")]
    Busy(StageKind),

    #[error("cannot build {stage} request: {missing} has not completed")]
    ContextNotReady { stage: StageKind, missing: StageKind },

    #[error("no clarification at index {0}")]
    ClarificationIndex(usize),
}

/// The client's whole view of one planning session
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineState {
    pub intent: Option<String>,
    /// The stage most recently started
    pub generation_step: GenerationStage,
    /// Furthest stage the user may run
    pub unlocked_through: GenerationStage,
    pub streams: BTreeMap<StageKind, StreamingState>,
    pub clarifications: Vec<Clarification>,
    pub plan: Option<Plan>,
    next_run_id: RunId,
}

impl PipelineState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stream(&self, stage: StageKind) -> Option<&StreamingState> {
        self.streams.get(&stage)
    }

    /// Current run id of a stage, zero if it never ran
    pub fn run_id(&self, stage: StageKind) -> RunId {
        self.stream(stage).map(|s| s.run_id).unwrap_or(0)
    }

    /// Whether the user may run this stage now
    pub fn is_enabled(&self, stage: StageKind) -> bool {
        self.unlocked_through != GenerationStage::Idle && stage.generation_stage() <= self.unlocked_through
    }

    fn streaming_stage(&self) -> Option<StageKind> {
        self.streams
            .iter()
            .find(|(_, s)| s.is_streaming)
            .map(|(stage, _)| *stage)
    }

    /// Final text of a stage that ended with `done`
    fn done_content(&self, stage: StageKind, wanted_by: StageKind) -> Result<String, PipelineError> {
        self.stream(stage)
            .filter(|s| s.is_done())
            .map(|s| s.content.clone())
            .ok_or(PipelineError::ContextNotReady {
                stage: wanted_by,
                missing: stage,
            })
    }

    /// Build the relay request for a stage from completed stages only
    pub fn context_for(&self, stage: StageKind) -> Result<StageRequest, PipelineError> {
        debug!(%stage, "PipelineState::context_for: called");
        let intent = self.intent.clone().ok_or(PipelineError::NoIntent)?;

        let request = match stage {
            StageKind::Clarify => StageRequest::Clarify(ClarifyRequest { prompt: intent }),
            StageKind::Architecture => {
                self.done_content(StageKind::Clarify, stage)?;
                StageRequest::Architecture(ArchitectureRequest {
                    prompt: intent,
                    clarifications: self
                        .clarifications
                        .iter()
                        .map(|c| ClarificationInput {
                            question: c.question.clone(),
                            answer: c.answer.clone().unwrap_or_default(),
                        })
                        .collect(),
                })
            }
            StageKind::Database => StageRequest::Database(DatabaseRequest {
                intent,
                architecture: self.done_content(StageKind::Architecture, stage)?,
            }),
            StageKind::Api => StageRequest::ApiDesign(ApiDesignRequest {
                intent,
                architecture: self.done_content(StageKind::Architecture, stage)?,
                database: self.done_content(StageKind::Database, stage)?,
            }),
            StageKind::Blueprint => StageRequest::Blueprint(BlueprintRequest {
                intent,
                architecture: self.done_content(StageKind::Architecture, stage)?,
                database: self.done_content(StageKind::Database, stage)?,
                api: self.done_content(StageKind::Api, stage)?,
            }),
        };
        Ok(request)
    }

    pub fn apply(&mut self, action: Action) -> Outcome {
        match action {
            Action::SubmitIntent { intent } => self.submit_intent(intent),
            Action::StartStage { stage } => self.start_stage(stage),
            Action::Chunk { stage, run_id, content } => self.chunk(stage, run_id, content),
            Action::Done { stage, run_id, content } => self.done(stage, run_id, content),
            Action::Failed {
                stage,
                run_id,
                message,
                kind,
            } => self.failed(stage, run_id, message, kind),
            Action::AnswerClarification { index, answer } => self.answer(index, answer),
            Action::Reset => {
                debug!("PipelineState::apply: reset");
                *self = Self::default();
                Outcome::Applied
            }
        }
    }

    fn submit_intent(&mut self, intent: String) -> Outcome {
        let intent = intent.trim().to_string();
        debug!(intent_len = intent.len(), "PipelineState::submit_intent: called");
        if intent.chars().count() < MIN_FIELD_LEN {
            return Outcome::Rejected(PipelineError::IntentTooShort(MIN_FIELD_LEN));
        }
        if let Some(stage) = self.streaming_stage() {
            return Outcome::Rejected(PipelineError::Busy(stage));
        }

        let next_run_id = self.next_run_id;
        *self = Self {
            plan: Some(Plan::new(&intent)),
            intent: Some(intent),
            unlocked_through: GenerationStage::Clarify,
            next_run_id,
            ..Self::default()
        };
        info!("Intent submitted; clarify unlocked");
        Outcome::Applied
    }

    fn start_stage(&mut self, stage: StageKind) -> Outcome {
        debug!(%stage, "PipelineState::start_stage: called");
        if self.intent.is_none() {
            return Outcome::Rejected(PipelineError::NoIntent);
        }
        if !self.is_enabled(stage) {
            return Outcome::Rejected(PipelineError::StageLocked {
                stage,
                unlocked_through: self.unlocked_through,
            });
        }
        if let Some(other) = self.streaming_stage()
            && other != stage
        {
            return Outcome::Rejected(PipelineError::Busy(other));
        }

        self.next_run_id += 1;
        let run_id = self.next_run_id;
        self.generation_step = stage.generation_stage();
        self.streams.insert(
            stage,
            StreamingState {
                is_streaming: true,
                run_id,
                ..Default::default()
            },
        );
        info!(%stage, run_id, "Stage started");
        Outcome::Applied
    }

    /// The live state for an event, or why the event doesn't apply
    fn live_stream(&mut self, stage: StageKind, run_id: RunId) -> Result<&mut StreamingState, IgnoreReason> {
        let current = self.run_id(stage);
        if current != run_id {
            debug!(%stage, current, received = run_id, "PipelineState: stale run event ignored");
            return Err(IgnoreReason::StaleRun {
                current,
                received: run_id,
            });
        }
        match self.streams.get_mut(&stage) {
            Some(stream) if stream.is_streaming => Ok(stream),
            _ => Err(IgnoreReason::AfterTerminal),
        }
    }

    fn chunk(&mut self, stage: StageKind, run_id: RunId, content: String) -> Outcome {
        match self.live_stream(stage, run_id) {
            Ok(stream) => {
                stream.content.push_str(&content);
                Outcome::Applied
            }
            Err(reason) => Outcome::Ignored(reason),
        }
    }

    fn failed(&mut self, stage: StageKind, run_id: RunId, message: String, kind: ErrorKind) -> Outcome {
        match self.live_stream(stage, run_id) {
            Ok(stream) => {
                warn!(%stage, run_id, ?kind, %message, "Stage failed");
                stream.is_streaming = false;
                stream.error = Some(message);
                stream.error_kind = Some(kind);
                Outcome::Applied
            }
            Err(reason) => Outcome::Ignored(reason),
        }
    }

    fn done(&mut self, stage: StageKind, run_id: RunId, content: String) -> Outcome {
        let stream = match self.live_stream(stage, run_id) {
            Ok(stream) => stream,
            Err(reason) => return Outcome::Ignored(reason),
        };
        stream.is_streaming = false;
        stream.content = content;

        let folded = match stage {
            StageKind::Clarify => self.fold_questions(),
            StageKind::Blueprint => self.fold_plan(),
            _ => Ok(()),
        };
        if let Err(message) = folded {
            warn!(%stage, run_id, %message, "Stage output could not be parsed");
            if let Some(stream) = self.streams.get_mut(&stage) {
                stream.error = Some(message);
                stream.error_kind = Some(ErrorKind::Parse);
            }
            return Outcome::Applied;
        }

        if let Some(next) = stage.generation_stage().next()
            && next > self.unlocked_through
        {
            self.unlocked_through = next;
            info!(%stage, unlocked = %next, "Stage completed; next stage unlocked");
        } else {
            info!(%stage, "Stage completed");
        }
        Outcome::Applied
    }

    /// Replace the clarifications with the clarify stage's question list
    fn fold_questions(&mut self) -> Result<(), String> {
        let content = self.stream(StageKind::Clarify).map(|s| s.content.as_str()).unwrap_or("");
        let questions: Vec<String> = extract_json(content).map_err(|e| e.to_string())?;
        self.clarifications = questions
            .into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .map(Clarification::new)
            .collect();
        if let Some(plan) = self.plan.as_mut() {
            plan.clarifications = self.clarifications.clone();
        }
        debug!(count = self.clarifications.len(), "PipelineState::fold_questions: replaced clarifications");
        Ok(())
    }

    /// Parse the blueprint and fold it, with the stage texts, into the plan
    ///
    /// The plan is left untouched when the blueprint can't be parsed.
    fn fold_plan(&mut self) -> Result<(), String> {
        let content = self.stream(StageKind::Blueprint).map(|s| s.content.as_str()).unwrap_or("");
        let result: BlueprintResult = extract_json(content).map_err(|e| PlanError::from(e).to_string())?;

        let text = |stage| self.stream(stage).filter(|s| s.is_done()).map(|s| s.content.clone());
        let (architecture, database, api) = (
            text(StageKind::Architecture),
            text(StageKind::Database),
            text(StageKind::Api),
        );
        let clarifications = self.clarifications.clone();

        let plan = self.plan.get_or_insert_with(|| Plan::new(self.intent.clone().unwrap_or_default()));
        fold_blueprint(plan, result).map_err(|e| e.to_string())?;
        plan.capture_artifacts(architecture.as_deref(), database.as_deref(), api.as_deref());
        plan.clarifications = clarifications;
        Ok(())
    }

    fn answer(&mut self, index: usize, answer: String) -> Outcome {
        debug!(index, "PipelineState::answer: called");
        let Some(clarification) = self.clarifications.get_mut(index) else {
            return Outcome::Rejected(PipelineError::ClarificationIndex(index));
        };
        let answer = answer.trim().to_string();
        clarification.answer = (!answer.is_empty()).then_some(answer);
        if let Some(plan) = self.plan.as_mut() {
            plan.clarifications = self.clarifications.clone();
        }
        Outcome::Applied
    }
}
