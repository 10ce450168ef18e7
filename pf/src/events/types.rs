//! Event types for pipeline activity streaming

use serde::{Deserialize, Serialize};

use crate::pipeline::{ErrorKind, RunId};
use crate::stage::StageKind;

/// Everything observable about a pipeline session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    /// A stage run began and its content was reset
    StageStarted {
        session_id: String,
        stage: StageKind,
        run_id: RunId,
    },
    /// A fragment was appended to a stage's content
    ChunkApplied {
        session_id: String,
        stage: StageKind,
        run_id: RunId,
        content: String,
    },
    /// A stage finished and its content is now frozen
    StageCompleted {
        session_id: String,
        stage: StageKind,
        run_id: RunId,
        content_len: usize,
    },
    /// A stage ended in error; partial content is kept
    StageFailed {
        session_id: String,
        stage: StageKind,
        run_id: RunId,
        kind: ErrorKind,
        message: String,
    },
    /// A stage could not be started
    StageRejected {
        session_id: String,
        stage: StageKind,
        reason: String,
    },
    /// The blueprint was folded into the plan
    PlanFolded { session_id: String, phase_count: usize },
}

impl PipelineEvent {
    pub fn session_id(&self) -> &str {
        match self {
            Self::StageStarted { session_id, .. }
            | Self::ChunkApplied { session_id, .. }
            | Self::StageCompleted { session_id, .. }
            | Self::StageFailed { session_id, .. }
            | Self::StageRejected { session_id, .. }
            | Self::PlanFolded { session_id, .. } => session_id,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::StageStarted { .. } => "StageStarted",
            Self::ChunkApplied { .. } => "ChunkApplied",
            Self::StageCompleted { .. } => "StageCompleted",
            Self::StageFailed { .. } => "StageFailed",
            Self::StageRejected { .. } => "StageRejected",
            Self::PlanFolded { .. } => "PlanFolded",
        }
    }

    /// The stage this event concerns, if any
    pub fn stage(&self) -> Option<StageKind> {
        match self {
            Self::StageStarted { stage, .. }
            | Self::ChunkApplied { stage, .. }
            | Self::StageCompleted { stage, .. }
            | Self::StageFailed { stage, .. }
            | Self::StageRejected { stage, .. } => Some(*stage),
            Self::PlanFolded { .. } => None,
        }
    }
}
