//! Plan aggregation
//!
//! The plan is created when an intent is submitted and only gets phases when
//! the blueprint stage's final text is folded in.

mod aggregator;
mod artifact;
pub mod id;
mod model;

pub use aggregator::{
    BlueprintResult, PhaseOutput, StepOutput, WrappedPlan, fold_blueprint, normalize_phases, parse_blueprint,
};
pub use artifact::{ArchitectureArtifact, ArchitectureJson, ProblemContext, StructuredArchitecture, Tradeoff};
pub use model::{Clarification, Phase, Plan, RiskLevel, Step, StepStatus};

use thiserror::Error;

use crate::extract::ExtractError;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("plan could not be parsed: {0}")]
    Parse(#[from] ExtractError),

    #[error("plan could not be parsed: no phases found")]
    NoPhases,
}
