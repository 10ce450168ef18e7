//! Folding the blueprint stage's answer into a plan
//!
//! Models answer in a few historical shapes. They are all accepted here and
//! normalized into one list of phases, so nothing downstream has to probe
//! for fields.

use serde::Deserialize;
use tracing::{debug, info};

use super::PlanError;
use super::id::generate_id;
use super::model::{Phase, Plan, RiskLevel, Step};
use crate::extract::extract_json;

const MAX_DERIVED_TITLE: usize = 80;

/// Every blueprint shape we accept
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BlueprintResult {
    /// `{ "phases": [...] }`
    Phases { phases: Vec<PhaseOutput> },
    /// `{ "plan": { "phases": [...] } }`
    Wrapped { plan: WrappedPlan },
    /// `[...]`
    Bare(Vec<PhaseOutput>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct WrappedPlan {
    pub phases: Vec<PhaseOutput>,
}

impl BlueprintResult {
    pub fn into_phases(self) -> Vec<PhaseOutput> {
        match self {
            Self::Phases { phases } | Self::Bare(phases) => phases,
            Self::Wrapped { plan } => plan.phases,
        }
    }
}

/// A phase as the model wrote it
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PhaseOutput {
    #[serde(alias = "title")]
    pub name: Option<String>,
    pub description: Option<String>,
    pub risk: Option<serde_json::Value>,
    pub steps: Vec<StepOutput>,
    #[serde(rename = "filesInvolved", alias = "files_involved", alias = "files")]
    pub files_involved: Vec<String>,
}

/// A step as the model wrote it: an object, or just a sentence
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StepOutput {
    Detailed {
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        description: Option<String>,
    },
    Text(String),
}

impl StepOutput {
    fn into_step(self, index: usize) -> Step {
        let (title, description) = match self {
            Self::Detailed { title, description } => (title, description.unwrap_or_default()),
            Self::Text(text) => (None, text),
        };
        let title = title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .or_else(|| first_sentence(&description))
            .unwrap_or_else(|| format!("Step {}", index + 1));
        Step::new(title, description.trim())
    }
}

impl PhaseOutput {
    fn into_phase(self, index: usize) -> Phase {
        let name = self
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("Phase {}", index + 1));
        let risk = match self.risk {
            Some(serde_json::Value::String(label)) => RiskLevel::from_label(&label),
            _ => RiskLevel::Medium,
        };
        Phase {
            id: generate_id("phase", &name),
            name,
            description: self.description.unwrap_or_default().trim().to_string(),
            risk,
            steps: self
                .steps
                .into_iter()
                .enumerate()
                .map(|(i, s)| s.into_step(i))
                .collect(),
            files_involved: self.files_involved,
        }
    }
}

/// Title for a step that only has a description
fn first_sentence(text: &str) -> Option<String> {
    let text = text.trim();
    let end = text.find(['.', '!', '?', '\n']).unwrap_or(text.len());
    let sentence: String = text[..end].trim().chars().take(MAX_DERIVED_TITLE).collect();
    (!sentence.is_empty()).then_some(sentence)
}

/// Normalize a blueprint into fresh phases
///
/// Every phase and step gets a new id; steps start enabled and pending.
pub fn normalize_phases(result: BlueprintResult) -> Result<Vec<Phase>, PlanError> {
    let outputs = result.into_phases();
    debug!(phase_count = outputs.len(), "normalize_phases: called");
    if outputs.is_empty() {
        return Err(PlanError::NoPhases);
    }
    Ok(outputs.into_iter().enumerate().map(|(i, p)| p.into_phase(i)).collect())
}

/// Parse the blueprint stage's final text
pub fn parse_blueprint(raw: &str) -> Result<Vec<Phase>, PlanError> {
    debug!(raw_len = raw.len(), "parse_blueprint: called");
    let result: BlueprintResult = extract_json(raw)?;
    normalize_phases(result)
}

/// Replace the plan's phases with the blueprint's
///
/// On error the plan is left untouched.
pub fn fold_blueprint(plan: &mut Plan, result: BlueprintResult) -> Result<usize, PlanError> {
    debug!(plan_id = %plan.id, "fold_blueprint: called");
    let phases = normalize_phases(result)?;
    let count = phases.len();
    plan.phases = phases;
    info!(plan_id = %plan.id, phase_count = count, step_count = plan.step_count(), "Folded blueprint into plan");
    Ok(count)
}
