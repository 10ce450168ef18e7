use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::id::generate_id;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl RiskLevel {
    /// Lenient parse of a model-supplied label; anything unknown is medium
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "low" => Self::Low,
            "high" => Self::High,
            _ => Self::Medium,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: String,
    pub title: String,
    pub description: String,
    pub enabled: bool,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl Step {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            id: generate_id("step", &title),
            title,
            description: description.into(),
            enabled: true,
            status: StepStatus::Pending,
            result: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Phase {
    pub id: String,
    pub name: String,
    pub description: String,
    pub risk: RiskLevel,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub files_involved: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clarification {
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
}

impl Clarification {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: None,
        }
    }
}

/// The plan being built for one intent
///
/// Stage texts are copied in only when the blueprint is folded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: String,
    pub intent: String,
    pub phases: Vec<Phase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api: Option<String>,
    #[serde(default)]
    pub clarifications: Vec<Clarification>,
    pub created_at: DateTime<Utc>,
}

impl Plan {
    pub fn new(intent: impl Into<String>) -> Self {
        let intent = intent.into();
        debug!(intent_len = intent.len(), "Plan::new: called");
        Self {
            id: generate_id("plan", &intent),
            intent,
            phases: Vec::new(),
            architecture: None,
            database: None,
            api: None,
            clarifications: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Copy the finished stage texts into the plan
    pub fn capture_artifacts(&mut self, architecture: Option<&str>, database: Option<&str>, api: Option<&str>) {
        debug!(
            has_architecture = architecture.is_some(),
            has_database = database.is_some(),
            has_api = api.is_some(),
            "Plan::capture_artifacts: called"
        );
        self.architecture = architecture.map(str::to_string);
        self.database = database.map(str::to_string);
        self.api = api.map(str::to_string);
    }

    pub fn step_count(&self) -> usize {
        self.phases.iter().map(|p| p.steps.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_plan() -> Plan {
        let mut plan = Plan::new("Build a habit tracker");
        plan.phases.push(Phase {
            id: "phase-1".to_string(),
            name: "Setup".to_string(),
            description: "Scaffold".to_string(),
            risk: RiskLevel::Low,
            steps: vec![Step::new("Init repo", "git init"), Step::new("Add CI", "workflow")],
            files_involved: vec!["Cargo.toml".to_string()],
        });
        plan
    }

    #[test]
    fn test_risk_from_label() {
        assert_eq!(RiskLevel::from_label("HIGH"), RiskLevel::High);
        assert_eq!(RiskLevel::from_label(" low "), RiskLevel::Low);
        assert_eq!(RiskLevel::from_label("extreme"), RiskLevel::Medium);
    }

    #[test]
    fn test_plan_serializes_camel_case() {
        let plan = sample_plan();
        let json = serde_json::to_value(&plan).unwrap();

        assert!(json.get("createdAt").is_some());
        assert_eq!(json["phases"][0]["filesInvolved"][0], "Cargo.toml");
        assert_eq!(json["phases"][0]["risk"], "low");
        assert_eq!(json["phases"][0]["steps"][0]["status"], "pending");
        assert!(json.get("architecture").is_none());

        let back: Plan = serde_json::from_value(json).unwrap();
        assert_eq!(back, plan);
    }

    #[test]
    fn test_capture_artifacts() {
        let mut plan = Plan::new("Build a habit tracker");
        plan.capture_artifacts(Some("arch"), None, Some("api"));
        assert_eq!(plan.architecture.as_deref(), Some("arch"));
        assert!(plan.database.is_none());
        assert_eq!(plan.api.as_deref(), Some("api"));
    }

    #[test]
    fn test_new_steps_are_enabled_and_pending() {
        let plan = sample_plan();
        assert_eq!(plan.step_count(), 2);
        let step = &plan.phases[0].steps[1];
        assert!(step.enabled);
        assert_eq!(step.status, StepStatus::Pending);
        assert!(step.result.is_none());
        assert_ne!(step.id, plan.phases[0].steps[0].id);
    }
}
