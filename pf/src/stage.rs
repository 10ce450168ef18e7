//! Pipeline stage vocabulary
//!
//! `GenerationStage` is the cursor the client walks forward through.
//! `StageKind` is a stage that can actually be run against the relay.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Position of the pipeline cursor, in fixed order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStage {
    #[default]
    Idle,
    Clarify,
    Architecture,
    Database,
    Api,
    Complete,
}

impl GenerationStage {
    /// All stages in pipeline order
    pub const ALL: [GenerationStage; 6] = [
        Self::Idle,
        Self::Clarify,
        Self::Architecture,
        Self::Database,
        Self::Api,
        Self::Complete,
    ];

    /// Zero-based position in the fixed ordering
    pub fn position(self) -> usize {
        self as usize
    }

    /// The stage after this one, if any
    pub fn next(self) -> Option<Self> {
        debug!(?self, "GenerationStage::next: called");
        match self {
            Self::Idle => Some(Self::Clarify),
            Self::Clarify => Some(Self::Architecture),
            Self::Architecture => Some(Self::Database),
            Self::Database => Some(Self::Api),
            Self::Api => Some(Self::Complete),
            Self::Complete => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Clarify => "clarify",
            Self::Architecture => "architecture",
            Self::Database => "database",
            Self::Api => "api",
            Self::Complete => "complete",
        }
    }
}

impl std::fmt::Display for GenerationStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A runnable stage; each one produces one artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Clarify,
    Architecture,
    Database,
    Api,
    Blueprint,
}

impl StageKind {
    /// All runnable stages in pipeline order
    pub const ALL: [StageKind; 5] = [
        Self::Clarify,
        Self::Architecture,
        Self::Database,
        Self::Api,
        Self::Blueprint,
    ];

    /// The cursor position this stage runs at
    ///
    /// The blueprint runs once the pipeline has reached `Complete`.
    pub fn generation_stage(self) -> GenerationStage {
        match self {
            Self::Clarify => GenerationStage::Clarify,
            Self::Architecture => GenerationStage::Architecture,
            Self::Database => GenerationStage::Database,
            Self::Api => GenerationStage::Api,
            Self::Blueprint => GenerationStage::Complete,
        }
    }

    /// Relay route for this stage
    pub fn endpoint(self) -> &'static str {
        match self {
            Self::Clarify => "/api/clarify",
            Self::Architecture => "/api/architecture",
            Self::Database => "/api/database",
            Self::Api => "/api/api-design",
            Self::Blueprint => "/api/blueprint",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Clarify => "clarify",
            Self::Architecture => "architecture",
            Self::Database => "database",
            Self::Api => "api",
            Self::Blueprint => "blueprint",
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for StageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "clarify" => Ok(Self::Clarify),
            "architecture" => Ok(Self::Architecture),
            "database" => Ok(Self::Database),
            "api" | "api-design" => Ok(Self::Api),
            "blueprint" => Ok(Self::Blueprint),
            other => Err(format!("Unknown stage: '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_stage_ordering() {
        assert!(GenerationStage::Idle < GenerationStage::Clarify);
        assert!(GenerationStage::Clarify < GenerationStage::Database);
        assert!(GenerationStage::Api < GenerationStage::Complete);
        for (i, stage) in GenerationStage::ALL.iter().enumerate() {
            assert_eq!(stage.position(), i);
        }
    }

    #[test]
    fn test_generation_stage_next_walks_forward() {
        let mut stage = GenerationStage::Idle;
        let mut visited = vec![stage];
        while let Some(next) = stage.next() {
            assert!(next > stage);
            visited.push(next);
            stage = next;
        }
        assert_eq!(visited, GenerationStage::ALL.to_vec());
    }

    #[test]
    fn test_blueprint_runs_at_complete() {
        assert_eq!(StageKind::Blueprint.generation_stage(), GenerationStage::Complete);
        assert_eq!(StageKind::Api.generation_stage(), GenerationStage::Api);
    }

    #[test]
    fn test_stage_kind_from_str() {
        assert_eq!("API-design".parse::<StageKind>(), Ok(StageKind::Api));
        assert_eq!("blueprint".parse::<StageKind>(), Ok(StageKind::Blueprint));
        assert!("deploy".parse::<StageKind>().is_err());
    }

    #[test]
    fn test_stage_serializes_snake_case() {
        let json = serde_json::to_string(&GenerationStage::Complete).unwrap();
        assert_eq!(json, "\"complete\"");
        let json = serde_json::to_string(&StageKind::Api).unwrap();
        assert_eq!(json, "\"api\"");
    }
}
