use std::fmt;

use serde::Deserialize;
use tracing::debug;

use crate::extract::{extract_json, unescape_diagram};
use crate::present::{Rendered, render};

/// Architecture answer in JSON form, as older prompts asked for it
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct StructuredArchitecture {
    pub overview: Option<String>,
    #[serde(alias = "mermaid_diagram", alias = "mermaidDiagram")]
    pub diagram: String,
    pub patterns: Vec<String>,
    pub tradeoffs: Vec<Tradeoff>,
    pub problem_context: Option<ProblemContext>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProblemContext {
    pub use_case: Option<String>,
}

/// A trade-off line: plain text, or a decision with its reason
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Tradeoff {
    Decision {
        decision: String,
        #[serde(default)]
        reason: Option<String>,
    },
    Note(String),
}

impl fmt::Display for Tradeoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Note(text) => write!(f, "{}", text),
            Self::Decision { decision, reason: None } => write!(f, "**{}**", decision),
            Self::Decision {
                decision,
                reason: Some(reason),
            } => write!(f, "**{}**: {}", decision, reason),
        }
    }
}

/// Every JSON shape the architecture stage has answered in
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ArchitectureJson {
    /// `{ "architecture": { ..., "mermaid_diagram": "..." } }`
    Wrapped { architecture: StructuredArchitecture },
    /// `{ "overview": "...", "diagram": "..." }`
    Flat(StructuredArchitecture),
}

impl ArchitectureJson {
    pub fn into_structured(self) -> StructuredArchitecture {
        match self {
            Self::Wrapped { architecture } | Self::Flat(architecture) => architecture,
        }
    }
}

/// The architecture stage's text, in whichever form the model chose
#[derive(Debug, Clone, PartialEq)]
pub enum ArchitectureArtifact {
    Structured(StructuredArchitecture),
    Markdown(String),
}

impl ArchitectureArtifact {
    /// Classify a finished architecture text
    ///
    /// JSON counts as structured only when it carries a diagram; anything
    /// else is treated as markdown.
    pub fn from_text(raw: &str) -> Self {
        debug!(raw_len = raw.len(), "ArchitectureArtifact::from_text: called");
        if raw.trim_start().starts_with('{') || raw.contains("```json") {
            match extract_json::<ArchitectureJson>(raw).map(ArchitectureJson::into_structured) {
                Ok(s) if !s.diagram.trim().is_empty() => return Self::Structured(s),
                Ok(_) => debug!("ArchitectureArtifact::from_text: JSON without diagram"),
                Err(e) => debug!(error = %e, "ArchitectureArtifact::from_text: not JSON"),
            }
        }
        Self::Markdown(raw.to_string())
    }

    pub fn to_rendered(&self) -> Rendered {
        match self {
            Self::Markdown(text) => render(text),
            Self::Structured(s) => {
                let mut body = String::new();
                let overview = s
                    .overview
                    .as_deref()
                    .or_else(|| s.problem_context.as_ref().and_then(|c| c.use_case.as_deref()));
                if let Some(overview) = overview {
                    body.push_str(overview.trim());
                    body.push_str("\n\n");
                }
                push_list(&mut body, "Patterns", &s.patterns);
                push_list(&mut body, "Trade-offs", &s.tradeoffs);
                Rendered {
                    diagram: Some(unescape_diagram(s.diagram.trim())),
                    body: body.trim_end().to_string(),
                    diagram_pending: false,
                }
            }
        }
    }
}

fn push_list<T: fmt::Display>(body: &mut String, heading: &str, items: &[T]) {
    if items.is_empty() {
        return;
    }
    body.push_str(&format!("## {}\n\n", heading));
    for item in items {
        body.push_str(&format!("- {}\n", item));
    }
    body.push('\n');
}
