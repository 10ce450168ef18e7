//! Presentation adapter
//!
//! Splits stage text into a diagram and a markdown body that a renderer can
//! show as-is, on every update of a stream as well as on the final text.

use serde::Serialize;
use tracing::debug;

use crate::extract::markdown::{fix_tables, has_collapsed_table, sanitize_markdown};
use crate::extract::{extract_diagram, unescape_diagram};
use crate::plan::ArchitectureArtifact;
use crate::stage::StageKind;

const MERMAID_OPEN: &str = "```mermaid";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Rendered {
    pub diagram: Option<String>,
    pub body: String,
    /// A diagram has started streaming but its fence isn't closed yet
    pub diagram_pending: bool,
}

/// Render arbitrary, possibly incomplete, stage text
///
/// Text after an unclosed mermaid fence is held back from the body so a
/// half-written diagram is never shown as markdown.
pub fn render(content: &str) -> Rendered {
    debug!(len = content.len(), "render: called");
    let split = extract_diagram(content);

    let (rest, diagram_pending) = match split.rest.find(MERMAID_OPEN) {
        Some(pos) => (&split.rest[..pos], true),
        None => (split.rest.as_str(), false),
    };

    let mut body = sanitize_markdown(rest);
    if has_collapsed_table(&body) {
        debug!("render: falling back to aggressive table repair");
        body = fix_tables(&body);
    }

    Rendered {
        diagram: split.diagram.map(|d| unescape_diagram(&d)),
        body: body.trim().to_string(),
        diagram_pending,
    }
}

/// Render with knowledge of which stage produced the text
pub fn render_stage(stage: StageKind, content: &str) -> Rendered {
    debug!(%stage, len = content.len(), "render_stage: called");
    match stage {
        StageKind::Architecture => ArchitectureArtifact::from_text(content).to_rendered(),
        _ => render(content),
    }
}
