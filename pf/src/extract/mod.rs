//! Pulling structure out of model text
//!
//! Model answers arrive as markdown with JSON or mermaid diagrams embedded
//! somewhere inside. Everything here is pure and works the same on a
//! streamed concatenation as on a single non-streamed answer.

mod diagram;
mod json;
pub mod markdown;

pub use diagram::{DiagramSplit, extract_diagram, unescape_diagram};
pub use json::extract_json;

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractError {
    /// No parseable JSON in the text; `raw` is the untouched input
    #[error("Failed to parse LLM response as JSON: {message}")]
    Parse { message: String, raw: String },
}

impl ExtractError {
    pub fn raw(&self) -> &str {
        match self {
            ExtractError::Parse { raw, .. } => raw,
        }
    }
}
