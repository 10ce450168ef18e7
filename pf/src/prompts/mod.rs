//! Prompt Template System
//!
//! Template loading chain:
//! 1. `.planforge/prompts/{name}.pmt` (user override)
//! 2. `prompts/{name}.pmt` (repo default)
//! 3. Embedded fallback in code
//!
//! Each stage has a `{stage}` user template and a `{stage}-system` template,
//! rendered with Handlebars.

pub mod embedded;
mod loader;

pub use loader::{PromptClarification, PromptContext, PromptLoader};
