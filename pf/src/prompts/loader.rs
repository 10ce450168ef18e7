//! Prompt Loader
//!
//! Loads prompt templates from files or falls back to embedded defaults.

use std::path::{Path, PathBuf};

use eyre::{Result, eyre};
use handlebars::{Handlebars, handlebars_helper};
use serde::Serialize;
use tracing::debug;

use super::embedded;
use crate::stage::StageKind;

handlebars_helper!(inc: |v: u64| v + 1);

/// One answered (or unanswered) clarifying question
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PromptClarification {
    pub question: String,
    pub answer: String,
}

/// Everything a stage template may refer to
///
/// Fields a stage doesn't consume are simply left empty.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PromptContext {
    pub intent: String,
    pub clarifications: Vec<PromptClarification>,
    pub architecture: Option<String>,
    pub database: Option<String>,
    pub api: Option<String>,
}

impl PromptContext {
    pub fn new(intent: impl Into<String>) -> Self {
        Self {
            intent: intent.into(),
            ..Default::default()
        }
    }
}

/// Loads and renders prompt templates
pub struct PromptLoader {
    hbs: Handlebars<'static>,
    /// User override directory (e.g., `.planforge/prompts/`)
    user_dir: Option<PathBuf>,
    /// Repo default directory (e.g., `prompts/`)
    repo_dir: Option<PathBuf>,
}

impl PromptLoader {
    /// Create a loader rooted at `root`
    ///
    /// Looks for `.planforge/prompts/` and `prompts/` under it; directories
    /// that don't exist are skipped.
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        debug!(?root, "PromptLoader::new: called");
        let user_dir = root.join(".planforge").join("prompts");
        let repo_dir = root.join("prompts");

        let user_dir_exists = user_dir.exists();
        let repo_dir_exists = repo_dir.exists();
        debug!(?user_dir, %user_dir_exists, ?repo_dir, %repo_dir_exists, "PromptLoader::new: checking directories");

        Self {
            hbs: Self::engine(),
            user_dir: user_dir_exists.then_some(user_dir),
            repo_dir: repo_dir_exists.then_some(repo_dir),
        }
    }

    /// Create a loader that only uses embedded prompts
    pub fn embedded_only() -> Self {
        debug!("PromptLoader::embedded_only: called");
        Self {
            hbs: Self::engine(),
            user_dir: None,
            repo_dir: None,
        }
    }

    fn engine() -> Handlebars<'static> {
        let mut hbs = Handlebars::new();
        hbs.register_escape_fn(handlebars::no_escape);
        hbs.register_helper("inc", Box::new(inc));
        hbs
    }

    /// Load a template by name, user override first
    fn load_template(&self, name: &str) -> Result<String> {
        debug!(%name, "PromptLoader::load_template: called");
        for dir in [&self.user_dir, &self.repo_dir].into_iter().flatten() {
            let path = dir.join(format!("{}.pmt", name));
            if path.exists() {
                debug!(?path, "PromptLoader::load_template: found on disk");
                return std::fs::read_to_string(&path)
                    .map_err(|e| eyre!("Failed to read prompt {}: {}", path.display(), e));
            }
        }

        if let Some(content) = embedded::get_embedded(name) {
            debug!(%name, "PromptLoader::load_template: found in embedded");
            return Ok(content.to_string());
        }

        Err(eyre!("Prompt template not found: {}", name))
    }

    /// Render a template with the given context
    pub fn render(&self, template_name: &str, context: &PromptContext) -> Result<String> {
        debug!(%template_name, intent_len = context.intent.len(), "PromptLoader::render: called");
        let template = self.load_template(template_name)?;
        self.hbs
            .render_template(&template, context)
            .map_err(|e| eyre!("Failed to render template {}: {}", template_name, e))
    }

    /// System and user prompt for one stage
    pub fn stage_prompts(&self, stage: StageKind, context: &PromptContext) -> Result<(String, String)> {
        debug!(%stage, "PromptLoader::stage_prompts: called");
        let system = self.render(&format!("{}-system", stage.name()), context)?;
        let user = self.render(stage.name(), context)?;
        Ok((system, user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn full_context() -> PromptContext {
        PromptContext {
            intent: "A recipe sharing site for home cooks".to_string(),
            clarifications: vec![
                PromptClarification {
                    question: "Do users need accounts?".to_string(),
                    answer: "Yes, with email login".to_string(),
                },
                PromptClarification {
                    question: "Expected traffic?".to_string(),
                    answer: String::new(),
                },
            ],
            architecture: Some("## Overview\nA monolith & a <db>".to_string()),
            database: Some("users(id, email)".to_string()),
            api: Some("GET /recipes".to_string()),
        }
    }

    #[test]
    fn test_architecture_prompt_numbers_clarifications() {
        let loader = PromptLoader::embedded_only();
        let (_, user) = loader.stage_prompts(StageKind::Architecture, &full_context()).unwrap();

        assert!(user.contains("A recipe sharing site for home cooks"));
        assert!(user.contains("Q1: Do users need accounts?"));
        assert!(user.contains("A1: Yes, with email login"));
        assert!(user.contains("Q2: Expected traffic?"));
        assert!(user.contains("A2: (no answer)"));
    }

    #[test]
    fn test_architecture_prompt_without_clarifications() {
        let loader = PromptLoader::embedded_only();
        let ctx = PromptContext::new("A recipe sharing site for home cooks");
        let (_, user) = loader.stage_prompts(StageKind::Architecture, &ctx).unwrap();
        assert!(user.contains("No additional context provided."));
    }

    #[test]
    fn test_prior_artifacts_are_not_html_escaped() {
        let loader = PromptLoader::embedded_only();
        let (system, user) = loader.stage_prompts(StageKind::Blueprint, &full_context()).unwrap();

        assert!(system.contains("\"phases\""));
        assert!(user.contains("A monolith & a <db>"));
        assert!(user.contains("users(id, email)"));
        assert!(user.contains("GET /recipes"));
    }

    #[test]
    fn test_user_override_wins() {
        let dir = tempfile::tempdir().unwrap();
        let user_dir = dir.path().join(".planforge").join("prompts");
        let repo_dir = dir.path().join("prompts");
        fs::create_dir_all(&user_dir).unwrap();
        fs::create_dir_all(&repo_dir).unwrap();
        fs::write(user_dir.join("clarify.pmt"), "override: {{intent}}").unwrap();
        fs::write(repo_dir.join("clarify.pmt"), "repo: {{intent}}").unwrap();
        fs::write(repo_dir.join("database.pmt"), "repo db: {{intent}}").unwrap();

        let loader = PromptLoader::new(dir.path());
        let ctx = PromptContext::new("inventory tracker");

        assert_eq!(loader.render("clarify", &ctx).unwrap(), "override: inventory tracker");
        assert_eq!(loader.render("database", &ctx).unwrap(), "repo db: inventory tracker");
        assert!(loader.render("api", &ctx).unwrap().contains("inventory tracker"));
    }

    #[test]
    fn test_unknown_template() {
        let loader = PromptLoader::embedded_only();
        assert!(loader.render("nonexistent-template", &PromptContext::default()).is_err());
    }
}
