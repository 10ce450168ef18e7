//! Request and stream types for the model gateway

use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};

use super::LlmError;

/// Lazy, finite stream of non-empty text fragments
///
/// Pull-based and not restartable: dropping it closes the upstream
/// connection.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// A single stateless completion request
///
/// `None` for temperature or max tokens means "use the client default".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_system(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_fields() {
        let req = CompletionRequest::new("design a todo app")
            .with_system("you are an architect")
            .with_temperature(0.4)
            .with_max_tokens(8192);

        assert_eq!(req.prompt, "design a todo app");
        assert_eq!(req.system_prompt.as_deref(), Some("you are an architect"));
        assert_eq!(req.temperature, Some(0.4));
        assert_eq!(req.max_tokens, Some(8192));
    }

    #[test]
    fn test_new_leaves_defaults_unset() {
        let req = CompletionRequest::new("hi");
        assert!(req.system_prompt.is_none());
        assert!(req.temperature.is_none());
        assert!(req.max_tokens.is_none());
    }
}
