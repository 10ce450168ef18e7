//! Model gateway
//!
//! Stateless completion calls against an OpenAI-compatible endpoint, either
//! whole or as a stream of text fragments.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::debug;

pub mod client;
mod error;
mod openai;
pub mod sse;
mod types;

pub use client::LlmClient;
pub use error::LlmError;
pub use openai::{OpenAIClient, text_deltas};
pub use sse::{SseDecoder, SseFrame};
pub use types::{CompletionRequest, TextStream};

use crate::config::LlmConfig;
use crate::extract::extract_json;

/// Temperature used when the answer must be machine-readable
pub const JSON_TEMPERATURE: f32 = 0.3;

/// Create the model client described by config
pub fn create_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    debug!(base_url = %config.base_url, model = %config.model, "create_client: called");
    Ok(Arc::new(OpenAIClient::from_config(config)?))
}

/// Run a non-streaming completion and extract a JSON value from the answer
///
/// The request's temperature is forced down to [`JSON_TEMPERATURE`].
pub async fn complete_json<T: DeserializeOwned>(
    llm: &dyn LlmClient,
    request: CompletionRequest,
) -> Result<T, LlmError> {
    debug!(prompt_len = request.prompt.len(), "complete_json: called");
    let request = request.with_temperature(JSON_TEMPERATURE);
    let text = llm.complete(request).await?;
    let value = extract_json(&text)?;
    Ok(value)
}
