//! LlmClient trait definition

use async_trait::async_trait;

use super::{CompletionRequest, LlmError, TextStream};

/// Stateless model client; every call is an independent conversation
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a single completion request and wait for the whole answer
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError>;

    /// Start a streaming completion
    ///
    /// Resolves once the upstream accepted the request. A non-success status
    /// is returned here rather than as the first stream item.
    async fn complete_stream(&self, request: CompletionRequest) -> Result<TextStream, LlmError>;
}
