//! PlanForge - staged LLM planning pipeline
//!
//! A one-line intent is turned, stage by stage, into clarifying questions, an
//! architecture, a database schema, an API design and finally a phased
//! execution plan. Each stage's prompt is built from the finished text of the
//! stages before it.
//!
//! # Modules
//!
//! - [`llm`] - model gateway: completions against an OpenAI-compatible endpoint
//! - [`extract`] - pulling JSON and diagrams out of free-form model text
//! - [`relay`] - HTTP server that streams stage output as server-sent events
//! - [`pipeline`] - client-side stage state machine and orchestrator
//! - [`present`] - turning stage text into a diagram plus clean markdown
//! - [`plan`] - plan model and blueprint folding
//! - [`events`] - broadcast bus of pipeline events
//! - [`prompts`] - stage prompt templates
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod cli;
pub mod config;
pub mod events;
pub mod extract;
pub mod llm;
pub mod pipeline;
pub mod plan;
pub mod present;
pub mod prompts;
pub mod relay;
pub mod stage;

// Re-export commonly used types
pub use config::{Config, LlmConfig};
pub use events::{EventBus, EventEmitter, PipelineEvent};
pub use extract::{ExtractError, extract_diagram, extract_json};
pub use llm::{CompletionRequest, LlmClient, LlmError, OpenAIClient, create_client};
pub use pipeline::{HttpTransport, Orchestrator, PipelineState, StageReport, StageTransport};
pub use plan::{Phase, Plan, Step};
pub use present::{Rendered, render};
pub use prompts::{PromptContext, PromptLoader};
pub use stage::{GenerationStage, StageKind};
