//! Stream relay
//!
//! HTTP front for the model gateway. Each streaming stage validates its body,
//! answers with an event stream at once, and relays model fragments as
//! `chunk` events followed by a single `done` or `error`.

mod events;
mod handlers;
pub mod requests;
mod server;
mod stream;

pub use events::RelayEvent;
pub use handlers::FALLBACK_QUESTIONS;
pub use requests::{
    ApiDesignRequest, ArchitectureRequest, BlueprintRequest, ClarificationInput, ClarifyRequest, DatabaseRequest,
    FieldIssue, StagePayload, ValidJson, ValidationFailure,
};
pub use server::{AppState, router, serve, serve_with};
pub use stream::{RelayOutcome, into_sse, run_relay, spawn_relay};
