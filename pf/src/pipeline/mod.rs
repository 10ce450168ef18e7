//! Stage orchestrator (client side)
//!
//! `PipelineState` holds the cursor, per-stage streaming state, the
//! clarifications and the plan. `Orchestrator` feeds it actions from a
//! `StageTransport`, normally the relay over HTTP.

mod http;
mod orchestrator;
mod state;
pub mod transport;

pub use http::HttpTransport;
pub use orchestrator::{Orchestrator, StageReport};
pub use state::{Action, ErrorKind, IgnoreReason, Outcome, PipelineError, PipelineState, RunId, StreamingState};
pub use transport::{RelayEventStream, StageRequest, StageTransport, TransportError};
