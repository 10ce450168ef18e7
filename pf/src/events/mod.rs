//! Event bus for live pipeline observability
//!
//! Every transition the orchestrator applies is published here. The CLI
//! subscribes to print streamed text as it arrives.
//!
//! ```rust,ignore
//! let bus = EventBus::with_default_capacity();
//! let mut rx = bus.subscribe();
//! let orchestrator = Orchestrator::new(transport, bus.emitter_for("session"));
//! while let Ok(event) = rx.recv().await {
//!     println!("{:?}", event);
//! }
//! ```

mod bus;
mod types;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus, EventEmitter};
pub use types::PipelineEvent;
