//! Event Bus - pub/sub for pipeline events
//!
//! The orchestrator emits; renderers and loggers subscribe.

use tokio::sync::broadcast;
use tracing::debug;

use super::types::PipelineEvent;
use crate::pipeline::{ErrorKind, RunId};
use crate::stage::StageKind;

/// Default channel capacity (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 10_000;

pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "EventBus::new: creating event bus");
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Emit an event to all subscribers
    ///
    /// Fire-and-forget: with no subscribers the event is dropped. A lagging
    /// subscriber loses the oldest events.
    pub fn emit(&self, event: PipelineEvent) {
        debug!(event_type = event.event_type(), session_id = event.session_id(), "EventBus::emit");
        let _ = self.tx.send(event);
    }

    /// Subscribe to events emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        debug!("EventBus::subscribe: new subscriber");
        self.tx.subscribe()
    }

    /// Create an emitter bound to one pipeline session
    pub fn emitter_for(&self, session_id: impl Into<String>) -> EventEmitter {
        let session_id = session_id.into();
        debug!(%session_id, "EventBus::emitter_for: creating emitter");
        EventEmitter {
            tx: self.tx.clone(),
            session_id,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Cheap, cloneable handle that stamps every event with its session id
#[derive(Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<PipelineEvent>,
    session_id: String,
}

impl EventEmitter {
    /// An emitter with nobody listening
    pub fn detached(session_id: impl Into<String>) -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            session_id: session_id.into(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn emit(&self, event: PipelineEvent) {
        debug!(event_type = event.event_type(), "EventEmitter::emit");
        let _ = self.tx.send(event);
    }

    pub fn stage_started(&self, stage: StageKind, run_id: RunId) {
        self.emit(PipelineEvent::StageStarted {
            session_id: self.session_id.clone(),
            stage,
            run_id,
        });
    }

    pub fn chunk_applied(&self, stage: StageKind, run_id: RunId, content: &str) {
        self.emit(PipelineEvent::ChunkApplied {
            session_id: self.session_id.clone(),
            stage,
            run_id,
            content: content.to_string(),
        });
    }

    pub fn stage_completed(&self, stage: StageKind, run_id: RunId, content_len: usize) {
        self.emit(PipelineEvent::StageCompleted {
            session_id: self.session_id.clone(),
            stage,
            run_id,
            content_len,
        });
    }

    pub fn stage_failed(&self, stage: StageKind, run_id: RunId, kind: ErrorKind, message: &str) {
        self.emit(PipelineEvent::StageFailed {
            session_id: self.session_id.clone(),
            stage,
            run_id,
            kind,
            message: message.to_string(),
        });
    }

    pub fn stage_rejected(&self, stage: StageKind, reason: &str) {
        self.emit(PipelineEvent::StageRejected {
            session_id: self.session_id.clone(),
            stage,
            reason: reason.to_string(),
        });
    }

    pub fn plan_folded(&self, phase_count: usize) {
        self.emit(PipelineEvent::PlanFolded {
            session_id: self.session_id.clone(),
            phase_count,
        });
    }
}
