//! How the orchestrator reaches the relay

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::Serialize;
use thiserror::Error;

use super::state::ErrorKind;
use crate::relay::{
    ApiDesignRequest, ArchitectureRequest, BlueprintRequest, ClarifyRequest, DatabaseRequest, RelayEvent,
};
use crate::stage::StageKind;

/// Events from one stage stream, in the order the relay sent them
pub type RelayEventStream = Pin<Box<dyn Stream<Item = Result<RelayEvent, TransportError>> + Send>>;

/// A request body for one stage
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StageRequest {
    Clarify(ClarifyRequest),
    Architecture(ArchitectureRequest),
    Database(DatabaseRequest),
    ApiDesign(ApiDesignRequest),
    Blueprint(BlueprintRequest),
}

impl StageRequest {
    pub fn stage(&self) -> StageKind {
        match self {
            Self::Clarify(_) => StageKind::Clarify,
            Self::Architecture(_) => StageKind::Architecture,
            Self::Database(_) => StageKind::Database,
            Self::ApiDesign(_) => StageKind::Api,
            Self::Blueprint(_) => StageKind::Blueprint,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The relay refused the body (HTTP 400)
    #[error("request rejected: {0}")]
    Validation(String),

    /// The relay answered with some other non-success status
    #[error("relay returned {status}: {message}")]
    Http { status: u16, message: String },

    #[error("connection to relay failed: {0}")]
    Connection(String),

    /// The relay sent something that isn't a stage event
    #[error("unexpected relay response: {0}")]
    Protocol(String),

    /// The relay reported a model failure
    #[error("{0}")]
    Server(String),
}

impl TransportError {
    /// How a stage that hit this error should be marked
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Server(_) | Self::Http { .. } => ErrorKind::Gateway,
            Self::Connection(_) | Self::Protocol(_) => ErrorKind::Transport,
        }
    }
}

/// A way to run stages against a relay
#[async_trait]
pub trait StageTransport: Send + Sync {
    /// Ask for clarifying questions (a single JSON answer)
    async fn clarify(&self, request: &ClarifyRequest) -> Result<Vec<String>, TransportError>;

    /// Open the event stream for a streaming stage
    async fn open(&self, request: &StageRequest) -> Result<RelayEventStream, TransportError>;
}
