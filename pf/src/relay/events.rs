//! Wire events sent to the client on a stage stream

use axum::response::sse::Event;
use serde::{Deserialize, Serialize};

/// One `data:` payload on a stage stream
///
/// A stream carries any number of `chunk` events followed by exactly one
/// `done` or `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RelayEvent {
    Chunk { content: String },
    Done { content: String },
    Error { error: String },
}

impl RelayEvent {
    pub fn chunk(content: impl Into<String>) -> Self {
        Self::Chunk {
            content: content.into(),
        }
    }

    pub fn done(content: impl Into<String>) -> Self {
        Self::Done {
            content: content.into(),
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self::Error { error: error.into() }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Chunk { .. })
    }

    pub fn to_sse_event(&self) -> Result<Event, axum::Error> {
        Event::default().json_data(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        assert_eq!(
            serde_json::to_string(&RelayEvent::chunk("Hel")).unwrap(),
            r#"{"type":"chunk","content":"Hel"}"#
        );
        assert_eq!(
            serde_json::to_string(&RelayEvent::done("Hello")).unwrap(),
            r#"{"type":"done","content":"Hello"}"#
        );
        assert_eq!(
            serde_json::to_string(&RelayEvent::error("LLM request failed: 500 - overloaded")).unwrap(),
            r#"{"type":"error","error":"LLM request failed: 500 - overloaded"}"#
        );
    }

    #[test]
    fn test_parse_and_terminal() {
        let event: RelayEvent = serde_json::from_str(r#"{"type":"done","content":"x"}"#).unwrap();
        assert!(event.is_terminal());
        assert!(!RelayEvent::chunk("x").is_terminal());
        assert!(RelayEvent::error("x").is_terminal());
        assert!(serde_json::from_str::<RelayEvent>(r#"{"type":"progress"}"#).is_err());
    }
}
