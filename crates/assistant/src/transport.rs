//! Outbound side of a chat connection.
//!
//! The chat core writes plain text chunks and typed events to a [`TurnSink`].
//! Every turn ends with [`END_SENTINEL`] so clients know when to stop waiting.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Marks the end of a turn. Never part of real content.
pub const END_SENTINEL: &str = "__END__";

/// The client went away; the current send is abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("client connection closed")]
pub struct SinkClosed;

/// A structured frame sent to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundEvent {
    Message { content: String },
    /// Progress note while a tool runs.
    Thinking { content: String },
    Error { message: String },
}

impl OutboundEvent {
    #[must_use]
    pub fn thinking(content: impl Into<String>) -> Self {
        Self::Thinking {
            content: content.into(),
        }
    }

    #[must_use]
    pub fn message(content: impl Into<String>) -> Self {
        Self::Message {
            content: content.into(),
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// Where a turn's output goes.
#[async_trait]
pub trait TurnSink: Send {
    /// Send a raw text chunk.
    async fn send_text(&mut self, text: &str) -> Result<(), SinkClosed>;

    /// Send a structured event.
    async fn send_event(&mut self, event: &OutboundEvent) -> Result<(), SinkClosed>;

    /// Mark the end of the turn.
    async fn send_end(&mut self) -> Result<(), SinkClosed> {
        self.send_text(END_SENTINEL).await
    }
}

/// Remove every occurrence of the end sentinel from model-produced text.
#[must_use]
pub fn strip_sentinel(text: &str) -> String {
    text.replace(END_SENTINEL, "")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_format() {
        let json = serde_json::to_value(OutboundEvent::thinking("Searching products...")).unwrap();
        assert_eq!(json["type"], "thinking");
        assert_eq!(json["content"], "Searching products...");

        let json = serde_json::to_value(OutboundEvent::error("boom")).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["message"], "boom");
        assert!(json.get("content").is_none());
    }

    #[test]
    fn test_strip_sentinel() {
        assert_eq!(strip_sentinel("Done __END__ here"), "Done  here");
        assert_eq!(strip_sentinel("plain"), "plain");
    }
}
