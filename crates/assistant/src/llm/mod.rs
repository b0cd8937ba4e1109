//! Model gateway: the assistant's only view of the language model.
//!
//! Requests follow the OpenAI chat completions shape
//! (`model`, `messages`, `tools`, `tool_choice: "auto"`, `stream: false`);
//! the reply is the first choice's assistant message, optionally carrying
//! tool calls.

pub mod client;
pub mod error;
pub mod types;

use async_trait::async_trait;

pub use client::GatewayClient;
pub use error::GatewayError;
pub use types::{ChatMessage, FunctionCall, FunctionSchema, ToolCall, ToolSchema};

/// A stateless completion call.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Send the full conversation and tool list; return the assistant reply.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSchema],
    ) -> Result<ChatMessage, GatewayError>;
}
