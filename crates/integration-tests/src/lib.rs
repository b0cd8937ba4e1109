//! Integration tests for the Skin Edit assistant.
//!
//! # Running Tests
//!
//! ```bash
//! # In-memory conversation and API tests
//! cargo test -p skin-edit-integration-tests
//!
//! # PostgreSQL tests (needs a migrated database in DATABASE_URL)
//! cargo test -p skin-edit-integration-tests -- --ignored
//! ```
//!
//! # Test Categories
//!
//! - `conversation` - Multi-turn chats through the public chat service
//! - `api` - JSON API served over HTTP with the in-memory store
//! - `postgres_orders` - Order placement and status changes on `PostgreSQL`
//!
//! This crate holds the shared fixtures: the starter catalog, a scripted
//! model gateway and a recording sink.

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use skin_edit_assistant::config::ChatSettings;
use skin_edit_assistant::db::InMemoryStore;
use skin_edit_assistant::llm::{
    ChatMessage, FunctionCall, GatewayError, ModelGateway, ToolCall, ToolSchema,
};
use skin_edit_assistant::models::NewProduct;
use skin_edit_assistant::prompt::{ContextRenderer, STORE_NAME};
use skin_edit_assistant::transport::{END_SENTINEL, OutboundEvent, SinkClosed, TurnSink};
use skin_edit_core::ChatRole;

/// The starter catalog shipped in `data/catalog.yaml`.
pub const CATALOG_YAML: &str = include_str!("../../../data/catalog.yaml");

#[derive(Deserialize)]
struct CatalogFile {
    products: Vec<NewProduct>,
}

/// Products of the starter catalog, in file order.
pub fn catalog_products() -> Vec<NewProduct> {
    serde_yaml::from_str::<CatalogFile>(CATALOG_YAML)
        .unwrap()
        .products
}

/// An in-memory store loaded with the starter catalog. Product ids follow
/// file order starting at 1.
pub async fn catalog_store() -> InMemoryStore {
    let store = InMemoryStore::new();
    for product in catalog_products() {
        store.upsert_product(product).await;
    }
    store
}

/// Orchestrator settings without streaming delays.
pub fn fast_settings() -> ChatSettings {
    ChatSettings {
        chunk_delay: Duration::ZERO,
        ..ChatSettings::default()
    }
}

pub fn renderer() -> ContextRenderer {
    ContextRenderer::new(STORE_NAME, Duration::from_secs(60))
}

/// A tool call as the model would send it.
pub fn tool_call(id: &str, name: &str, arguments: &str) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        kind: "function".to_string(),
        function: FunctionCall {
            name: name.to_string(),
            arguments: arguments.to_string(),
        },
    }
}

/// An assistant reply that only requests tool calls.
pub fn calls(tool_calls: Vec<ToolCall>) -> ChatMessage {
    ChatMessage {
        role: ChatRole::Assistant,
        content: None,
        tool_calls,
        name: None,
        tool_call_id: None,
    }
}

/// Gateway that replays a fixed script of replies.
#[derive(Default)]
pub struct ScriptedGateway {
    script: Mutex<VecDeque<ChatMessage>>,
    calls: AtomicUsize,
}

impl ScriptedGateway {
    pub fn new(replies: Vec<ChatMessage>) -> Self {
        Self {
            script: Mutex::new(replies.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Append replies for the next turn.
    pub fn push(&self, replies: Vec<ChatMessage>) {
        self.script.lock().unwrap().extend(replies);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelGateway for ScriptedGateway {
    async fn complete(
        &self,
        _messages: &[ChatMessage],
        _tools: &[ToolSchema],
    ) -> Result<ChatMessage, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| GatewayError::Parse("script exhausted".to_string()))
    }
}

/// Sink that records text and events of one turn.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub text: String,
    pub events: Vec<OutboundEvent>,
    pub ends: usize,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TurnSink for RecordingSink {
    async fn send_text(&mut self, text: &str) -> Result<(), SinkClosed> {
        if text == END_SENTINEL {
            self.ends += 1;
        } else {
            self.text.push_str(text);
        }
        Ok(())
    }

    async fn send_event(&mut self, event: &OutboundEvent) -> Result<(), SinkClosed> {
        self.events.push(event.clone());
        Ok(())
    }
}
