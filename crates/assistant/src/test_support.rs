//! Test doubles shared by unit tests.

#![allow(clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use rust_decimal::Decimal;

use skin_edit_core::ChatRole;

use crate::db::InMemoryStore;
use crate::llm::{ChatMessage, FunctionCall, GatewayError, ModelGateway, ToolCall, ToolSchema};
use crate::models::NewProduct;
use crate::transport::{END_SENTINEL, OutboundEvent, SinkClosed, TurnSink};

#[allow(clippy::too_many_arguments)]
pub fn new_product(
    sku: &str,
    name: &str,
    brand: &str,
    category: &str,
    price: i64,
    stock: u32,
    skin_types: &[&str],
    concerns: &[&str],
) -> NewProduct {
    NewProduct {
        sku: sku.to_string(),
        name: name.to_string(),
        brand: brand.to_string(),
        category: category.to_string(),
        price: Decimal::new(price, 0),
        stock,
        description: format!("{name} by {brand}."),
        ingredients: "Water, Glycerin, Niacinamide".to_string(),
        volume: Some("30ml".to_string()),
        skin_types: skin_types.iter().map(ToString::to_string).collect(),
        concerns: concerns.iter().map(ToString::to_string).collect(),
        image_filename: None,
    }
}

/// Ten serums (`SE-001`..`SE-010`, ids 1..=10, `SE-010` sold out), a
/// cleanser (`CL-001`, id 11) and a toner with one unit (`TN-001`, id 12).
pub async fn seeded_store() -> InMemoryStore {
    let store = InMemoryStore::new();
    for i in 1..=10_i64 {
        let stock = if i == 10 { 0 } else { 5 };
        store
            .upsert_product(new_product(
                &format!("SE-{i:03}"),
                &format!("Lumen Serum {i}"),
                "Lumen",
                "Serum",
                10_000 + i * 1_000,
                stock,
                &["Oily", "Combination"],
                &["acne"],
            ))
            .await;
    }
    store
        .upsert_product(new_product(
            "CL-001",
            "Gentle Foam Cleanser",
            "Aqua",
            "Cleanser",
            12_000,
            3,
            &["Dry", "Sensitive"],
            &["dryness"],
        ))
        .await;
    store
        .upsert_product(new_product(
            "TN-001",
            "Rose Toner",
            "Aqua",
            "Toner",
            9_000,
            1,
            &["All Skin Types"],
            &["dullness"],
        ))
        .await;
    store
}

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

pub fn calls(tool_calls: Vec<ToolCall>) -> ChatMessage {
    ChatMessage {
        role: ChatRole::Assistant,
        content: None,
        tool_calls,
        name: None,
        tool_call_id: None,
    }
}

enum Script {
    Queue(VecDeque<Result<ChatMessage, GatewayError>>),
    Always(ChatMessage),
}

/// Gateway that replays canned replies and records every request.
pub struct ScriptedGateway {
    script: Mutex<Script>,
    calls: AtomicUsize,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedGateway {
    pub fn new(replies: Vec<Result<ChatMessage, GatewayError>>) -> Self {
        Self::with_script(Script::Queue(replies.into()))
    }

    pub fn replies(replies: Vec<ChatMessage>) -> Self {
        Self::new(replies.into_iter().map(Ok).collect())
    }

    /// Returns the same reply forever.
    pub fn always(reply: ChatMessage) -> Self {
        Self::with_script(Script::Always(reply))
    }

    fn with_script(script: Script) -> Self {
        Self {
            script: Mutex::new(script),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelGateway for ScriptedGateway {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        _tools: &[ToolSchema],
    ) -> Result<ChatMessage, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(messages.to_vec());
        match &mut *self.script.lock().unwrap() {
            Script::Queue(queue) => queue
                .pop_front()
                .unwrap_or_else(|| Err(GatewayError::Parse("script exhausted".to_string()))),
            Script::Always(reply) => Ok(reply.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Event(OutboundEvent),
}

/// Sink that records every frame. Optionally fails after `capacity` frames.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub frames: Vec<Frame>,
    capacity: Option<usize>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose client disconnects after `frames` frames.
    pub fn closing_after(frames: usize) -> Self {
        Self {
            frames: Vec::new(),
            capacity: Some(frames),
        }
    }

    /// Concatenated text chunks, excluding the end sentinel.
    pub fn text(&self) -> String {
        self.frames
            .iter()
            .filter_map(|frame| match frame {
                Frame::Text(text) if text != END_SENTINEL => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn text_chunks(&self) -> Vec<&str> {
        self.frames
            .iter()
            .filter_map(|frame| match frame {
                Frame::Text(text) if text != END_SENTINEL => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn events(&self) -> Vec<&OutboundEvent> {
        self.frames
            .iter()
            .filter_map(|frame| match frame {
                Frame::Event(event) => Some(event),
                Frame::Text(_) => None,
            })
            .collect()
    }

    pub fn end_count(&self) -> usize {
        self.frames
            .iter()
            .filter(|frame| matches!(frame, Frame::Text(text) if text == END_SENTINEL))
            .count()
    }

    /// Whether the last frame is the end sentinel.
    pub fn ended(&self) -> bool {
        matches!(self.frames.last(), Some(Frame::Text(text)) if text == END_SENTINEL)
    }

    fn push(&mut self, frame: Frame) -> Result<(), SinkClosed> {
        if self.capacity.is_some_and(|cap| self.frames.len() >= cap) {
            return Err(SinkClosed);
        }
        self.frames.push(frame);
        Ok(())
    }
}

#[async_trait]
impl TurnSink for CollectingSink {
    async fn send_text(&mut self, text: &str) -> Result<(), SinkClosed> {
        self.push(Frame::Text(text.to_string()))
    }

    async fn send_event(&mut self, event: &OutboundEvent) -> Result<(), SinkClosed> {
        self.push(Frame::Event(event.clone()))
    }
}
