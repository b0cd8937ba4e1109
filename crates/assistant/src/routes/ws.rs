//! Websocket chat endpoint.
//!
//! One connection is one conversation. The connection task owns its
//! [`Session`]; the registry only sees a guard that deregisters on drop.
//!
//! The socket is split so incoming frames are still read while a turn runs:
//! a close or transport error cancels the in-flight turn, and text that
//! arrives early is queued for the next turn.

use std::collections::VecDeque;

use async_trait::async_trait;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use tracing::{debug, info, warn};

use crate::services::ChatService;
use crate::session::Session;
use crate::state::AppState;
use crate::transport::{OutboundEvent, SinkClosed, TurnSink};

/// Upgrade to a websocket chat connection.
pub async fn chat(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Outbound half of the socket.
struct WsSink {
    sender: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl TurnSink for WsSink {
    async fn send_text(&mut self, text: &str) -> Result<(), SinkClosed> {
        self.sender
            .send(Message::Text(text.into()))
            .await
            .map_err(|_| SinkClosed)
    }

    async fn send_event(&mut self, event: &OutboundEvent) -> Result<(), SinkClosed> {
        let payload = serde_json::to_string(event).map_err(|e| {
            warn!(error = %e, "Failed to encode outbound event");
            SinkClosed
        })?;
        self.send_text(&payload).await
    }
}

/// What the client sent.
enum Incoming {
    Text(String),
    Ignored,
    Closed,
}

fn classify(frame: Option<Result<Message, axum::Error>>) -> Incoming {
    match frame {
        Some(Ok(Message::Text(text))) => {
            let text = text.as_str().trim();
            if text.is_empty() {
                Incoming::Ignored
            } else {
                Incoming::Text(text.to_string())
            }
        }
        Some(Ok(Message::Binary(_) | Message::Ping(_) | Message::Pong(_))) => Incoming::Ignored,
        Some(Ok(Message::Close(_))) | None => Incoming::Closed,
        Some(Err(e)) => {
            debug!(error = %e, "Websocket receive error");
            Incoming::Closed
        }
    }
}

async fn next_message(
    receiver: &mut SplitStream<WebSocket>,
    pending: &mut VecDeque<String>,
) -> Option<String> {
    if let Some(text) = pending.pop_front() {
        return Some(text);
    }
    loop {
        match classify(receiver.next().await) {
            Incoming::Text(text) => return Some(text),
            Incoming::Ignored => {}
            Incoming::Closed => return None,
        }
    }
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let guard = state.sessions().register();
    let mut session = Session::new(guard.id());
    let (sender, mut receiver) = socket.split();
    let mut sink = WsSink { sender };
    let mut pending = VecDeque::new();

    info!(connection_id = %guard.id(), "Chat connection opened");

    let service = ChatService::new(
        state.gateway(),
        state.store(),
        state.renderer(),
        state.chat_settings(),
    );

    'connection: while let Some(text) = next_message(&mut receiver, &mut pending).await {
        let turn = service.handle_message(&mut session, &text, &mut sink);
        tokio::pin!(turn);

        loop {
            tokio::select! {
                result = &mut turn => {
                    if result.is_err() {
                        break 'connection;
                    }
                    guard.record_turn();
                    break;
                }
                frame = receiver.next() => match classify(frame) {
                    Incoming::Text(queued) => pending.push_back(queued),
                    Incoming::Ignored => {}
                    Incoming::Closed => {
                        debug!(connection_id = %guard.id(), "Client left mid-turn");
                        break 'connection;
                    }
                },
            }
        }
    }

    info!(
        connection_id = %guard.id(),
        cart_lines = session.cart().len(),
        "Chat connection closed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_frames() {
        assert!(matches!(
            classify(Some(Ok(Message::Text("  hi there ".into())))),
            Incoming::Text(text) if text == "hi there"
        ));
        assert!(matches!(
            classify(Some(Ok(Message::Text("   ".into())))),
            Incoming::Ignored
        ));
        assert!(matches!(
            classify(Some(Ok(Message::Ping(Vec::new().into())))),
            Incoming::Ignored
        ));
        assert!(matches!(classify(Some(Ok(Message::Close(None)))), Incoming::Closed));
        assert!(matches!(classify(None), Incoming::Closed));
    }
}
