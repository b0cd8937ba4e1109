//! Chat service: one user turn from message to streamed answer.
//!
//! This service handles the complete flow of:
//! 1. Routing the message to checkout when checkout is waiting for details
//! 2. Rendering the system prompt and rebuilding the message list
//! 3. Calling the model with the tool schemas
//! 4. Executing requested tools in order and feeding results back
//! 5. Streaming the final answer and recording the turn in history

use tracing::{error, info, instrument, warn};

use skin_edit_core::ChatRole;

use crate::config::ChatSettings;
use crate::db::{CommerceStore, RepositoryError};
use crate::llm::{ChatMessage, GatewayError, ModelGateway};
use crate::prompt::ContextRenderer;
use crate::session::Session;
use crate::tools::{CartSummary, TOOL_SCHEMAS, Tool, ToolExecutor, ToolName, ToolOutcome};
use crate::transport::{OutboundEvent, SinkClosed, TurnSink, strip_sentinel};

use super::checkout::{self, Checkout, CheckoutStep};

/// Sent when the iteration ceiling is hit.
pub const TOO_LONG_MESSAGE: &str = "Processing took too long. Please try again.";
/// History entry recorded when a turn hands over to checkout.
pub const CHECKOUT_HISTORY_ENTRY: &str = "Starting checkout process...";

const GATEWAY_ERROR_MESSAGE: &str =
    "Sorry, I can't reach the assistant right now. Please try again in a moment.";
const STORE_ERROR_MESSAGE: &str = "Sorry, something went wrong on our side. Please try again.";

/// Errors that end a turn early.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Model gateway error.
    #[error("model gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Data store error outside a tool call.
    #[error("data store error: {0}")]
    Store(#[from] RepositoryError),

    /// Too many tool iterations (possible infinite loop).
    #[error("too many tool iterations")]
    TooManyToolIterations,

    /// The client disconnected mid-turn.
    #[error(transparent)]
    Disconnected(#[from] SinkClosed),
}

impl ChatError {
    /// The terminal event shown to the user, or `None` when nobody is
    /// left to show it to.
    fn user_event(&self) -> Option<OutboundEvent> {
        match self {
            Self::Gateway(_) => Some(OutboundEvent::error(GATEWAY_ERROR_MESSAGE)),
            Self::Store(_) => Some(OutboundEvent::error(STORE_ERROR_MESSAGE)),
            Self::TooManyToolIterations => Some(OutboundEvent::message(TOO_LONG_MESSAGE)),
            Self::Disconnected(_) => None,
        }
    }
}

/// Chat service for one connection's turns.
pub struct ChatService<'a, G: ModelGateway + ?Sized, S: CommerceStore + ?Sized> {
    gateway: &'a G,
    store: &'a S,
    renderer: &'a ContextRenderer,
    settings: &'a ChatSettings,
}

impl<'a, G, S> ChatService<'a, G, S>
where
    G: ModelGateway + ?Sized,
    S: CommerceStore + ?Sized,
{
    /// Create a new chat service.
    #[must_use]
    pub const fn new(
        gateway: &'a G,
        store: &'a S,
        renderer: &'a ContextRenderer,
        settings: &'a ChatSettings,
    ) -> Self {
        Self {
            gateway,
            store,
            renderer,
            settings,
        }
    }

    /// Handle one user message.
    ///
    /// Every turn ends with exactly one end-of-turn marker, unless the client
    /// disconnects first.
    ///
    /// # Errors
    ///
    /// Returns `SinkClosed` if the client went away; the turn is abandoned
    /// without touching the history.
    #[instrument(skip_all, fields(connection_id = %session.id()))]
    pub async fn handle_message(
        &self,
        session: &mut Session,
        text: &str,
        sink: &mut dyn TurnSink,
    ) -> Result<(), SinkClosed> {
        let result = if session.awaiting_checkout() {
            self.checkout_turn(session, text, sink).await
        } else {
            self.agent_turn(session, text, sink).await
        };

        let Err(e) = result else {
            return Ok(());
        };
        let Some(event) = e.user_event() else {
            info!("Client disconnected mid-turn");
            return Err(SinkClosed);
        };

        if matches!(e, ChatError::TooManyToolIterations) {
            warn!("Too many tool iterations, stopping");
        } else {
            error!(error = %e, "Turn failed");
        }
        sink.send_event(&event).await?;
        sink.send_end().await
    }

    /// The model loop.
    async fn agent_turn(
        &self,
        session: &mut Session,
        text: &str,
        sink: &mut dyn TurnSink,
    ) -> Result<(), ChatError> {
        let system_prompt = self.renderer.render(self.store, session).await;

        let mut messages = Vec::with_capacity(session.history().len() + 2);
        messages.push(ChatMessage::system(system_prompt));
        messages.extend(
            session
                .history()
                .map(|entry| ChatMessage::text(entry.role, entry.content.clone())),
        );
        messages.push(ChatMessage::user(text));

        let executor = ToolExecutor::new(self.store);
        let mut iterations = 0;

        loop {
            iterations += 1;
            if iterations > self.settings.max_tool_iterations {
                return Err(ChatError::TooManyToolIterations);
            }

            let reply = self.gateway.complete(&messages, &TOOL_SCHEMAS).await?;
            info!(
                iteration = iterations,
                tool_calls = reply.tool_calls.len(),
                "Model response received"
            );

            if reply.tool_calls.is_empty() {
                let answer = strip_sentinel(reply.content.as_deref().unwrap_or_default());
                self.stream_answer(sink, &answer).await?;
                sink.send_end().await?;
                session.add_to_history(ChatRole::User, text);
                session.add_to_history(ChatRole::Assistant, answer);
                return Ok(());
            }

            let calls = reply.tool_calls.clone();
            messages.push(reply);

            for call in &calls {
                let label = ToolName::from_name(&call.function.name)
                    .map_or("Working on it...", ToolName::progress_label);
                sink.send_event(&OutboundEvent::thinking(label)).await?;

                let outcome = match Tool::parse(&call.function.name, &call.function.arguments) {
                    Ok(tool) => executor.execute(session, tool).await,
                    Err(e) => {
                        warn!(tool = %call.function.name, call_id = %call.id, error = %e, "Tool call rejected");
                        ToolOutcome::Error(e.to_string())
                    }
                };
                info!(
                    tool = %call.function.name,
                    call_id = %call.id,
                    outcome = outcome.kind(),
                    "Tool call handled"
                );

                if let ToolOutcome::Checkout(cart) = &outcome {
                    return self.start_checkout(session, text, cart, sink).await;
                }
                messages.push(ChatMessage::tool_result(call, outcome.to_model_payload().to_string()));
            }
        }
    }

    /// Hand the turn over to checkout. Remaining tool calls are dropped.
    async fn start_checkout(
        &self,
        session: &mut Session,
        text: &str,
        cart: &CartSummary,
        sink: &mut dyn TurnSink,
    ) -> Result<(), ChatError> {
        let summary = checkout::begin(session, cart);
        self.stream_answer(sink, &summary).await?;
        sink.send_end().await?;
        session.add_to_history(ChatRole::User, text);
        session.add_to_history(ChatRole::Assistant, CHECKOUT_HISTORY_ENTRY);
        Ok(())
    }

    /// A reply while checkout waits for delivery details.
    async fn checkout_turn(
        &self,
        session: &mut Session,
        text: &str,
        sink: &mut dyn TurnSink,
    ) -> Result<(), ChatError> {
        let step = Checkout::new(self.store).handle_reply(session, text).await?;
        if matches!(step, CheckoutStep::Placed(_)) {
            self.renderer.invalidate();
        }

        let reply = step.message();
        self.stream_answer(sink, &reply).await?;
        sink.send_end().await?;
        session.add_to_history(ChatRole::User, text);
        session.add_to_history(ChatRole::Assistant, reply);
        Ok(())
    }

    /// Send `text` in fixed-size chunks with a pause between them.
    async fn stream_answer(&self, sink: &mut dyn TurnSink, text: &str) -> Result<(), SinkClosed> {
        let chars: Vec<char> = text.chars().collect();
        let mut chunks = chars.chunks(self.settings.chunk_chars.max(1)).peekable();
        while let Some(chunk) = chunks.next() {
            sink.send_text(&chunk.iter().collect::<String>()).await?;
            if chunks.peek().is_some() && !self.settings.chunk_delay.is_zero() {
                tokio::time::sleep(self.settings.chunk_delay).await;
            }
        }
        Ok(())
    }
}
