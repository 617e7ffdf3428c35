//! Conversation Service (spec §3, §4.6): the one component that talks to
//! both the Event Store and live Agent Connections. `send_message` is the
//! entire write path — validate, dedupe, persist the inbound turn, dispatch
//! to the agent, then hand the response stream to a detached consumer task
//! that persists and broadcasts each outbound event as it arrives.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::agents::protocol::AgentEvent;
use crate::agents::AgentRegistry;
use crate::broadcaster::Broadcaster;
use crate::db::EventStore;
use crate::dedup::DedupCache;
use crate::error::GatewayError;
use crate::models::{Direction, EventKind, LedgerEvent, SendMessageRequest, SendReceipt, SendStatus};

/// Overall budget for one agent turn before the consumer gives up (spec §4.6,
/// "Dispatch timeout"). An agent that never sends `done`/`error` within this
/// window leaves the conversation's last event as whatever was last
/// persisted; it does not retroactively fail the client's Send response,
/// which already returned `accepted`.
const TURN_TIMEOUT: Duration = Duration::from_secs(600);

/// Budget for a single persistence call inside the consumer loop. A store
/// that hangs must not wedge the whole turn (spec §4.6, "Persistence
/// failures are logged, never fatal to the stream").
const PERSIST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct ConversationService {
    store: Arc<dyn EventStore>,
    registry: AgentRegistry,
    broadcaster: Broadcaster,
    dedup: Arc<DedupCache>,
}

impl ConversationService {
    pub fn new(
        store: Arc<dyn EventStore>,
        registry: AgentRegistry,
        broadcaster: Broadcaster,
        dedup: Arc<DedupCache>,
    ) -> Self {
        Self {
            store,
            registry,
            broadcaster,
            dedup,
        }
    }

    /// Client Send Endpoint's core (spec §4.7). `conversation_key` addresses
    /// the agent directly; binding-based routing from a frontend channel is
    /// resolved one layer up, before this is called.
    pub async fn send_message(&self, req: SendMessageRequest) -> Result<SendReceipt, GatewayError> {
        if req.conversation_key.trim().is_empty() {
            return Err(GatewayError::InvalidArgument("conversation_key must not be empty".into()));
        }
        if req.content.trim().is_empty() {
            return Err(GatewayError::InvalidArgument("content must not be empty".into()));
        }
        if req.idempotency_key.trim().is_empty() || req.idempotency_key.len() > 100 {
            return Err(GatewayError::InvalidArgument(
                "idempotency_key must be non-empty and at most 100 bytes".into(),
            ));
        }

        let dedup_key = format!("client:{}", req.idempotency_key);
        if self.dedup.check(&dedup_key) {
            return Ok(SendReceipt {
                status: SendStatus::Duplicate,
                message_id: None,
            });
        }

        // Persist the inbound turn before the agent is ever contacted (spec
        // invariant 3): a routing/dispatch failure below still leaves this
        // event, plus a system error event, in the ledger.
        // `sender` is only carried on dispatch to the agent (spec §4.6 step
        // 6); the ledger author for the inbound turn is always "client"
        // (spec §4.6 step 4).
        let sender = req.sender.clone().unwrap_or_else(|| "client".to_string());
        let inbound = LedgerEvent::new(
            req.conversation_key.clone(),
            None,
            Direction::InboundToAgent,
            "client",
            EventKind::Message,
            Some(req.content.clone()),
        );
        self.store.save_event(&inbound)?;
        self.broadcaster.publish(&req.conversation_key, inbound.clone(), None);

        let connection = match self.registry.get(&req.conversation_key) {
            Some(c) => c,
            None => {
                self.persist_routing_error(&req.conversation_key, "agent is not connected")
                    .await;
                return Err(GatewayError::Unavailable(format!(
                    "agent '{}' is not connected",
                    req.conversation_key
                )));
            }
        };

        let attachments = req.attachments.clone().unwrap_or_default();
        let (_request_id, response_rx) = match connection
            .send_message(req.conversation_key.clone(), sender, req.content.clone(), attachments)
            .await
        {
            Ok(pair) => pair,
            Err(_) => {
                self.persist_routing_error(&req.conversation_key, "agent connection closed mid-dispatch")
                    .await;
                return Err(GatewayError::Unavailable(format!(
                    "agent '{}' connection closed mid-dispatch",
                    req.conversation_key
                )));
            }
        };

        self.dedup.mark(&dedup_key);

        let store = self.store.clone();
        let broadcaster = self.broadcaster.clone();
        let conversation_key = req.conversation_key.clone();
        tokio::spawn(async move {
            consume_response(store, broadcaster, conversation_key, response_rx).await;
        });

        Ok(SendReceipt {
            status: SendStatus::Accepted,
            message_id: Some(inbound.id),
        })
    }

    /// Persists (and broadcasts) a system-authored outbound error event so
    /// the ledger reflects a failed dispatch attempt, per spec §7 "Agent-send
    /// failures persist a system-authored outbound error event".
    async fn persist_routing_error(&self, conversation_key: &str, message: &str) {
        let event = LedgerEvent::new(
            conversation_key,
            None,
            Direction::OutboundFromAgent,
            "system",
            EventKind::Error,
            Some(message.to_string()),
        );
        match self.store.save_event(&event) {
            Ok(()) => self.broadcaster.publish(conversation_key, event, None),
            Err(e) => error!(conversation_key, error = %e, "failed to persist routing error event"),
        }
    }
}

/// Drains one agent response stream, persisting and broadcasting events per
/// spec §4.6.1:
/// - `thinking` is never persisted or broadcast (internal to the agent).
/// - `text-chunk` is broadcast live but not persisted (only the final
///   `done` text becomes the durable record).
/// - `tool-use`/`tool-result`/`error` are both persisted and broadcast.
/// - `done` is persisted and broadcast only if it carries non-empty text.
async fn consume_response(
    store: Arc<dyn EventStore>,
    broadcaster: Broadcaster,
    conversation_key: String,
    mut response_rx: mpsc::Receiver<AgentEvent>,
) {
    let outcome = tokio::time::timeout(TURN_TIMEOUT, async {
        while let Some(event) = response_rx.recv().await {
            handle_agent_event(&store, &broadcaster, &conversation_key, event).await;
        }
    })
    .await;

    if outcome.is_err() {
        warn!(conversation_key, "agent turn exceeded timeout without a terminal event");
    }
}

async fn handle_agent_event(
    store: &Arc<dyn EventStore>,
    broadcaster: &Broadcaster,
    conversation_key: &str,
    event: AgentEvent,
) {
    match event {
        AgentEvent::Thinking { .. } => {}
        AgentEvent::Text { text } => {
            let chunk = LedgerEvent::new(
                conversation_key,
                None,
                Direction::OutboundFromAgent,
                conversation_key,
                EventKind::TextChunk,
                Some(text),
            );
            broadcaster.publish(conversation_key, chunk, None);
        }
        AgentEvent::ToolUse { name, input } => {
            let text = serde_json::json!({ "name": name, "input": input }).to_string();
            persist_and_publish(store, broadcaster, conversation_key, EventKind::ToolCall, text).await;
        }
        AgentEvent::ToolResult { output } => {
            persist_and_publish(store, broadcaster, conversation_key, EventKind::ToolResult, output).await;
        }
        AgentEvent::Error { message } => {
            persist_and_publish(store, broadcaster, conversation_key, EventKind::Error, message).await;
        }
        AgentEvent::Done { text } => {
            if !text.is_empty() {
                persist_and_publish(store, broadcaster, conversation_key, EventKind::Done, text).await;
            }
        }
    }
}

async fn persist_and_publish(
    store: &Arc<dyn EventStore>,
    broadcaster: &Broadcaster,
    conversation_key: &str,
    kind: EventKind,
    text: String,
) {
    let event = LedgerEvent::new(
        conversation_key,
        None,
        Direction::OutboundFromAgent,
        conversation_key,
        kind,
        Some(text),
    );
    let store = store.clone();
    let to_save = event.clone();
    // `save_event` is a blocking rusqlite call; run it on the blocking pool
    // so the timeout below actually bounds it instead of racing a future
    // that never yields.
    let join = tokio::task::spawn_blocking(move || store.save_event(&to_save));
    let persisted = tokio::time::timeout(PERSIST_TIMEOUT, join).await;
    match persisted {
        Ok(Ok(Ok(()))) => broadcaster.publish(conversation_key, event, None),
        Ok(Ok(Err(e))) => error!(conversation_key, error = %e, "failed to persist agent event"),
        Ok(Err(e)) => error!(conversation_key, error = %e, "persist task panicked"),
        Err(_) => error!(conversation_key, "persisting agent event timed out"),
    }
}
