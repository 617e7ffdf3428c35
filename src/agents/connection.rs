//! Agent Connection (spec §3, §4.3): one live bidirectional stream endpoint
//! per registered agent, owning its pending-request demultiplexer.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use super::protocol::{AgentEvent, GatewayOutbound};
use crate::models::AgentSummary;

/// Buffer size for one pending request's response channel. Small: agents
/// produce modest bursts per request (spec §4.3, §5).
const PENDING_CHANNEL_BUFFER: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("agent connection is closed")]
    Closed,
}

/// One live agent connection. Created on `Register`, destroyed on stream end.
pub struct AgentConnection {
    pub agent_id: String,
    pub principal_id: String,
    pub display_name: String,
    pub capabilities: Vec<String>,
    pub workspaces: Vec<String>,
    pub working_dir: Option<String>,
    pub instance_id: String,
    outbound: mpsc::Sender<GatewayOutbound>,
    pending: Mutex<HashMap<String, mpsc::Sender<AgentEvent>>>,
}

impl AgentConnection {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        agent_id: String,
        principal_id: String,
        display_name: String,
        capabilities: Vec<String>,
        workspaces: Vec<String>,
        working_dir: Option<String>,
        instance_id: String,
        outbound: mpsc::Sender<GatewayOutbound>,
    ) -> Self {
        Self {
            agent_id,
            principal_id,
            display_name,
            capabilities,
            workspaces,
            working_dir,
            instance_id,
            outbound,
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn summary(&self) -> AgentSummary {
        AgentSummary {
            agent_id: self.agent_id.clone(),
            principal_id: self.principal_id.clone(),
            display_name: self.display_name.clone(),
            capabilities: self.capabilities.clone(),
            workspaces: self.workspaces.clone(),
            working_dir: self.working_dir.clone(),
            instance_id: self.instance_id.clone(),
        }
    }

    /// Dispatch a `SendMessage` to the agent. Allocates the request-id,
    /// registers the pending response channel, then writes to the stream.
    /// Returns the receive end so the caller (the conversation service's
    /// consumer task) can drain response events (spec §4.3 "Request
    /// dispatch").
    pub async fn send_message(
        &self,
        thread_id: String,
        sender: String,
        content: String,
        attachments: Vec<String>,
    ) -> Result<(String, mpsc::Receiver<AgentEvent>), SendError> {
        let request_id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel(PENDING_CHANNEL_BUFFER);

        {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.insert(request_id.clone(), tx);
        }

        let outbound = GatewayOutbound::SendMessage {
            request_id: request_id.clone(),
            thread_id,
            sender,
            content,
            attachments,
            agent_id: self.agent_id.clone(),
        };

        if self.outbound.send(outbound).await.is_err() {
            // Writer task is gone; undo the registration so we don't leak it.
            self.pending
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&request_id);
            return Err(SendError::Closed);
        }

        Ok((request_id, rx))
    }

    /// Demultiplex an incoming `MessageResponse` into the matching pending
    /// channel. Called by the connection's reader task. A terminal event
    /// removes the entry after forwarding, closing the channel for the
    /// waiting consumer.
    ///
    /// Uses a blocking `send` rather than `try_send`: spec §5 requires a
    /// full pending channel to push back on the reader (and transitively on
    /// the agent), not drop the event. Dropping here could silently lose a
    /// terminal `done`/`error`, since the entry is already removed from the
    /// map before the send is attempted.
    pub async fn handle_response(&self, request_id: &str, event: AgentEvent) {
        let terminal = event.is_terminal();
        let sender = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            if terminal {
                pending.remove(request_id)
            } else {
                pending.get(request_id).cloned()
            }
        };

        match sender {
            Some(tx) => {
                if tx.send(event).await.is_err() {
                    warn!(
                        agent_id = %self.agent_id,
                        request_id = %request_id,
                        "pending response channel closed, dropping event",
                    );
                }
            }
            None => {
                warn!(
                    agent_id = %self.agent_id,
                    request_id = %request_id,
                    "response for unknown or already-closed request-id",
                );
            }
        }
    }

    /// Stream end or error: close every pending response channel so waiting
    /// consumers observe end-of-stream rather than hanging forever (spec
    /// §4.3 "Connection death").
    pub fn close(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.clear();
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_conn() -> (AgentConnection, mpsc::Receiver<GatewayOutbound>) {
        let (tx, rx) = mpsc::channel(16);
        let conn = AgentConnection::new(
            "a1".into(),
            "p1".into(),
            "Agent One".into(),
            vec!["base".into()],
            vec![],
            None,
            "inst1".into(),
            tx,
        );
        (conn, rx)
    }

    #[tokio::test]
    async fn send_message_allocates_request_and_demuxes_response() {
        let (conn, mut outbound_rx) = make_conn();
        let (request_id, mut resp_rx) = conn
            .send_message("t1".into(), "client".into(), "hi".into(), vec![])
            .await
            .unwrap();

        let outbound = outbound_rx.recv().await.unwrap();
        match outbound {
            GatewayOutbound::SendMessage {
                request_id: sent_id,
                ..
            } => assert_eq!(sent_id, request_id),
            _ => panic!("expected SendMessage"),
        }

        conn.handle_response(
            &request_id,
            AgentEvent::Text {
                text: "pong".into(),
            },
        )
        .await;
        conn.handle_response(
            &request_id,
            AgentEvent::Done {
                text: "pong".into(),
            },
        )
        .await;

        assert!(matches!(resp_rx.recv().await, Some(AgentEvent::Text { .. })));
        assert!(matches!(resp_rx.recv().await, Some(AgentEvent::Done { .. })));
        // Terminal event removed the entry; channel is now closed.
        assert!(resp_rx.recv().await.is_none());
        assert_eq!(conn.pending_count(), 0);
    }

    #[tokio::test]
    async fn close_drops_pending_channels() {
        let (conn, _outbound_rx) = make_conn();
        let (_request_id, mut resp_rx) = conn
            .send_message("t1".into(), "client".into(), "hi".into(), vec![])
            .await
            .unwrap();
        conn.close();
        assert!(resp_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn send_message_fails_once_writer_is_gone() {
        let (conn, outbound_rx) = make_conn();
        drop(outbound_rx);
        let result = conn
            .send_message("t1".into(), "client".into(), "hi".into(), vec![])
            .await;
        assert!(result.is_err());
        assert_eq!(conn.pending_count(), 0);
    }
}
