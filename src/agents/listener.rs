//! TCP accept loop for the agent bidirectional stream (spec §4.3, §6).
//!
//! Each accepted connection gets one reader task (demultiplexing
//! `MessageResponse`s into pending channels) and one writer task serializing
//! outbound `SendMessage`s onto the stream — spec §5's "Scheduling model".

use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{info, warn};
use uuid::Uuid;

use super::connection::AgentConnection;
use super::protocol::{AgentInbound, GatewayOutbound};
use super::registry::AgentRegistry;

/// Outbound channel buffer per connection's writer task.
const OUTBOUND_CHANNEL_BUFFER: usize = 32;

pub async fn run(
    addr: SocketAddr,
    registry: Arc<AgentRegistry>,
    server_id: String,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "agent listener bound");
    loop {
        let (socket, peer) = listener.accept().await?;
        let registry = registry.clone();
        let server_id = server_id.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(socket, registry, server_id).await {
                warn!(%peer, error = %e, "agent connection ended with error");
            }
        });
    }
}

async fn handle_connection(
    socket: TcpStream,
    registry: Arc<AgentRegistry>,
    server_id: String,
) -> std::io::Result<()> {
    let (read_half, write_half) = socket.into_split();
    let mut reader = FramedRead::new(read_half, LinesCodec::new());
    let mut writer = FramedWrite::new(write_half, LinesCodec::new());

    let first_line = match reader.next().await {
        Some(Ok(line)) => line,
        _ => return Ok(()),
    };

    let (agent_id, display_name, capabilities, workspaces, working_dir) =
        match serde_json::from_str::<AgentInbound>(&first_line) {
            Ok(AgentInbound::Register {
                agent_id,
                display_name,
                capabilities,
                workspaces,
                working_dir,
                ..
            }) => (agent_id, display_name, capabilities, workspaces, working_dir),
            _ => {
                warn!("first message on agent stream was not Register; closing (invalid-argument)");
                return Ok(());
            }
        };

    let principal_id = format!("agent:{agent_id}");
    let instance_id = Uuid::new_v4().to_string()[..8].to_string();

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<GatewayOutbound>(OUTBOUND_CHANNEL_BUFFER);

    let connection = Arc::new(AgentConnection::new(
        agent_id.clone(),
        principal_id.clone(),
        display_name,
        capabilities,
        workspaces,
        working_dir,
        instance_id.clone(),
        outbound_tx.clone(),
    ));

    if let Err(e) = registry.register(connection.clone()) {
        warn!(%agent_id, error = %e, "registration rejected (already-registered)");
        return Ok(());
    }
    info!(%agent_id, instance_id = %instance_id, "agent registered");

    let welcome = GatewayOutbound::Welcome {
        server_id,
        agent_id: agent_id.clone(),
        instance_id,
        principal_id,
    };
    if outbound_tx.send(welcome).await.is_err() {
        registry.unregister(&agent_id);
        return Ok(());
    }

    let writer_task = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            let line = match serde_json::to_string(&msg) {
                Ok(l) => l,
                Err(e) => {
                    warn!(error = %e, "failed to encode outbound message");
                    continue;
                }
            };
            if writer.send(line).await.is_err() {
                break;
            }
        }
    });

    while let Some(line) = reader.next().await {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                warn!(%agent_id, error = %e, "agent stream read error");
                break;
            }
        };
        match serde_json::from_str::<AgentInbound>(&line) {
            Ok(AgentInbound::MessageResponse { request_id, event }) => {
                connection.handle_response(&request_id, event).await;
            }
            Ok(AgentInbound::Heartbeat) => {}
            Ok(AgentInbound::Register { .. }) => {
                warn!(%agent_id, "ignoring re-sent Register on an already-open stream");
            }
            Err(e) => {
                warn!(%agent_id, error = %e, "failed to parse inbound frame");
            }
        }
    }

    // Stream ended (disconnect, transport error, shutdown): unregister and
    // close all pending response channels (spec §4.3 "Connection death").
    registry.unregister(&agent_id);
    connection.close();
    writer_task.abort();
    info!(%agent_id, "agent unregistered");

    Ok(())
}
