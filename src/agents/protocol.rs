//! Wire protocol for the agent bidirectional stream (spec §4.3, §6).
//!
//! The spec leaves the concrete framing open ("abstract, not format-specific
//! ... must be framed so both sides can distinguish discrete messages"). This
//! gateway frames each message as one line of JSON over a plain TCP stream
//! (`tokio_util::codec::LinesCodec`), the same "one message per line" shape
//! the rest of the pack reaches for when it isn't already committed to gRPC.

use serde::{Deserialize, Serialize};

/// Messages sent by the agent to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AgentInbound {
    Register {
        agent_id: String,
        display_name: String,
        #[serde(default)]
        capabilities: Vec<String>,
        #[serde(default)]
        workspaces: Vec<String>,
        #[serde(default)]
        working_dir: Option<String>,
        #[serde(default)]
        git_info: Option<String>,
        #[serde(default)]
        os: Option<String>,
        #[serde(default)]
        hostname: Option<String>,
    },
    MessageResponse {
        request_id: String,
        event: AgentEvent,
    },
    Heartbeat,
}

/// One event in an agent's response stream for a single request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum AgentEvent {
    Thinking { text: String },
    Text { text: String },
    ToolUse { name: String, input: serde_json::Value },
    ToolResult { output: String },
    Error { message: String },
    Done { text: String },
}

impl AgentEvent {
    /// Terminal events (`done`, `error`) close the pending request's channel.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentEvent::Done { .. } | AgentEvent::Error { .. })
    }
}

/// Messages sent by the gateway to the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum GatewayOutbound {
    Welcome {
        server_id: String,
        agent_id: String,
        instance_id: String,
        principal_id: String,
    },
    SendMessage {
        request_id: String,
        thread_id: String,
        sender: String,
        content: String,
        #[serde(default)]
        attachments: Vec<String>,
        agent_id: String,
    },
    Heartbeat,
}
