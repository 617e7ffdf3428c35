//! Entity and wire types for the conversation gateway (spec §3).

use serde::{Deserialize, Serialize};

// --- Principal (spec §3) ---
//
// Identity is issued by an external auth collaborator; the core only reads
// principals to validate that an agent-id exists and is of kind=agent.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalKind {
    Agent,
    Client,
    Pack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalStatus {
    Pending,
    Approved,
    Revoked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub kind: PrincipalKind,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key_fingerprint: Option<String>,
    pub status: PrincipalStatus,
    pub created_at: String,
    pub updated_at: String,
}

// --- Ledger Event (spec §3, §4.1) ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    InboundToAgent,
    OutboundFromAgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    Message,
    TextChunk,
    ToolCall,
    ToolResult,
    Thinking,
    Error,
    Done,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub id: String,
    pub conversation_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    pub direction: Direction,
    pub author: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub timestamp: String,
}

impl LedgerEvent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        conversation_key: impl Into<String>,
        thread_id: Option<String>,
        direction: Direction,
        author: impl Into<String>,
        kind: EventKind,
        text: Option<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_key: conversation_key.into(),
            thread_id,
            direction,
            author: author.into(),
            kind,
            text,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// A page of events plus an opaque continuation cursor (spec §4.1, §6).
#[derive(Debug, Serialize)]
pub struct EventPage {
    pub events: Vec<LedgerEvent>,
    pub has_more: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

// --- Binding (spec §3, §4.4) ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Binding {
    pub id: String,
    pub frontend: String,
    pub channel_id: String,
    pub agent_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir_hint: Option<String>,
    pub created_at: String,
    pub created_by: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateBinding {
    pub frontend: String,
    pub channel_id: String,
    pub agent_id: String,
    #[serde(default)]
    pub working_dir_hint: Option<String>,
    #[serde(default = "default_system_principal")]
    pub created_by: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateBinding {
    pub agent_id: String,
}

fn default_system_principal() -> String {
    "system".to_string()
}

// --- Token Usage Record (spec §3, aggregate-only) ---

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct TokenUsageRecord {
    pub agent_id: String,
    pub request_id: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cache_read_tokens: i64,
    pub cache_write_tokens: i64,
    pub thinking_tokens: i64,
    pub total_tokens: i64,
    pub created_at: String,
}

#[derive(Debug, Default, Serialize)]
pub struct UsageStats {
    pub agent_id: Option<String>,
    pub request_count: i64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cache_read_tokens: i64,
    pub cache_write_tokens: i64,
    pub thinking_tokens: i64,
    pub total_tokens: i64,
}

// --- Client Send Endpoint (spec §4.7, §6) ---

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub conversation_key: String,
    pub content: String,
    pub idempotency_key: String,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub attachments: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SendStatus {
    Accepted,
    Duplicate,
}

#[derive(Debug, Serialize)]
pub struct SendReceipt {
    pub status: SendStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

// --- Agent roster (spec §4.3) ---

#[derive(Debug, Clone, Serialize)]
pub struct AgentSummary {
    pub agent_id: String,
    pub principal_id: String,
    pub display_name: String,
    pub capabilities: Vec<String>,
    pub workspaces: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    pub instance_id: String,
}
