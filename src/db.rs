//! Event Store (spec §3, §4.1): the sole writer to durable state. Durable
//! append-only ledger of conversation events plus queryable bindings,
//! principals, and usage. Same shape as the teacher's `Db`: a single
//! `Mutex<Connection>` over rusqlite, WAL mode, idempotent
//! `ALTER TABLE ... ADD COLUMN` migrations.

use chrono::SecondsFormat;
use rusqlite::{params, Connection};
use std::sync::Mutex;

use crate::error::StoreError;
use crate::models::{
    Binding, Direction, EventKind, EventPage, LedgerEvent, Principal, PrincipalKind,
    PrincipalStatus, TokenUsageRecord, UsageStats,
};

/// Default/cap for `GetEvents` page size (spec §4.1).
pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 500;

/// Narrow interface the rest of the core depends on (spec §4.1). A trait so
/// `ConversationService`/the replay endpoint stay decoupled from the backend.
pub trait EventStore: Send + Sync {
    fn save_event(&self, event: &LedgerEvent) -> Result<(), StoreError>;
    fn get_events(
        &self,
        conversation_key: &str,
        cursor: Option<&str>,
        limit: i64,
    ) -> Result<EventPage, StoreError>;
    fn get_event(&self, id: &str) -> Result<Option<LedgerEvent>, StoreError>;

    fn create_binding(
        &self,
        frontend: &str,
        channel_id: &str,
        agent_id: &str,
        working_dir_hint: Option<&str>,
        created_by: &str,
    ) -> Result<Binding, StoreError>;
    fn update_binding(&self, id: &str, new_agent_id: &str) -> Result<Binding, StoreError>;
    fn delete_binding_by_id(&self, id: &str) -> Result<(), StoreError>;
    fn delete_binding_by_channel(&self, frontend: &str, channel_id: &str) -> Result<(), StoreError>;
    fn get_binding_by_channel(&self, frontend: &str, channel_id: &str) -> Result<Option<Binding>, StoreError>;
    fn list_bindings(&self, frontend: Option<&str>) -> Result<Vec<Binding>, StoreError>;
    fn reassign_by_workspace(&self, workspace: &str, new_agent_id: &str) -> Result<usize, StoreError>;

    fn get_principal(&self, id: &str) -> Result<Option<Principal>, StoreError>;
    fn upsert_principal(&self, principal: &Principal) -> Result<(), StoreError>;

    fn save_usage(&self, record: &TokenUsageRecord) -> Result<(), StoreError>;
    fn get_usage_stats(&self, agent_id: Option<&str>) -> Result<UsageStats, StoreError>;
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new(path: &str) -> Self {
        let conn = Connection::open(path).expect("Failed to open database");
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .expect("Failed to set pragmas");
        let store = SqliteStore {
            conn: Mutex::new(conn),
        };
        store.migrate();
        store
    }

    fn migrate(&self) {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                conversation_key TEXT NOT NULL,
                thread_id TEXT,
                direction TEXT NOT NULL,
                author TEXT NOT NULL,
                type TEXT NOT NULL,
                text TEXT,
                timestamp TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_events_conv_ts_id
                ON events(conversation_key, timestamp, id);

            CREATE TABLE IF NOT EXISTS principals (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                display_name TEXT NOT NULL,
                public_key_fingerprint TEXT UNIQUE,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS bindings (
                id TEXT PRIMARY KEY,
                frontend TEXT NOT NULL,
                channel_id TEXT NOT NULL,
                agent_id TEXT NOT NULL,
                working_dir_hint TEXT,
                created_at TEXT NOT NULL,
                created_by TEXT NOT NULL,
                UNIQUE(frontend, channel_id)
            );

            CREATE TABLE IF NOT EXISTS token_usage (
                id TEXT PRIMARY KEY,
                agent_id TEXT NOT NULL,
                request_id TEXT NOT NULL,
                input_tokens INTEGER NOT NULL DEFAULT 0,
                output_tokens INTEGER NOT NULL DEFAULT 0,
                cache_read_tokens INTEGER NOT NULL DEFAULT 0,
                cache_write_tokens INTEGER NOT NULL DEFAULT 0,
                thinking_tokens INTEGER NOT NULL DEFAULT 0,
                total_tokens INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_usage_agent ON token_usage(agent_id);",
        )
        .expect("Failed to run migrations");
    }

    fn row_to_event(row: &rusqlite::Row) -> rusqlite::Result<LedgerEvent> {
        let direction: String = row.get(3)?;
        let kind: String = row.get(4)?;
        Ok(LedgerEvent {
            id: row.get(0)?,
            conversation_key: row.get(1)?,
            thread_id: row.get(2)?,
            direction: parse_direction(&direction),
            author: row.get(5)?,
            kind: parse_kind(&kind),
            text: row.get(6)?,
            timestamp: row.get(7)?,
        })
    }

    fn row_to_binding(row: &rusqlite::Row) -> rusqlite::Result<Binding> {
        Ok(Binding {
            id: row.get(0)?,
            frontend: row.get(1)?,
            channel_id: row.get(2)?,
            agent_id: row.get(3)?,
            working_dir_hint: row.get(4)?,
            created_at: row.get(5)?,
            created_by: row.get(6)?,
        })
    }
}

fn direction_str(d: Direction) -> &'static str {
    match d {
        Direction::InboundToAgent => "inbound-to-agent",
        Direction::OutboundFromAgent => "outbound-from-agent",
    }
}

fn parse_direction(s: &str) -> Direction {
    match s {
        "inbound-to-agent" => Direction::InboundToAgent,
        _ => Direction::OutboundFromAgent,
    }
}

fn kind_str(k: EventKind) -> &'static str {
    match k {
        EventKind::Message => "message",
        EventKind::TextChunk => "text-chunk",
        EventKind::ToolCall => "tool-call",
        EventKind::ToolResult => "tool-result",
        EventKind::Thinking => "thinking",
        EventKind::Error => "error",
        EventKind::Done => "done",
    }
}

fn parse_kind(s: &str) -> EventKind {
    match s {
        "message" => EventKind::Message,
        "text-chunk" => EventKind::TextChunk,
        "tool-call" => EventKind::ToolCall,
        "tool-result" => EventKind::ToolResult,
        "thinking" => EventKind::Thinking,
        "error" => EventKind::Error,
        _ => EventKind::Done,
    }
}

fn principal_kind_str(k: PrincipalKind) -> &'static str {
    match k {
        PrincipalKind::Agent => "agent",
        PrincipalKind::Client => "client",
        PrincipalKind::Pack => "pack",
    }
}

fn parse_principal_kind(s: &str) -> PrincipalKind {
    match s {
        "agent" => PrincipalKind::Agent,
        "client" => PrincipalKind::Client,
        _ => PrincipalKind::Pack,
    }
}

fn principal_status_str(s: PrincipalStatus) -> &'static str {
    match s {
        PrincipalStatus::Pending => "pending",
        PrincipalStatus::Approved => "approved",
        PrincipalStatus::Revoked => "revoked",
    }
}

fn parse_principal_status(s: &str) -> PrincipalStatus {
    match s {
        "pending" => PrincipalStatus::Pending,
        "revoked" => PrincipalStatus::Revoked,
        _ => PrincipalStatus::Approved,
    }
}

/// Cursor codec: base64 of `"<timestamp>\u{0}<event-id>"`. Opaque to callers
/// per spec §4.1/§6; internally just the last-returned event's sort key.
mod cursor {
    use crate::error::StoreError;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

    pub fn encode(timestamp: &str, event_id: &str) -> String {
        let raw = format!("{timestamp}\u{0}{event_id}");
        URL_SAFE_NO_PAD.encode(raw.as_bytes())
    }

    pub fn decode(cursor: &str) -> Result<(String, String), StoreError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(cursor)
            .map_err(|_| StoreError::InvalidCursor)?;
        let raw = String::from_utf8(bytes).map_err(|_| StoreError::InvalidCursor)?;
        let mut parts = raw.splitn(2, '\u{0}');
        let timestamp = parts.next().ok_or(StoreError::InvalidCursor)?;
        let event_id = parts.next().ok_or(StoreError::InvalidCursor)?;
        Ok((timestamp.to_string(), event_id.to_string()))
    }
}

impl EventStore for SqliteStore {
    fn save_event(&self, event: &LedgerEvent) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(
            "INSERT INTO events (id, conversation_key, thread_id, direction, author, type, text, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                &event.id,
                &event.conversation_key,
                &event.thread_id,
                direction_str(event.direction),
                &event.author,
                kind_str(event.kind),
                &event.text,
                &event.timestamp,
            ],
        )
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    fn get_events(
        &self,
        conversation_key: &str,
        cursor: Option<&str>,
        limit: i64,
    ) -> Result<EventPage, StoreError> {
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());

        // Fetch one extra row to determine `has_more` without a second query.
        let fetch_limit = limit + 1;

        let mut rows = if let Some(cursor_str) = cursor {
            let (ts, id) = cursor::decode(cursor_str)?;
            let mut stmt = conn
                .prepare(
                    "SELECT id, conversation_key, thread_id, direction, author, type, text, timestamp
                     FROM events
                     WHERE conversation_key = ?1 AND (timestamp, id) > (?2, ?3)
                     ORDER BY timestamp ASC, id ASC
                     LIMIT ?4",
                )
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            stmt.query_map(params![conversation_key, ts, id, fetch_limit], Self::row_to_event)
                .map_err(|e| StoreError::Backend(e.to_string()))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| StoreError::Backend(e.to_string()))?
        } else {
            let mut stmt = conn
                .prepare(
                    "SELECT id, conversation_key, thread_id, direction, author, type, text, timestamp
                     FROM events
                     WHERE conversation_key = ?1
                     ORDER BY timestamp ASC, id ASC
                     LIMIT ?2",
                )
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            stmt.query_map(params![conversation_key, fetch_limit], Self::row_to_event)
                .map_err(|e| StoreError::Backend(e.to_string()))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| StoreError::Backend(e.to_string()))?
        };

        let has_more = rows.len() as i64 > limit;
        if has_more {
            rows.truncate(limit as usize);
        }
        let next_cursor = if has_more {
            rows.last().map(|e| cursor::encode(&e.timestamp, &e.id))
        } else {
            None
        };

        Ok(EventPage {
            events: rows,
            has_more,
            next_cursor,
        })
    }

    fn get_event(&self, id: &str) -> Result<Option<LedgerEvent>, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.query_row(
            "SELECT id, conversation_key, thread_id, direction, author, type, text, timestamp
             FROM events WHERE id = ?1",
            params![id],
            Self::row_to_event,
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(StoreError::Backend(other.to_string())),
        })
    }

    fn create_binding(
        &self,
        frontend: &str,
        channel_id: &str,
        agent_id: &str,
        working_dir_hint: Option<&str>,
        created_by: &str,
    ) -> Result<Binding, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true);
        conn.execute(
            "INSERT INTO bindings (id, frontend, channel_id, agent_id, working_dir_hint, created_at, created_by)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![&id, frontend, channel_id, agent_id, working_dir_hint, &now, created_by],
        )
        .map_err(|e| {
            if e.to_string().contains("UNIQUE") {
                StoreError::DuplicateChannel
            } else {
                StoreError::Backend(e.to_string())
            }
        })?;
        Ok(Binding {
            id,
            frontend: frontend.to_string(),
            channel_id: channel_id.to_string(),
            agent_id: agent_id.to_string(),
            working_dir_hint: working_dir_hint.map(String::from),
            created_at: now,
            created_by: created_by.to_string(),
        })
    }

    fn update_binding(&self, id: &str, new_agent_id: &str) -> Result<Binding, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let updated = conn
            .execute(
                "UPDATE bindings SET agent_id = ?1 WHERE id = ?2",
                params![new_agent_id, id],
            )
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        if updated == 0 {
            return Err(StoreError::NotFound);
        }
        conn.query_row(
            "SELECT id, frontend, channel_id, agent_id, working_dir_hint, created_at, created_by
             FROM bindings WHERE id = ?1",
            params![id],
            Self::row_to_binding,
        )
        .map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn delete_binding_by_id(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let deleted = conn
            .execute("DELETE FROM bindings WHERE id = ?1", params![id])
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        if deleted == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    fn delete_binding_by_channel(&self, frontend: &str, channel_id: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let deleted = conn
            .execute(
                "DELETE FROM bindings WHERE frontend = ?1 AND channel_id = ?2",
                params![frontend, channel_id],
            )
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        if deleted == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    fn get_binding_by_channel(&self, frontend: &str, channel_id: &str) -> Result<Option<Binding>, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.query_row(
            "SELECT id, frontend, channel_id, agent_id, working_dir_hint, created_at, created_by
             FROM bindings WHERE frontend = ?1 AND channel_id = ?2",
            params![frontend, channel_id],
            Self::row_to_binding,
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(StoreError::Backend(other.to_string())),
        })
    }

    fn list_bindings(&self, frontend: Option<&str>) -> Result<Vec<Binding>, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let mut stmt = if frontend.is_some() {
            conn.prepare(
                "SELECT id, frontend, channel_id, agent_id, working_dir_hint, created_at, created_by
                 FROM bindings WHERE frontend = ?1 ORDER BY created_at ASC",
            )
        } else {
            conn.prepare(
                "SELECT id, frontend, channel_id, agent_id, working_dir_hint, created_at, created_by
                 FROM bindings ORDER BY created_at ASC",
            )
        }
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        let rows = if let Some(f) = frontend {
            stmt.query_map(params![f], Self::row_to_binding)
        } else {
            stmt.query_map([], Self::row_to_binding)
        }
        .map_err(|e| StoreError::Backend(e.to_string()))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(rows)
    }

    fn reassign_by_workspace(&self, workspace: &str, new_agent_id: &str) -> Result<usize, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let suffix = format!("%_{workspace}");
        let updated = conn
            .execute(
                "UPDATE bindings SET agent_id = ?1 WHERE agent_id LIKE ?2",
                params![new_agent_id, suffix],
            )
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(updated)
    }

    fn get_principal(&self, id: &str) -> Result<Option<Principal>, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.query_row(
            "SELECT id, kind, display_name, public_key_fingerprint, status, created_at, updated_at
             FROM principals WHERE id = ?1",
            params![id],
            |row| {
                let kind: String = row.get(1)?;
                let status: String = row.get(4)?;
                Ok(Principal {
                    id: row.get(0)?,
                    kind: parse_principal_kind(&kind),
                    display_name: row.get(2)?,
                    public_key_fingerprint: row.get(3)?,
                    status: parse_principal_status(&status),
                    created_at: row.get(5)?,
                    updated_at: row.get(6)?,
                })
            },
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(StoreError::Backend(other.to_string())),
        })
    }

    fn upsert_principal(&self, principal: &Principal) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(
            "INSERT INTO principals (id, kind, display_name, public_key_fingerprint, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                kind = excluded.kind,
                display_name = excluded.display_name,
                public_key_fingerprint = excluded.public_key_fingerprint,
                status = excluded.status,
                updated_at = excluded.updated_at",
            params![
                &principal.id,
                principal_kind_str(principal.kind),
                &principal.display_name,
                &principal.public_key_fingerprint,
                principal_status_str(principal.status),
                &principal.created_at,
                &principal.updated_at,
            ],
        )
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    fn save_usage(&self, record: &TokenUsageRecord) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(
            "INSERT INTO token_usage (id, agent_id, request_id, input_tokens, output_tokens,
                cache_read_tokens, cache_write_tokens, thinking_tokens, total_tokens, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                uuid::Uuid::new_v4().to_string(),
                &record.agent_id,
                &record.request_id,
                record.input_tokens,
                record.output_tokens,
                record.cache_read_tokens,
                record.cache_write_tokens,
                record.thinking_tokens,
                record.total_tokens,
                &record.created_at,
            ],
        )
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    fn get_usage_stats(&self, agent_id: Option<&str>) -> Result<UsageStats, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let row = if let Some(id) = agent_id {
            conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(input_tokens),0), COALESCE(SUM(output_tokens),0),
                        COALESCE(SUM(cache_read_tokens),0), COALESCE(SUM(cache_write_tokens),0),
                        COALESCE(SUM(thinking_tokens),0), COALESCE(SUM(total_tokens),0)
                 FROM token_usage WHERE agent_id = ?1",
                params![id],
                |r| {
                    Ok(UsageStats {
                        agent_id: Some(id.to_string()),
                        request_count: r.get(0)?,
                        input_tokens: r.get(1)?,
                        output_tokens: r.get(2)?,
                        cache_read_tokens: r.get(3)?,
                        cache_write_tokens: r.get(4)?,
                        thinking_tokens: r.get(5)?,
                        total_tokens: r.get(6)?,
                    })
                },
            )
        } else {
            conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(input_tokens),0), COALESCE(SUM(output_tokens),0),
                        COALESCE(SUM(cache_read_tokens),0), COALESCE(SUM(cache_write_tokens),0),
                        COALESCE(SUM(thinking_tokens),0), COALESCE(SUM(total_tokens),0)
                 FROM token_usage",
                [],
                |r| {
                    Ok(UsageStats {
                        agent_id: None,
                        request_count: r.get(0)?,
                        input_tokens: r.get(1)?,
                        output_tokens: r.get(2)?,
                        cache_read_tokens: r.get(3)?,
                        cache_write_tokens: r.get(4)?,
                        thinking_tokens: r.get(5)?,
                        total_tokens: r.get(6)?,
                    })
                },
            )
        }
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(row)
    }
}
