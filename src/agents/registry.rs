//! Agent Registry (spec §3, §4.3): process-wide `agent_id -> AgentConnection`
//! map. Reader-many / writer-one, matching the teacher's `PresenceTracker`
//! shape (`RwLock<HashMap<..>>`) rather than introducing a new pattern.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::connection::AgentConnection;
use crate::models::AgentSummary;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegisterError {
    #[error("agent '{0}' already registered")]
    AlreadyRegistered(String),
}

#[derive(Clone)]
pub struct AgentRegistry {
    connections: Arc<RwLock<HashMap<String, Arc<AgentConnection>>>>,
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Fails with `AlreadyRegistered` if the id is already live (spec
    /// invariant 1: at most one Agent Connection per agent-id at any instant).
    pub fn register(&self, connection: Arc<AgentConnection>) -> Result<(), RegisterError> {
        let mut map = self.connections.write().unwrap_or_else(|e| e.into_inner());
        if map.contains_key(&connection.agent_id) {
            return Err(RegisterError::AlreadyRegistered(connection.agent_id.clone()));
        }
        map.insert(connection.agent_id.clone(), connection);
        Ok(())
    }

    /// Idempotent: dropping an unknown id is a no-op. The removed
    /// connection's pending channels are closed by the caller (the
    /// connection's own teardown path), not by the registry itself.
    pub fn unregister(&self, agent_id: &str) -> Option<Arc<AgentConnection>> {
        let mut map = self.connections.write().unwrap_or_else(|e| e.into_inner());
        map.remove(agent_id)
    }

    /// `None` means "not found" — the core does not distinguish a known
    /// principal with no live connection ("offline") from an unknown agent
    /// id; that distinction lives with the external auth collaborator
    /// (spec §4.3).
    pub fn get(&self, agent_id: &str) -> Option<Arc<AgentConnection>> {
        let map = self.connections.read().unwrap_or_else(|e| e.into_inner());
        map.get(agent_id).cloned()
    }

    pub fn list(&self) -> Vec<AgentSummary> {
        let map = self.connections.read().unwrap_or_else(|e| e.into_inner());
        map.values().map(|c| c.summary()).collect()
    }
}
