//! Binding Table (spec §3, §4.4): routes a `(frontend, channel_id)` pair to
//! the agent currently responsible for it. A thin validating wrapper over
//! the Event Store's binding operations — `agent_id` must name a principal
//! of kind `agent` before a binding can point at it.

use std::sync::Arc;

use crate::db::EventStore;
use crate::error::GatewayError;
use crate::models::{Binding, PrincipalKind};

pub struct BindingTable {
    store: Arc<dyn EventStore>,
}

impl BindingTable {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    fn validate_agent(&self, agent_id: &str) -> Result<(), GatewayError> {
        match self.store.get_principal(agent_id)? {
            Some(p) if p.kind == PrincipalKind::Agent => Ok(()),
            Some(_) => Err(GatewayError::InvalidArgument(format!(
                "{agent_id} is not an agent principal"
            ))),
            None => Err(GatewayError::NotFound(format!(
                "no principal registered for {agent_id}"
            ))),
        }
    }

    pub fn create(
        &self,
        frontend: &str,
        channel_id: &str,
        agent_id: &str,
        working_dir_hint: Option<&str>,
        created_by: &str,
    ) -> Result<Binding, GatewayError> {
        self.validate_agent(agent_id)?;
        Ok(self
            .store
            .create_binding(frontend, channel_id, agent_id, working_dir_hint, created_by)?)
    }

    pub fn update(&self, id: &str, new_agent_id: &str) -> Result<Binding, GatewayError> {
        self.validate_agent(new_agent_id)?;
        Ok(self.store.update_binding(id, new_agent_id)?)
    }

    pub fn delete_by_id(&self, id: &str) -> Result<(), GatewayError> {
        Ok(self.store.delete_binding_by_id(id)?)
    }

    pub fn delete_by_channel(&self, frontend: &str, channel_id: &str) -> Result<(), GatewayError> {
        Ok(self.store.delete_binding_by_channel(frontend, channel_id)?)
    }

    pub fn lookup(&self, frontend: &str, channel_id: &str) -> Result<Option<Binding>, GatewayError> {
        Ok(self.store.get_binding_by_channel(frontend, channel_id)?)
    }

    pub fn list(&self, frontend: Option<&str>) -> Result<Vec<Binding>, GatewayError> {
        Ok(self.store.list_bindings(frontend)?)
    }

    /// Reassigns every binding whose `agent_id` carries `_<workspace>` as a
    /// suffix to `new_agent_id` (spec §4.4's workspace-scoped failover).
    pub fn reassign_by_workspace(&self, workspace: &str, new_agent_id: &str) -> Result<usize, GatewayError> {
        self.validate_agent(new_agent_id)?;
        Ok(self.store.reassign_by_workspace(workspace, new_agent_id)?)
    }
}
