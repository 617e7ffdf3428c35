//! Usage stats admin endpoint (spec §3): aggregate-only token usage, never
//! a per-request audit log (see Non-goals).

use rocket::serde::json::Json;
use rocket::State;
use std::sync::Arc;

use crate::db::EventStore;
use crate::error::GatewayError;
use crate::models::UsageStats;

use super::AdminKey;

#[rocket::get("/api/v1/admin/usage?<agent_id>")]
pub fn get_usage(
    _admin: AdminKey,
    agent_id: Option<&str>,
    store: &State<Arc<dyn EventStore>>,
) -> Result<Json<UsageStats>, GatewayError> {
    Ok(Json(store.get_usage_stats(agent_id)?))
}
