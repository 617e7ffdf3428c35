//! Health and roster endpoints, adapted from the teacher's `system.rs`.

use rocket::serde::json::Json;
use rocket::State;

use crate::agents::AgentRegistry;
use crate::models::AgentSummary;

#[rocket::get("/health")]
pub fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[rocket::get("/api/v1/admin/agents")]
pub fn list_agents(registry: &State<AgentRegistry>) -> Json<Vec<AgentSummary>> {
    Json(registry.list())
}

#[rocket::catch(404)]
pub fn not_found() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "error": "not found", "kind": "not-found" }))
}

#[rocket::catch(429)]
pub fn too_many_requests() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "error": "too many requests", "kind": "unavailable" }))
}
