//! Binding administration (spec §3, §4.4): CRUD over the Binding Table plus
//! the workspace-scoped reassignment used for agent failover.

use rocket::serde::json::Json;
use rocket::State;

use crate::bindings::BindingTable;
use crate::error::GatewayError;
use crate::models::{Binding, CreateBinding, UpdateBinding};

use super::AdminKey;

#[rocket::post("/api/v1/admin/bindings", data = "<req>")]
pub fn create_binding(
    _admin: AdminKey,
    req: Json<CreateBinding>,
    bindings: &State<BindingTable>,
) -> Result<Json<Binding>, GatewayError> {
    let req = req.into_inner();
    let binding = bindings.create(
        &req.frontend,
        &req.channel_id,
        &req.agent_id,
        req.working_dir_hint.as_deref(),
        &req.created_by,
    )?;
    Ok(Json(binding))
}

#[rocket::patch("/api/v1/admin/bindings/<id>", data = "<req>")]
pub fn update_binding(
    _admin: AdminKey,
    id: &str,
    req: Json<UpdateBinding>,
    bindings: &State<BindingTable>,
) -> Result<Json<Binding>, GatewayError> {
    let binding = bindings.update(id, &req.agent_id)?;
    Ok(Json(binding))
}

#[rocket::delete("/api/v1/admin/bindings/<id>")]
pub fn delete_binding(_admin: AdminKey, id: &str, bindings: &State<BindingTable>) -> Result<(), GatewayError> {
    bindings.delete_by_id(id)
}

#[rocket::get("/api/v1/admin/bindings?<frontend>")]
pub fn list_bindings(
    _admin: AdminKey,
    frontend: Option<&str>,
    bindings: &State<BindingTable>,
) -> Result<Json<Vec<Binding>>, GatewayError> {
    Ok(Json(bindings.list(frontend)?))
}

#[rocket::get("/api/v1/admin/bindings/lookup?<frontend>&<channel_id>")]
pub fn lookup_binding(
    _admin: AdminKey,
    frontend: &str,
    channel_id: &str,
    bindings: &State<BindingTable>,
) -> Result<Json<Option<Binding>>, GatewayError> {
    Ok(Json(bindings.lookup(frontend, channel_id)?))
}

#[derive(Debug, serde::Deserialize)]
pub struct ReassignRequest {
    pub new_agent_id: String,
}

#[derive(Debug, serde::Serialize)]
pub struct ReassignResponse {
    pub reassigned_count: usize,
}

#[rocket::post("/api/v1/admin/workspaces/<workspace>/reassign", data = "<req>")]
pub fn reassign_by_workspace(
    _admin: AdminKey,
    workspace: &str,
    req: Json<ReassignRequest>,
    bindings: &State<BindingTable>,
) -> Result<Json<ReassignResponse>, GatewayError> {
    let count = bindings.reassign_by_workspace(workspace, &req.new_agent_id)?;
    Ok(Json(ReassignResponse { reassigned_count: count }))
}
