use rocket::http::{ContentType, Status};

use crate::common::{seed_agent_principal, test_client};

#[test]
fn create_lookup_and_delete_binding() {
    let client = test_client();
    seed_agent_principal(&client, "agent-a");

    let res = client
        .post("/api/v1/admin/bindings")
        .header(ContentType::JSON)
        .body(r#"{"frontend":"matrix","channel_id":"!room:x","agent_id":"agent-a"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let binding: serde_json::Value = res.into_json().unwrap();
    let id = binding["id"].as_str().unwrap().to_string();
    assert_eq!(binding["agent_id"], "agent-a");

    let res = client
        .get("/api/v1/admin/bindings/lookup?frontend=matrix&channel_id=!room:x")
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let found: serde_json::Value = res.into_json().unwrap();
    assert_eq!(found["agent_id"], "agent-a");

    let res = client.delete(format!("/api/v1/admin/bindings/{id}")).dispatch();
    assert_eq!(res.status(), Status::Ok);

    let res = client
        .get("/api/v1/admin/bindings/lookup?frontend=matrix&channel_id=!room:x")
        .dispatch();
    let found: serde_json::Value = res.into_json().unwrap();
    assert!(found.is_null());
}

#[test]
fn duplicate_channel_binding_is_conflict() {
    let client = test_client();
    seed_agent_principal(&client, "agent-a");
    seed_agent_principal(&client, "agent-b");

    client
        .post("/api/v1/admin/bindings")
        .header(ContentType::JSON)
        .body(r#"{"frontend":"matrix","channel_id":"!dup:x","agent_id":"agent-a"}"#)
        .dispatch();

    let res = client
        .post("/api/v1/admin/bindings")
        .header(ContentType::JSON)
        .body(r#"{"frontend":"matrix","channel_id":"!dup:x","agent_id":"agent-b"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Conflict);
}

#[test]
fn binding_to_unknown_agent_is_not_found() {
    let client = test_client();
    let res = client
        .post("/api/v1/admin/bindings")
        .header(ContentType::JSON)
        .body(r#"{"frontend":"matrix","channel_id":"!room:y","agent_id":"nobody"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::NotFound);
}

#[test]
fn update_binding_repoints_agent() {
    let client = test_client();
    seed_agent_principal(&client, "agent-a");
    seed_agent_principal(&client, "agent-b");

    let res = client
        .post("/api/v1/admin/bindings")
        .header(ContentType::JSON)
        .body(r#"{"frontend":"slack","channel_id":"C1","agent_id":"agent-a"}"#)
        .dispatch();
    let binding: serde_json::Value = res.into_json().unwrap();
    let id = binding["id"].as_str().unwrap();

    let res = client
        .patch(format!("/api/v1/admin/bindings/{id}"))
        .header(ContentType::JSON)
        .body(r#"{"agent_id":"agent-b"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let updated: serde_json::Value = res.into_json().unwrap();
    assert_eq!(updated["agent_id"], "agent-b");
}

/// Channel-bridge send (spec §9 open question 2): resolves via the binding
/// table at the edge, then dispatches exactly like a direct send.
#[test]
fn send_via_channel_resolves_binding_then_dispatches() {
    let client = test_client();
    seed_agent_principal(&client, "agent-a");
    client
        .post("/api/v1/admin/bindings")
        .header(ContentType::JSON)
        .body(r#"{"frontend":"matrix","channel_id":"!room:z","agent_id":"agent-a"}"#)
        .dispatch();

    let res = client
        .post("/api/v1/channels/matrix/!room:z/messages")
        .header(ContentType::JSON)
        .body(r#"{"conversation_key":"ignored","content":"hi","idempotency_key":"k1"}"#)
        .dispatch();
    // agent-a has no live connection, but routing succeeded: unavailable, not not-found.
    assert_eq!(res.status(), Status::ServiceUnavailable);

    let page: serde_json::Value = client
        .get("/api/v1/conversations/agent-a/events")
        .dispatch()
        .into_json()
        .unwrap();
    assert_eq!(page["events"].as_array().unwrap().len(), 2);
}

#[test]
fn send_via_unbound_channel_is_not_found() {
    let client = test_client();
    let res = client
        .post("/api/v1/channels/matrix/!nowhere/messages")
        .header(ContentType::JSON)
        .body(r#"{"conversation_key":"ignored","content":"hi","idempotency_key":"k1"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::NotFound);
}

#[test]
fn reassign_by_workspace_rewrites_bindings() {
    let client = test_client();
    seed_agent_principal(&client, "worker_ws1");
    seed_agent_principal(&client, "worker2_ws1");

    client
        .post("/api/v1/admin/bindings")
        .header(ContentType::JSON)
        .body(r#"{"frontend":"matrix","channel_id":"!r1","agent_id":"worker_ws1"}"#)
        .dispatch();

    let res = client
        .post("/api/v1/admin/workspaces/ws1/reassign")
        .header(ContentType::JSON)
        .body(r#"{"new_agent_id":"worker2_ws1"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["reassigned_count"], 1);
}
