use rocket::http::Status;

use crate::common::test_client;

#[test]
fn health_reports_ok() {
    let client = test_client();
    let res = client.get("/health").dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["status"], "ok");
}

#[test]
fn list_agents_is_empty_when_none_connected() {
    let client = test_client();
    let res = client.get("/api/v1/admin/agents").dispatch();
    assert_eq!(res.status(), Status::Ok);
    let agents: Vec<serde_json::Value> = res.into_json().unwrap();
    assert!(agents.is_empty());
}

#[test]
fn unknown_route_is_404_with_error_envelope() {
    let client = test_client();
    let res = client.get("/does-not-exist").dispatch();
    assert_eq!(res.status(), Status::NotFound);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["kind"], "not-found");
}
