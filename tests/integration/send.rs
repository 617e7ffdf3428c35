use rocket::http::{ContentType, Status};

use conversation_gateway::rate_limit::RateLimitConfig;

use crate::common::{test_client, test_client_with_rate_limits};

#[test]
fn send_requires_nonempty_content() {
    let client = test_client();
    let res = client
        .post("/api/v1/messages")
        .header(ContentType::JSON)
        .body(r#"{"conversation_key":"a1","content":"","idempotency_key":"k1"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::BadRequest);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["kind"], "invalid-argument");
}

#[test]
fn send_requires_idempotency_key_under_100_bytes() {
    let client = test_client();
    let oversized = "x".repeat(101);
    let res = client
        .post("/api/v1/messages")
        .header(ContentType::JSON)
        .body(format!(
            r#"{{"conversation_key":"a1","content":"hi","idempotency_key":"{oversized}"}}"#
        ))
        .dispatch();
    assert_eq!(res.status(), Status::BadRequest);
}

/// S3 (spec §8): no live connection for the target agent. The send reports
/// *unavailable*, but the ledger still records the inbound message and a
/// system-authored outbound error event (spec invariant 3).
#[test]
fn send_to_disconnected_agent_is_unavailable_but_still_ledgered() {
    let client = test_client();
    let res = client
        .post("/api/v1/messages")
        .header(ContentType::JSON)
        .body(r#"{"conversation_key":"ghost","content":"ping","idempotency_key":"k1"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::ServiceUnavailable);

    let res = client.get("/api/v1/conversations/ghost/events").dispatch();
    assert_eq!(res.status(), Status::Ok);
    let page: serde_json::Value = res.into_json().unwrap();
    let events = page["events"].as_array().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["type"], "message");
    assert_eq!(events[0]["direction"], "inbound-to-agent");
    assert_eq!(events[1]["type"], "error");
    assert_eq!(events[1]["direction"], "outbound-from-agent");
    assert_eq!(events[1]["author"], "system");
}

/// S2 (spec §8): same idempotency key sent twice while the agent is
/// unreachable still dispatches twice — `mark` only runs after a
/// *successful* dispatch (spec §4.2 policy), so a failed attempt is
/// retryable rather than silently swallowed.
#[test]
fn failed_dispatch_does_not_mark_dedup_key() {
    let client = test_client();
    let body = r#"{"conversation_key":"ghost","content":"ping","idempotency_key":"retry-me"}"#;

    let first = client
        .post("/api/v1/messages")
        .header(ContentType::JSON)
        .body(body)
        .dispatch();
    assert_eq!(first.status(), Status::ServiceUnavailable);

    let second = client
        .post("/api/v1/messages")
        .header(ContentType::JSON)
        .body(body)
        .dispatch();
    assert_eq!(second.status(), Status::ServiceUnavailable);

    let page: serde_json::Value = client
        .get("/api/v1/conversations/ghost/events")
        .dispatch()
        .into_json()
        .unwrap();
    // Two full attempts: inbound + error, twice.
    assert_eq!(page["events"].as_array().unwrap().len(), 4);
}

#[test]
fn send_is_rate_limited_per_ip() {
    let mut config = RateLimitConfig::default();
    config.send_max = 2;
    config.send_window_secs = 60;
    let client = test_client_with_rate_limits(config);

    for i in 0..2 {
        let res = client
            .post("/api/v1/messages")
            .header(ContentType::JSON)
            .body(format!(
                r#"{{"conversation_key":"ghost","content":"hi {i}","idempotency_key":"k{i}"}}"#
            ))
            .dispatch();
        assert_eq!(res.status(), Status::ServiceUnavailable, "attempt {i} should reach the service");
    }

    let res = client
        .post("/api/v1/messages")
        .header(ContentType::JSON)
        .body(r#"{"conversation_key":"ghost","content":"one too many","idempotency_key":"k-last"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::ServiceUnavailable);
    let body: serde_json::Value = res.into_json().unwrap();
    assert!(body["error"].as_str().unwrap().contains("rate limit"));
}
