use rocket::http::Status;
use std::sync::Arc;

use conversation_gateway::db::EventStore;
use conversation_gateway::models::TokenUsageRecord;

use crate::common::test_client;

#[test]
fn usage_stats_aggregate_per_agent() {
    let client = test_client();
    let store = client.rocket().state::<Arc<dyn EventStore>>().unwrap();
    store
        .save_usage(&TokenUsageRecord {
            agent_id: "agent-a".into(),
            request_id: "r1".into(),
            input_tokens: 10,
            output_tokens: 20,
            total_tokens: 30,
            created_at: chrono::Utc::now().to_rfc3339(),
            ..Default::default()
        })
        .unwrap();

    let res = client.get("/api/v1/admin/usage?agent_id=agent-a").dispatch();
    assert_eq!(res.status(), Status::Ok);
    let stats: serde_json::Value = res.into_json().unwrap();
    assert_eq!(stats["request_count"], 1);
    assert_eq!(stats["total_tokens"], 30);
}

#[test]
fn usage_stats_without_agent_filter_aggregates_globally() {
    let client = test_client();
    let res = client.get("/api/v1/admin/usage").dispatch();
    assert_eq!(res.status(), Status::Ok);
    let stats: serde_json::Value = res.into_json().unwrap();
    assert_eq!(stats["request_count"], 0);
}
