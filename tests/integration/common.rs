use rocket::local::blocking::Client;

/// Wrapper around `Client` that auto-deletes the temp sqlite file (and its
/// WAL/SHM sidecars) on drop, same pattern the teacher uses to avoid
/// littering `/tmp` across test runs.
pub struct TestClient {
    client: Option<Client>,
    db_path: String,
}

impl Drop for TestClient {
    fn drop(&mut self) {
        drop(self.client.take());
        let _ = std::fs::remove_file(&self.db_path);
        let _ = std::fs::remove_file(format!("{}-wal", self.db_path));
        let _ = std::fs::remove_file(format!("{}-shm", self.db_path));
    }
}

impl std::ops::Deref for TestClient {
    type Target = Client;
    fn deref(&self) -> &Client {
        self.client.as_ref().unwrap()
    }
}

fn temp_db_path() -> String {
    format!(
        "/tmp/gateway_test_{}.db",
        uuid::Uuid::new_v4().to_string().split('-').next().unwrap()
    )
}

pub fn test_client() -> TestClient {
    let db_path = temp_db_path();
    let rocket = conversation_gateway::rocket_with_db(&db_path);
    let client = Client::tracked(rocket).expect("valid rocket instance");
    TestClient { client: Some(client), db_path }
}

pub fn test_client_with_rate_limits(config: conversation_gateway::rate_limit::RateLimitConfig) -> TestClient {
    let db_path = temp_db_path();
    let rocket = conversation_gateway::rocket_with_db_and_config(&db_path, config);
    let client = Client::tracked(rocket).expect("valid rocket instance");
    TestClient { client: Some(client), db_path }
}

/// Seeds an `agent`-kind principal directly through the managed `EventStore`
/// so binding tests don't need a real auth collaborator.
pub fn seed_agent_principal(client: &Client, agent_id: &str) {
    use conversation_gateway::db::EventStore;
    use conversation_gateway::models::{Principal, PrincipalKind, PrincipalStatus};
    use std::sync::Arc;

    let store = client
        .rocket()
        .state::<Arc<dyn EventStore>>()
        .expect("event store managed state");
    let now = chrono::Utc::now().to_rfc3339();
    store
        .upsert_principal(&Principal {
            id: agent_id.to_string(),
            kind: PrincipalKind::Agent,
            display_name: agent_id.to_string(),
            public_key_fingerprint: None,
            status: PrincipalStatus::Approved,
            created_at: now.clone(),
            updated_at: now,
        })
        .expect("seed principal");
}
