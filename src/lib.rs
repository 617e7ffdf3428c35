pub mod agents;
pub mod bindings;
pub mod broadcaster;
pub mod conversation;
pub mod db;
pub mod dedup;
pub mod error;
pub mod models;
pub mod rate_limit;
pub mod routes;

use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rocket_cors::CorsOptions;
use tracing::info;

use agents::AgentRegistry;
use bindings::BindingTable;
use broadcaster::Broadcaster;
use conversation::ConversationService;
use db::{EventStore, SqliteStore};
use dedup::DedupCache;
use rate_limit::{RateLimitConfig, RateLimiter};

/// How long a client idempotency key is remembered (spec §4.2).
const DEDUP_TTL: Duration = Duration::from_secs(600);

/// Inits the tracing subscriber once; safe to call from multiple test
/// harnesses in the same process.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

pub fn rocket() -> rocket::Rocket<rocket::Build> {
    let db_path = env::var("DATABASE_PATH").unwrap_or_else(|_| "data/gateway.db".to_string());
    rocket_with_db(&db_path)
}

pub fn rocket_with_db_and_config(db_path: &str, rate_config: RateLimitConfig) -> rocket::Rocket<rocket::Build> {
    build_rocket(db_path, rate_config)
}

pub fn rocket_with_db(db_path: &str) -> rocket::Rocket<rocket::Build> {
    let rate_limit_config = RateLimitConfig::from_env();
    build_rocket(db_path, rate_limit_config)
}

fn build_rocket(db_path: &str, rate_limit_config: RateLimitConfig) -> rocket::Rocket<rocket::Build> {
    if let Some(parent) = std::path::Path::new(db_path).parent() {
        std::fs::create_dir_all(parent).ok();
    }

    let store: Arc<dyn EventStore> = Arc::new(SqliteStore::new(db_path));
    let registry = AgentRegistry::new();
    let broadcaster = Broadcaster::new();
    let dedup = Arc::new(DedupCache::new(DEDUP_TTL));
    let binding_table = BindingTable::new(store.clone());
    let conversation_service = ConversationService::new(
        store.clone(),
        registry.clone(),
        broadcaster.clone(),
        dedup.clone(),
    );

    let rate_limiter = RateLimiter::new();

    let cors = CorsOptions::default()
        .to_cors()
        .expect("Failed to create CORS");

    let agent_listen_addr: SocketAddr = env::var("AGENT_LISTEN_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:7700".to_string())
        .parse()
        .expect("AGENT_LISTEN_ADDR must be a valid socket address");
    let server_id = env::var("SERVER_ID").unwrap_or_else(|_| "gateway-1".to_string());
    let listener_registry = registry.clone();

    rocket::build()
        .manage(store)
        .manage(registry)
        .manage(broadcaster)
        .manage(dedup)
        .manage(binding_table)
        .manage(conversation_service)
        .manage(rate_limit_config)
        .manage(rate_limiter)
        .attach(cors)
        .register("/", rocket::catchers![routes::system::not_found, routes::system::too_many_requests])
        .mount(
            "/",
            rocket::routes![
                routes::system::health,
                routes::system::list_agents,
                routes::send::send_message,
                routes::send::send_via_channel,
                routes::replay::get_events,
                routes::replay::stream_events,
                routes::admin_bindings::create_binding,
                routes::admin_bindings::update_binding,
                routes::admin_bindings::delete_binding,
                routes::admin_bindings::list_bindings,
                routes::admin_bindings::lookup_binding,
                routes::admin_bindings::reassign_by_workspace,
                routes::usage::get_usage,
            ],
        )
        .attach(rocket::fairing::AdHoc::on_liftoff("Agent Stream Listener", move |_rocket| {
            Box::pin(async move {
                tokio::spawn(async move {
                    if let Err(e) = agents::listener::run(agent_listen_addr, Arc::new(listener_registry), server_id).await {
                        tracing::error!(error = %e, "agent listener exited");
                    }
                });
                info!(%agent_listen_addr, "agent stream listener started");
            })
        }))
}
