//! Event Replay Endpoint (spec §3, §4.8): cursor-paginated history plus a
//! live SSE tail that starts from backfill and switches to the Broadcaster
//! without a gap, deduping events a slow switch-over might otherwise repeat.

use std::collections::VecDeque;
use std::time::Duration;

use rocket::response::stream::{Event, EventStream};
use rocket::serde::json::Json;
use rocket::State;

use crate::broadcaster::Broadcaster;
use crate::db::{DEFAULT_PAGE_SIZE, EventStore};
use crate::error::GatewayError;
use crate::models::EventPage;

/// How many recently-sent event ids the SSE handler remembers to avoid
/// re-emitting an event that both backfill and the live feed observed
/// (spec §4.8, "Replay must not gap or duplicate across the handoff").
const DEDUP_WINDOW: usize = 256;

#[rocket::get("/api/v1/conversations/<conversation_key>/events?<cursor>&<limit>")]
pub fn get_events(
    conversation_key: &str,
    cursor: Option<&str>,
    limit: Option<i64>,
    store: &State<std::sync::Arc<dyn EventStore>>,
) -> Result<Json<EventPage>, GatewayError> {
    let page = store.get_events(conversation_key, cursor, limit.unwrap_or(DEFAULT_PAGE_SIZE))?;
    Ok(Json(page))
}

#[rocket::get("/api/v1/conversations/<conversation_key>/stream?<cursor>")]
pub fn stream_events(
    conversation_key: String,
    cursor: Option<String>,
    store: &State<std::sync::Arc<dyn EventStore>>,
    broadcaster: &State<Broadcaster>,
) -> EventStream![] {
    let store = (*store).clone();
    let broadcaster = (*broadcaster).clone();

    EventStream! {
        let mut seen = VecDeque::with_capacity(DEDUP_WINDOW);
        let mut seen_set = std::collections::HashSet::with_capacity(DEDUP_WINDOW);

        // Subscribe before backfilling so nothing published during the
        // backfill query is lost (spec §4.8 ordering requirement).
        let (mut live_rx, subscriber_id) = broadcaster.subscribe(&conversation_key);

        let mut next_cursor = cursor;
        loop {
            let page = match store.get_events(&conversation_key, next_cursor.as_deref(), DEFAULT_PAGE_SIZE) {
                Ok(p) => p,
                Err(e) => {
                    yield Event::json(&serde_json::json!({ "error": e.to_string() })).event("error");
                    broadcaster.unsubscribe(&conversation_key, subscriber_id);
                    return;
                }
            };
            let has_more = page.has_more;
            for event in page.events {
                if seen_set.insert(event.id.clone()) {
                    if seen.len() >= DEDUP_WINDOW {
                        if let Some(old) = seen.pop_front() {
                            seen_set.remove(&old);
                        }
                    }
                    seen.push_back(event.id.clone());
                    yield Event::json(&event).event("event");
                }
            }
            if !has_more {
                break;
            }
            next_cursor = page.next_cursor;
        }

        let mut heartbeat = tokio::time::interval(Duration::from_secs(15));
        loop {
            tokio::select! {
                maybe_event = live_rx.recv() => {
                    match maybe_event {
                        Some(event) => {
                            if seen_set.insert(event.id.clone()) {
                                if seen.len() >= DEDUP_WINDOW {
                                    if let Some(old) = seen.pop_front() {
                                        seen_set.remove(&old);
                                    }
                                }
                                seen.push_back(event.id.clone());
                                yield Event::json(&event).event("event");
                            }
                        }
                        None => break,
                    }
                }
                _ = heartbeat.tick() => {
                    yield Event::data("").event("heartbeat");
                }
            }
        }

        broadcaster.unsubscribe(&conversation_key, subscriber_id);
    }
}
