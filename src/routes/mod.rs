//! HTTP surface (spec §4.7, §4.8): the Client Send Endpoint, the Event
//! Replay Endpoint, and a small set of admin endpoints for bindings and
//! usage. Request guards follow the teacher's `ClientIp`/`AdminKey` shape.

pub mod admin_bindings;
pub mod replay;
pub mod send;
pub mod system;
pub mod usage;

use std::env;
use std::net::IpAddr;

use rocket::http::Status;
use rocket::request::{self, FromRequest, Request};
use rocket::serde::json::Json;

/// Client IP, preferring `X-Forwarded-For` when present (reverse-proxy
/// deployments), falling back to the socket's remote address.
pub struct ClientIp(pub String);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ClientIp {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        if let Some(forwarded) = req.headers().get_one("X-Forwarded-For") {
            if let Some(first) = forwarded.split(',').next() {
                if let Ok(ip) = first.trim().parse::<IpAddr>() {
                    return request::Outcome::Success(ClientIp(ip.to_string()));
                }
            }
        }
        let ip = req
            .client_ip()
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        request::Outcome::Success(ClientIp(ip))
    }
}

/// Guards admin-only endpoints (binding CRUD, usage stats) behind a shared
/// secret read from `ADMIN_KEY`. Absent `ADMIN_KEY`, the gateway runs
/// open — the same "admin surface is opt-in" default the teacher used for
/// its own admin key.
pub struct AdminKey;

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminKey {
    type Error = Json<serde_json::Value>;

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let expected = match env::var("ADMIN_KEY") {
            Ok(key) if !key.is_empty() => key,
            _ => return request::Outcome::Success(AdminKey),
        };
        match req.headers().get_one("X-Admin-Key") {
            Some(provided) if provided == expected => request::Outcome::Success(AdminKey),
            _ => request::Outcome::Error((
                Status::Unauthorized,
                Json(serde_json::json!({ "error": "missing or invalid admin key", "kind": "unauthenticated" })),
            )),
        }
    }
}
