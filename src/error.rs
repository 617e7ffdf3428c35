//! Error kinds per spec §7, mapped to the transport-level status the teacher's
//! routes already return: `(Status, Json<Value>)`.

use rocket::http::Status;
use rocket::response::{self, Responder, Response};
use rocket::serde::json::Json;
use rocket::Request;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    AlreadyExists(String),

    #[error("{0}")]
    Internal(String),

    #[error("cancelled")]
    Cancelled,
}

impl GatewayError {
    fn status(&self) -> Status {
        match self {
            GatewayError::InvalidArgument(_) => Status::BadRequest,
            GatewayError::NotFound(_) => Status::NotFound,
            GatewayError::Unavailable(_) => Status::ServiceUnavailable,
            GatewayError::AlreadyExists(_) => Status::Conflict,
            GatewayError::Internal(_) => Status::InternalServerError,
            // 499 (client closed request) isn't in Rocket's IANA-derived status
            // table; `Status::new` accepts any code without a named constant.
            GatewayError::Cancelled => Status::new(499),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            GatewayError::InvalidArgument(_) => "invalid-argument",
            GatewayError::NotFound(_) => "not-found",
            GatewayError::Unavailable(_) => "unavailable",
            GatewayError::AlreadyExists(_) => "already-exists",
            GatewayError::Internal(_) => "internal",
            GatewayError::Cancelled => "cancelled",
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for GatewayError {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let status = self.status();
        let body = Json(serde_json::json!({
            "error": self.to_string(),
            "kind": self.kind(),
        }));
        Response::build_from(body.respond_to(req)?)
            .status(status)
            .ok()
    }
}

/// Error surface for the Event Store's own contract (spec §4.1). Kept
/// separate from `GatewayError` so store implementations stay decoupled from
/// the transport layer; callers convert with `From`.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid cursor")]
    InvalidCursor,
    #[error("duplicate channel binding")]
    DuplicateChannel,
    #[error("not found")]
    NotFound,
    #[error("backend failure: {0}")]
    Backend(String),
}

impl From<StoreError> for GatewayError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InvalidCursor => GatewayError::InvalidArgument("malformed cursor".into()),
            StoreError::DuplicateChannel => {
                GatewayError::AlreadyExists("channel already bound".into())
            }
            StoreError::NotFound => GatewayError::NotFound("not found".into()),
            StoreError::Backend(msg) => GatewayError::Internal(msg),
        }
    }
}
