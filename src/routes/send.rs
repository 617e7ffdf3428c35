//! Client Send Endpoint (spec §3, §4.7): the single HTTP entry point
//! frontends use to push a message into a conversation.

use rocket::serde::json::Json;
use rocket::State;

use crate::bindings::BindingTable;
use crate::conversation::ConversationService;
use crate::error::GatewayError;
use crate::models::{SendMessageRequest, SendReceipt};
use crate::rate_limit::{RateLimitConfig, RateLimiter};

use super::ClientIp;

fn check_rate_limit(
    client_ip: &ClientIp,
    limiter: &RateLimiter,
    limit_config: &RateLimitConfig,
) -> Result<(), GatewayError> {
    let key = format!("send:{}", client_ip.0);
    let info = limiter.check_with_info(&key, limit_config.send_max, limit_config.send_window_secs);
    if !info.allowed {
        return Err(GatewayError::Unavailable(format!(
            "rate limit exceeded, retry after {}s",
            info.retry_after_secs
        )));
    }
    Ok(())
}

/// Client Send Endpoint (spec §4.7): `conversation_key` in the body is the
/// target agent-id directly.
#[rocket::post("/api/v1/messages", data = "<req>")]
pub async fn send_message(
    req: Json<SendMessageRequest>,
    client_ip: ClientIp,
    limiter: &State<RateLimiter>,
    limit_config: &State<RateLimitConfig>,
    service: &State<ConversationService>,
) -> Result<Json<SendReceipt>, GatewayError> {
    check_rate_limit(&client_ip, limiter, limit_config)?;
    let receipt = service.send_message(req.into_inner()).await?;
    Ok(Json(receipt))
}

/// Channel-bridge entry point (spec §9 open question 2, resolved in
/// `SPEC_FULL.md` §B.4): resolves `(frontend, channel_id)` to an `agent_id`
/// via the Binding Table, then calls the same service method a direct send
/// would. `conversation_key` in the body is ignored in favor of the resolved
/// binding.
#[rocket::post("/api/v1/channels/<frontend>/<channel_id>/messages", data = "<req>")]
pub async fn send_via_channel(
    frontend: &str,
    channel_id: &str,
    req: Json<SendMessageRequest>,
    client_ip: ClientIp,
    limiter: &State<RateLimiter>,
    limit_config: &State<RateLimitConfig>,
    bindings: &State<BindingTable>,
    service: &State<ConversationService>,
) -> Result<Json<SendReceipt>, GatewayError> {
    check_rate_limit(&client_ip, limiter, limit_config)?;

    let binding = bindings
        .lookup(frontend, channel_id)?
        .ok_or_else(|| GatewayError::NotFound(format!("no binding for {frontend}/{channel_id}")))?;

    let mut body = req.into_inner();
    body.conversation_key = binding.agent_id;
    let receipt = service.send_message(body).await?;
    Ok(Json(receipt))
}
