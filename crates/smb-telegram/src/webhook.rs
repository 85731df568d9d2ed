//! Inbound webhook: Telegram POSTs every update here.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tracing::{debug, warn};

use smb_core::{
    dispatcher::{InboundHandler, InboundMessage},
    domain::{ChatId, MessageId},
    security::verify_secret_token,
};

pub const WEBHOOK_PATH: &str = "/webhook/telegram";
const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

#[derive(Clone)]
struct WebhookState {
    handler: Arc<dyn InboundHandler>,
    secret: Arc<str>,
}

/// The slice of a Telegram `Update` the bot reacts to.
#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    message: Option<IncomingMessage>,
}

#[derive(Debug, Deserialize)]
struct IncomingMessage {
    message_id: i32,
    chat: IncomingChat,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IncomingChat {
    id: i64,
}

pub fn router(handler: Arc<dyn InboundHandler>, secret: &str) -> Router {
    let state = WebhookState {
        handler,
        secret: Arc::from(secret),
    };
    Router::new()
        .route("/healthz", get(healthz))
        .route(WEBHOOK_PATH, post(receive_update))
        .with_state(state)
}

async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

async fn receive_update(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let provided = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
    if !verify_secret_token(provided, &state.secret) {
        warn!(
            header_present = provided.is_some(),
            "rejected webhook call with invalid secret token"
        );
        return StatusCode::UNAUTHORIZED;
    }

    // Anything we cannot use is still acknowledged, or Telegram redelivers it.
    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            warn!(error = %e, "unparsable telegram update");
            return StatusCode::OK;
        }
    };

    let Some(message) = update.message else {
        debug!(update_id = update.update_id, "ignoring non-message update");
        return StatusCode::OK;
    };

    state
        .handler
        .handle(InboundMessage {
            chat_id: ChatId(message.chat.id),
            message_id: MessageId(message.message_id),
            text: message.text,
        })
        .await;
    StatusCode::OK
}
