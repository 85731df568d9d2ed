//! OAuth redirect target: `GET /oauth/spotify/callback?code=..&state=<user id>`.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Router,
};
use serde::Deserialize;
use tracing::{error, warn};

use smb_core::{domain::UserId, locks::UserLocks};

use crate::SpotifyClient;

pub const CALLBACK_PATH: &str = "/oauth/spotify/callback";

const SUCCESS_PAGE: &str =
    "Spotify is connected. Go back to the chat and send /lyrics or tap \"Lyrics\".";
const RETRY_HINT: &str = "Please try again from the chat: /start";

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

#[derive(Clone)]
struct CallbackState {
    client: Arc<SpotifyClient>,
    locks: Arc<UserLocks>,
}

/// `locks` must be the set the dispatcher holds while handling chat events.
pub fn router(client: Arc<SpotifyClient>, locks: Arc<UserLocks>) -> Router {
    Router::new()
        .route(CALLBACK_PATH, get(callback))
        .with_state(CallbackState { client, locks })
}

async fn callback(
    State(state): State<CallbackState>,
    Query(params): Query<CallbackParams>,
) -> (StatusCode, String) {
    let client = &state.client;
    if let Some(reason) = params.error {
        warn!(reason = %reason, "spotify authorization denied");
        return (
            StatusCode::BAD_REQUEST,
            format!("Spotify authorization was not granted ({reason}). {RETRY_HINT}"),
        );
    }

    let Some(code) = params.code.filter(|c| !c.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            format!("Missing authorization code. {RETRY_HINT}"),
        );
    };

    let Some(user_id) = params
        .state
        .as_deref()
        .and_then(|s| s.parse::<UserId>().ok())
    else {
        warn!(state = ?params.state, "spotify callback with invalid state");
        return (
            StatusCode::BAD_REQUEST,
            format!("Invalid authorization state. {RETRY_HINT}"),
        );
    };

    let identity = match client.users().get(user_id).await {
        Ok(Some(user)) => user.identity(),
        Ok(None) => {
            warn!(user_id = %user_id, "spotify callback for unknown user");
            return (
                StatusCode::BAD_REQUEST,
                format!("Unknown user. {RETRY_HINT}"),
            );
        }
        Err(e) => {
            error!(user_id = %user_id, error = %e, "failed to load user for spotify callback");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Something went wrong. {RETRY_HINT}"),
            );
        }
    };

    let _guard = state.locks.lock_user(&identity).await;
    match client.authorize_user(user_id, &code).await {
        Ok(_) => (StatusCode::OK, SUCCESS_PAGE.to_string()),
        Err(e) => {
            error!(user_id = %user_id, error = %e, "spotify code exchange failed");
            (
                StatusCode::BAD_GATEWAY,
                format!("Could not complete Spotify authorization. {RETRY_HINT}"),
            )
        }
    }
}
