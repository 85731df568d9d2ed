//! Spotify adapter: OAuth authorization-code flow and "currently playing".

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, info};

pub mod callback;

use smb_core::{
    domain::{ProviderTokens, User, UserId},
    errors::Error,
    providers::{CurrentlyPlaying, MusicProvider, Track},
    users::UserService,
    Result,
};

pub const SCOPE: &str = "user-read-currently-playing";
pub const DEFAULT_ACCOUNTS_BASE_URL: &str = "https://accounts.spotify.com";
pub const DEFAULT_API_BASE_URL: &str = "https://api.spotify.com";

/// Tokens this close to expiry are refreshed before use.
const REFRESH_MARGIN_SECS: i64 = 30;

#[derive(Clone, Debug)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub accounts_base_url: String,
    pub api_base_url: String,
    pub http_timeout: Duration,
}

impl SpotifyConfig {
    pub fn new(client_id: String, client_secret: String, redirect_uri: String) -> Self {
        Self {
            client_id,
            client_secret,
            redirect_uri,
            accounts_base_url: DEFAULT_ACCOUNTS_BASE_URL.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            http_timeout: Duration::from_secs(10),
        }
    }
}

pub struct SpotifyClient {
    http: reqwest::Client,
    cfg: SpotifyConfig,
    authorize_url: Url,
    users: Arc<UserService>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: i64,
}

impl TokenResponse {
    fn into_tokens(self) -> ProviderTokens {
        ProviderTokens {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: Utc::now() + TimeDelta::seconds(self.expires_in),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CurrentlyPlayingResponse {
    #[serde(default)]
    item: Option<TrackItem>,
}

#[derive(Debug, Deserialize)]
struct TrackItem {
    name: String,
    #[serde(default)]
    artists: Vec<ArtistItem>,
}

#[derive(Debug, Deserialize)]
struct ArtistItem {
    name: String,
}

fn req_err(e: reqwest::Error) -> Error {
    Error::External(format!("spotify request error: {e}"))
}

impl SpotifyClient {
    pub fn new(cfg: SpotifyConfig, users: Arc<UserService>) -> Result<Self> {
        let authorize_url = Url::parse(&format!(
            "{}/authorize",
            cfg.accounts_base_url.trim_end_matches('/')
        ))
        .map_err(|e| Error::Config(format!("invalid spotify accounts url: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(cfg.http_timeout)
            .build()
            .map_err(|e| Error::Config(format!("spotify http client: {e}")))?;
        Ok(Self {
            http,
            cfg,
            authorize_url,
            users,
        })
    }

    pub fn users(&self) -> &UserService {
        &self.users
    }

    /// Trade an authorization code for tokens.
    pub async fn exchange_code(&self, code: &str) -> Result<ProviderTokens> {
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", &self.cfg.redirect_uri),
        ])
        .await
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<ProviderTokens> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<ProviderTokens> {
        let res = self
            .http
            .post(format!(
                "{}/api/token",
                self.cfg.accounts_base_url.trim_end_matches('/')
            ))
            .basic_auth(&self.cfg.client_id, Some(&self.cfg.client_secret))
            .form(form)
            .send()
            .await
            .map_err(req_err)?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(Error::External(format!(
                "spotify token endpoint returned {status}: {body}"
            )));
        }
        let token: TokenResponse = res.json().await.map_err(req_err)?;
        Ok(token.into_tokens())
    }

    /// A usable access token for `user`, refreshed and persisted if needed.
    async fn access_token(&self, user: &User) -> Result<String> {
        let token = user
            .music_provider_access_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or(Error::Unauthorized)?;

        let expiring = user
            .music_provider_access_token_expires_at
            .is_some_and(|at| at <= Utc::now() + TimeDelta::seconds(REFRESH_MARGIN_SECS));
        if !expiring {
            return Ok(token);
        }

        let refresh_token = user
            .music_provider_refresh_token
            .as_deref()
            .ok_or(Error::Unauthorized)?;
        debug!(user_id = %user.id, "refreshing spotify access token");
        let tokens = self.refresh(refresh_token).await?;
        let updated = self.users.update_provider_tokens(user.id, tokens).await?;
        updated.music_provider_access_token.ok_or(Error::Unauthorized)
    }

    /// Complete the OAuth flow for the user that `state` names.
    pub async fn authorize_user(&self, user_id: UserId, code: &str) -> Result<User> {
        let tokens = self.exchange_code(code).await?;
        let user = self.users.update_provider_tokens(user_id, tokens).await?;
        info!(user_id = %user.id, "spotify authorized");
        Ok(user)
    }
}

/// Interpret a `200` body of the currently-playing endpoint.
fn parse_currently_playing(body: &str) -> Result<CurrentlyPlaying> {
    if body.trim().is_empty() {
        return Ok(CurrentlyPlaying::NothingPlaying);
    }
    let parsed: CurrentlyPlayingResponse = serde_json::from_str(body)?;
    Ok(match parsed.item {
        Some(item) => CurrentlyPlaying::Track(Track {
            name: item.name,
            artists: item.artists.into_iter().map(|a| a.name).collect(),
        }),
        None => CurrentlyPlaying::NothingPlaying,
    })
}

#[async_trait]
impl MusicProvider for SpotifyClient {
    fn authorization_link(&self, user_id: UserId) -> String {
        let mut url = self.authorize_url.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.cfg.client_id)
            .append_pair("scope", SCOPE)
            .append_pair("redirect_uri", &self.cfg.redirect_uri)
            .append_pair("state", &user_id.to_string());
        url.into()
    }

    async fn currently_playing(&self, user: &User) -> Result<CurrentlyPlaying> {
        let token = self.access_token(user).await?;
        let res = self
            .http
            .get(format!(
                "{}/v1/me/player/currently-playing",
                self.cfg.api_base_url.trim_end_matches('/')
            ))
            .bearer_auth(token)
            .send()
            .await
            .map_err(req_err)?;

        match res.status() {
            StatusCode::NO_CONTENT => Ok(CurrentlyPlaying::NothingPlaying),
            StatusCode::UNAUTHORIZED => Err(Error::Unauthorized),
            status if status.is_success() => {
                let body = res.text().await.map_err(req_err)?;
                parse_currently_playing(&body)
            }
            status => Err(Error::External(format!(
                "spotify currently-playing returned {status}"
            ))),
        }
    }
}
