use std::{
    env, fs,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, Result};

/// Typed configuration for the bot, read from the environment.
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: String,
    pub telegram_bot_username: Option<String>,
    pub telegram_webhook_secret_token: String,
    pub register_webhook: bool,

    // HTTP
    pub base_url: String,
    pub bind_addr: SocketAddr,
    pub http_timeout: Duration,

    // Storage
    pub database_path: PathBuf,

    // Music / lyrics providers
    pub spotify_client_id: String,
    pub spotify_client_secret: String,
    pub genius_access_token: String,

    // Telegram limits
    pub telegram_message_limit: usize,
    pub telegram_safe_limit: usize,
    pub throttle_global: Duration,
    pub throttle_per_chat: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup (the process env in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| -> Result<String> {
            lookup(key)
                .and_then(non_empty)
                .ok_or_else(|| Error::Config(format!("{key} environment variable is required")))
        };

        let telegram_bot_token = required("TELEGRAM_BOT_TOKEN")?;
        let telegram_webhook_secret_token = required("TELEGRAM_WEBHOOK_SECRET_TOKEN")?;
        let base_url = required("BASE_URL")?;
        let spotify_client_id = required("SPOTIFY_CLIENT_ID")?;
        let spotify_client_secret = required("SPOTIFY_CLIENT_SECRET")?;
        let genius_access_token = required("GENIUS_ACCESS_TOKEN")?;

        // Telegram only accepts [A-Za-z0-9_-]{1,256} as a webhook secret.
        if telegram_webhook_secret_token.len() > 256
            || !telegram_webhook_secret_token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(Error::Config(
                "TELEGRAM_WEBHOOK_SECRET_TOKEN must be 1-256 characters of A-Z, a-z, 0-9, _ or -"
                    .to_string(),
            ));
        }

        let telegram_bot_username = lookup("TELEGRAM_BOT_USERNAME").and_then(non_empty);
        let register_webhook = parse_bool(lookup("REGISTER_WEBHOOK")).unwrap_or(true);

        let bind_addr = lookup("BIND_ADDR")
            .and_then(non_empty)
            .unwrap_or_else(|| "0.0.0.0:8080".to_string());
        let bind_addr = bind_addr
            .trim()
            .parse::<SocketAddr>()
            .map_err(|e| Error::Config(format!("invalid BIND_ADDR {bind_addr:?}: {e}")))?;

        let http_timeout =
            Duration::from_millis(parse_num(lookup("HTTP_TIMEOUT_MS")).unwrap_or(10_000));

        let database_path = PathBuf::from(
            lookup("DATABASE_PATH")
                .and_then(non_empty)
                .unwrap_or_else(|| "smb.sqlite3".to_string()),
        );

        let telegram_message_limit = parse_num(lookup("TELEGRAM_MESSAGE_LIMIT")).unwrap_or(4096);
        let telegram_safe_limit = parse_num(lookup("TELEGRAM_SAFE_LIMIT"))
            .unwrap_or(4000)
            .min(telegram_message_limit);
        let throttle_global =
            Duration::from_millis(parse_num(lookup("THROTTLE_GLOBAL_MS")).unwrap_or(40));
        let throttle_per_chat =
            Duration::from_millis(parse_num(lookup("THROTTLE_PER_CHAT_MS")).unwrap_or(1050));

        Ok(Self {
            telegram_bot_token,
            telegram_bot_username,
            telegram_webhook_secret_token,
            register_webhook,
            base_url,
            bind_addr,
            http_timeout,
            database_path,
            spotify_client_id,
            spotify_client_secret,
            genius_access_token,
            telegram_message_limit,
            telegram_safe_limit,
            throttle_global,
            throttle_per_chat,
        })
    }

    /// Public URL Telegram delivers updates to.
    pub fn telegram_webhook_url(&self) -> String {
        join_url(&self.base_url, "webhook/telegram")
    }

    /// OAuth redirect URI registered with Spotify.
    pub fn spotify_redirect_uri(&self) -> String {
        join_url(&self.base_url, "oauth/spotify/callback")
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim().trim_end_matches('/'), path)
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        env::set_var(key, strip_quotes(v.trim()));
    }
}

fn strip_quotes(val: &str) -> &str {
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        return &val[1..val.len() - 1];
    }
    val
}

fn parse_bool(v: Option<String>) -> Option<bool> {
    v.map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn parse_num<T: std::str::FromStr>(v: Option<String>) -> Option<T> {
    v.and_then(|s| s.trim().parse::<T>().ok())
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
