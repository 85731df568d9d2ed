use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::{errors::Error, Result};

/// Messenger chat id (numeric, Telegram-style).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// Messenger message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// A stable reference to a sent or received message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// Opaque user record id, generated on creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for UserId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| Error::Store(format!("invalid user id {s:?}: {e}")))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessengerPlatform {
    Telegram,
}

impl MessengerPlatform {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Telegram => "TELEGRAM",
        }
    }
}

impl fmt::Display for MessengerPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessengerPlatform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "TELEGRAM" => Ok(Self::Telegram),
            other => Err(Error::Store(format!("unknown messenger platform: {other}"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MusicProviderPlatform {
    Spotify,
}

impl MusicProviderPlatform {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Spotify => "SPOTIFY",
        }
    }
}

impl fmt::Display for MusicProviderPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MusicProviderPlatform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "SPOTIFY" => Ok(Self::Spotify),
            other => Err(Error::Store(format!(
                "unknown music provider platform: {other}"
            ))),
        }
    }
}

/// The unique identity triple of a user record.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct UserIdentity {
    pub messenger_platform: MessengerPlatform,
    pub messenger_user_id: String,
    pub music_provider_platform: MusicProviderPlatform,
}

impl UserIdentity {
    pub fn telegram_spotify(chat_id: ChatId) -> Self {
        Self {
            messenger_platform: MessengerPlatform::Telegram,
            messenger_user_id: chat_id.0.to_string(),
            music_provider_platform: MusicProviderPlatform::Spotify,
        }
    }
}

/// Ordered log of message ids pending deletion.
///
/// Persisted as a JSON array of decimal strings; the empty log is persisted
/// as the absence of a value.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClearLog(Vec<String>);

impl ClearLog {
    /// Absent, blank, `null` and `[]` all decode to an empty log.
    ///
    /// A corrupt value never makes the record unreadable: numeric entries
    /// are kept as their decimal form, anything else is dropped with a
    /// warning, so the next clear still resets the log.
    pub fn decode(stored: Option<&str>) -> Self {
        let Some(raw) = stored.map(str::trim).filter(|s| !s.is_empty()) else {
            return Self::default();
        };
        let items = match serde_json::from_str::<Value>(raw) {
            Ok(Value::Array(items)) => items,
            Ok(Value::Null) => return Self::default(),
            Ok(_) | Err(_) => {
                warn!(stored = raw, "unreadable clear-log, treating as empty");
                return Self::default();
            }
        };
        let ids = items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(id) => Some(id),
                Value::Number(n) => Some(n.to_string()),
                other => {
                    warn!(entry = %other, "dropping non-id clear-log entry");
                    None
                }
            })
            .collect();
        Self(ids)
    }

    pub fn encode(&self) -> Result<Option<String>> {
        if self.0.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::to_string(&self.0)?))
    }

    pub fn push(&mut self, message_id: impl Into<String>) {
        self.0.push(message_id.into());
    }

    pub fn ids(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Music provider OAuth credentials.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderTokens {
    pub access_token: String,
    /// Refresh grants may omit it; the stored one is kept in that case.
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// The sole persistent entity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub messenger_platform: MessengerPlatform,
    pub messenger_user_id: String,
    pub music_provider_platform: MusicProviderPlatform,
    pub music_provider_access_token: Option<String>,
    pub music_provider_refresh_token: Option<String>,
    pub music_provider_access_token_expires_at: Option<DateTime<Utc>>,
    pub autoclear: bool,
    pub messages_to_clear: ClearLog,
}

impl User {
    pub fn new(identity: UserIdentity) -> Self {
        Self {
            id: UserId::generate(),
            messenger_platform: identity.messenger_platform,
            messenger_user_id: identity.messenger_user_id,
            music_provider_platform: identity.music_provider_platform,
            music_provider_access_token: None,
            music_provider_refresh_token: None,
            music_provider_access_token_expires_at: None,
            autoclear: false,
            messages_to_clear: ClearLog::default(),
        }
    }

    pub fn identity(&self) -> UserIdentity {
        UserIdentity {
            messenger_platform: self.messenger_platform,
            messenger_user_id: self.messenger_user_id.clone(),
            music_provider_platform: self.music_provider_platform,
        }
    }

    pub fn is_authorized(&self) -> bool {
        self.music_provider_access_token
            .as_deref()
            .is_some_and(|t| !t.is_empty())
    }
}
