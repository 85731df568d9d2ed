//! SQLite-backed [`UserStore`].
//!
//! One `users` table; the identity triple is a UNIQUE key. Calls run on the
//! blocking pool behind a single connection mutex.

use std::{
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use smb_core::{
    domain::{ClearLog, User, UserId, UserIdentity},
    errors::Error,
    store::UserStore,
    Result,
};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    messenger_platform TEXT NOT NULL,
    messenger_user_id TEXT NOT NULL,
    music_provider_platform TEXT NOT NULL,
    music_provider_access_token TEXT,
    music_provider_refresh_token TEXT,
    music_provider_access_token_expires_at TEXT,
    autoclear INTEGER NOT NULL DEFAULT 0,
    messages_to_clear TEXT,
    UNIQUE (messenger_platform, messenger_user_id, music_provider_platform)
);";

const SELECT_COLUMNS: &str = "SELECT id, messenger_platform, messenger_user_id, music_provider_platform,
        music_provider_access_token, music_provider_refresh_token,
        music_provider_access_token_expires_at, autoclear, messages_to_clear
 FROM users";

#[derive(Clone)]
pub struct SqliteUserStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteUserStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let conn = Connection::open(path).map_err(sql_err)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(sql_err)?;
        debug!(path = %path.display(), "opened user store");
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory().map_err(sql_err)?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA).map_err(sql_err)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn call<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || f(&lock_conn(&conn)))
            .await
            .map_err(|e| Error::Store(format!("db task join error: {e}")))?
    }
}

fn lock_conn(conn: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    match conn.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn sql_err(e: rusqlite::Error) -> Error {
    Error::Store(format!("sqlite error: {e}"))
}

/// Column values as stored, before domain parsing.
struct UserRow {
    id: String,
    messenger_platform: String,
    messenger_user_id: String,
    music_provider_platform: String,
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_at: Option<String>,
    autoclear: bool,
    messages_to_clear: Option<String>,
}

impl UserRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            messenger_platform: row.get(1)?,
            messenger_user_id: row.get(2)?,
            music_provider_platform: row.get(3)?,
            access_token: row.get(4)?,
            refresh_token: row.get(5)?,
            expires_at: row.get(6)?,
            autoclear: row.get::<_, i64>(7)? != 0,
            messages_to_clear: row.get(8)?,
        })
    }

    fn into_user(self) -> Result<User> {
        let expires_at = self
            .expires_at
            .as_deref()
            .map(|raw| {
                DateTime::parse_from_rfc3339(raw)
                    .map(|d| d.with_timezone(&Utc))
                    .map_err(|e| Error::Store(format!("invalid token expiry {raw:?}: {e}")))
            })
            .transpose()?;

        Ok(User {
            id: self.id.parse()?,
            messenger_platform: self.messenger_platform.parse()?,
            messenger_user_id: self.messenger_user_id,
            music_provider_platform: self.music_provider_platform.parse()?,
            music_provider_access_token: self.access_token,
            music_provider_refresh_token: self.refresh_token,
            music_provider_access_token_expires_at: expires_at,
            autoclear: self.autoclear,
            messages_to_clear: ClearLog::decode(self.messages_to_clear.as_deref()),
        })
    }
}

fn query_one(conn: &Connection, sql: &str, args: impl rusqlite::Params) -> Result<Option<User>> {
    conn.query_row(sql, args, UserRow::from_row)
        .optional()
        .map_err(sql_err)?
        .map(UserRow::into_user)
        .transpose()
}

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn find_by_identity(&self, identity: &UserIdentity) -> Result<Option<User>> {
        let identity = identity.clone();
        self.call(move |conn| {
            query_one(
                conn,
                &format!(
                    "{SELECT_COLUMNS}
                     WHERE messenger_platform = ?1 AND messenger_user_id = ?2
                       AND music_provider_platform = ?3"
                ),
                params![
                    identity.messenger_platform.as_str(),
                    identity.messenger_user_id,
                    identity.music_provider_platform.as_str()
                ],
            )
        })
        .await
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>> {
        self.call(move |conn| {
            query_one(
                conn,
                &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                params![id.to_string()],
            )
        })
        .await
    }

    async fn save(&self, user: &User) -> Result<User> {
        let user = user.clone();
        self.call(move |conn| {
            let messages_to_clear = user.messages_to_clear.encode()?;
            let expires_at = user
                .music_provider_access_token_expires_at
                .map(|t| t.to_rfc3339());
            conn.execute(
                "INSERT INTO users (id, messenger_platform, messenger_user_id, music_provider_platform,
                                    music_provider_access_token, music_provider_refresh_token,
                                    music_provider_access_token_expires_at, autoclear, messages_to_clear)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(id) DO UPDATE SET
                    messenger_platform = ?2,
                    messenger_user_id = ?3,
                    music_provider_platform = ?4,
                    music_provider_access_token = ?5,
                    music_provider_refresh_token = ?6,
                    music_provider_access_token_expires_at = ?7,
                    autoclear = ?8,
                    messages_to_clear = ?9",
                params![
                    user.id.to_string(),
                    user.messenger_platform.as_str(),
                    user.messenger_user_id,
                    user.music_provider_platform.as_str(),
                    user.music_provider_access_token,
                    user.music_provider_refresh_token,
                    expires_at,
                    user.autoclear as i64,
                    messages_to_clear,
                ],
            )
            .map_err(sql_err)?;
            Ok(user)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use smb_core::domain::ChatId;

    use super::*;

    fn raw_messages_to_clear(store: &SqliteUserStore, id: UserId) -> Option<String> {
        lock_conn(&store.conn)
            .query_row(
                "SELECT messages_to_clear FROM users WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .unwrap()
    }

    #[tokio::test]
    async fn saves_and_loads_full_record() {
        let store = SqliteUserStore::open_in_memory().unwrap();
        let mut user = User::new(UserIdentity::telegram_spotify(ChatId(77)));
        user.autoclear = true;
        user.music_provider_access_token = Some("access".to_string());
        user.music_provider_refresh_token = Some("refresh".to_string());
        user.music_provider_access_token_expires_at =
            Some(Utc.with_ymd_and_hms(2031, 5, 6, 7, 8, 9).unwrap());
        user.messages_to_clear.push("10");
        user.messages_to_clear.push("11");
        store.save(&user).await.unwrap();

        let by_id = store.find_by_id(user.id).await.unwrap();
        assert_eq!(by_id.as_ref(), Some(&user));

        let by_identity = store
            .find_by_identity(&UserIdentity::telegram_spotify(ChatId(77)))
            .await
            .unwrap();
        assert_eq!(by_identity, Some(user));
    }

    #[tokio::test]
    async fn unknown_user_is_none() {
        let store = SqliteUserStore::open_in_memory().unwrap();
        assert!(store.find_by_id(UserId::generate()).await.unwrap().is_none());
        assert!(store
            .find_by_identity(&UserIdentity::telegram_spotify(ChatId(1)))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn save_updates_existing_row() {
        let store = SqliteUserStore::open_in_memory().unwrap();
        let mut user = User::new(UserIdentity::telegram_spotify(ChatId(3)));
        user.messages_to_clear.push("1");
        store.save(&user).await.unwrap();

        user.messages_to_clear = ClearLog::default();
        user.autoclear = true;
        store.save(&user).await.unwrap();

        let loaded = store.find_by_id(user.id).await.unwrap().unwrap();
        assert!(loaded.autoclear);
        assert!(loaded.messages_to_clear.is_empty());
        assert_eq!(raw_messages_to_clear(&store, user.id), None);
    }

    #[tokio::test]
    async fn clear_log_is_stored_as_json_array() {
        let store = SqliteUserStore::open_in_memory().unwrap();
        let mut user = User::new(UserIdentity::telegram_spotify(ChatId(4)));
        user.messages_to_clear.push("5");
        user.messages_to_clear.push("5");
        store.save(&user).await.unwrap();

        assert_eq!(
            raw_messages_to_clear(&store, user.id).as_deref(),
            Some(r#"["5","5"]"#)
        );
    }

    #[tokio::test]
    async fn corrupt_clear_log_still_loads_and_can_be_reset() {
        let store = SqliteUserStore::open_in_memory().unwrap();
        let user = User::new(UserIdentity::telegram_spotify(ChatId(6)));
        store.save(&user).await.unwrap();
        lock_conn(&store.conn)
            .execute(
                "UPDATE users SET messages_to_clear = ?1 WHERE id = ?2",
                params!["{not json", user.id.to_string()],
            )
            .unwrap();

        let loaded = store.find_by_identity(&user.identity()).await.unwrap().unwrap();
        assert!(loaded.messages_to_clear.is_empty());

        store.save(&loaded).await.unwrap();
        assert_eq!(raw_messages_to_clear(&store, user.id), None);
    }

        #[tokio::test]
    async fn identity_triple_is_unique() {
        let store = SqliteUserStore::open_in_memory().unwrap();
        store
            .save(&User::new(UserIdentity::telegram_spotify(ChatId(9))))
            .await
            .unwrap();

        let err = store
            .save(&User::new(UserIdentity::telegram_spotify(ChatId(9))))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Store(_)));
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let path = std::env::temp_dir()
            .join(format!("smb-sqlite-{}", uuid::Uuid::new_v4()))
            .join("users.sqlite3");
        let user = User::new(UserIdentity::telegram_spotify(ChatId(12)));
        {
            let store = SqliteUserStore::open(&path).unwrap();
            store.save(&user).await.unwrap();
        }

        let reopened = SqliteUserStore::open(&path).unwrap();
        assert_eq!(reopened.find_by_id(user.id).await.unwrap(), Some(user));

        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }
}
