use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;

use crate::{
    domain::{User, UserId, UserIdentity},
    errors::Error,
    Result,
};

/// Durable record store for [`User`]s.
///
/// Implementations must enforce uniqueness of [`UserIdentity`].
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_identity(&self, identity: &UserIdentity) -> Result<Option<User>>;
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>>;
    /// Upsert the full record.
    async fn save(&self, user: &User) -> Result<User>;
}

/// Process-local store, used in tests and for throwaway runs.
#[derive(Default)]
pub struct InMemoryUserStore {
    users: Mutex<HashMap<UserId, User>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<UserId, User>>> {
        self.users
            .lock()
            .map_err(|_| Error::Store("in-memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_identity(&self, identity: &UserIdentity) -> Result<Option<User>> {
        Ok(self
            .lock()?
            .values()
            .find(|u| &u.identity() == identity)
            .cloned())
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.lock()?.get(&id).cloned())
    }

    async fn save(&self, user: &User) -> Result<User> {
        let mut users = self.lock()?;
        let identity = user.identity();
        if users
            .values()
            .any(|u| u.id != user.id && u.identity() == identity)
        {
            return Err(Error::Store(format!(
                "user already exists for {}/{}/{}",
                identity.messenger_platform,
                identity.messenger_user_id,
                identity.music_provider_platform
            )));
        }
        users.insert(user.id, user.clone());
        Ok(user.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChatId;

    #[tokio::test]
    async fn save_is_an_upsert() {
        let store = InMemoryUserStore::new();
        let mut user = User::new(UserIdentity::telegram_spotify(ChatId(1)));
        store.save(&user).await.unwrap();

        user.autoclear = true;
        store.save(&user).await.unwrap();

        let loaded = store.find_by_id(user.id).await.unwrap().unwrap();
        assert!(loaded.autoclear);
        let by_identity = store
            .find_by_identity(&UserIdentity::telegram_spotify(ChatId(1)))
            .await
            .unwrap();
        assert_eq!(by_identity, Some(loaded));
    }

    #[tokio::test]
    async fn rejects_second_record_for_same_identity() {
        let store = InMemoryUserStore::new();
        let first = User::new(UserIdentity::telegram_spotify(ChatId(7)));
        let second = User::new(UserIdentity::telegram_spotify(ChatId(7)));
        store.save(&first).await.unwrap();
        assert!(matches!(store.save(&second).await, Err(Error::Store(_))));
    }
}
