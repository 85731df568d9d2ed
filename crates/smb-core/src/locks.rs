use std::{
    collections::HashMap,
    sync::{Arc, Mutex as SyncMutex, PoisonError},
};

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::UserIdentity;

type LockMap = HashMap<UserIdentity, Arc<Mutex<()>>>;

/// Per-identity async locks.
///
/// Held for the whole handling of one inbound event, and by every other
/// writer of the same user record, so read-modify-writes never interleave.
/// An identity's entry is dropped once nobody holds or waits for it.
#[derive(Default)]
pub struct UserLocks {
    inner: SyncMutex<LockMap>,
}

/// Held lock for one identity; unlocks and prunes on drop.
pub struct UserGuard<'a> {
    locks: &'a UserLocks,
    identity: UserIdentity,
    guard: Option<OwnedMutexGuard<()>>,
}

impl UserLocks {
    fn map(&self) -> std::sync::MutexGuard<'_, LockMap> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn lock_user(&self, identity: &UserIdentity) -> UserGuard<'_> {
        let lock = self
            .map()
            .entry(identity.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        UserGuard {
            locks: self,
            identity: identity.clone(),
            guard: Some(lock.lock_owned().await),
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.map().len()
    }
}

impl Drop for UserGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Waiters and holders each own a clone; only the map's copy left means idle.
        let mut map = self.locks.map();
        if map
            .get(&self.identity)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            map.remove(&self.identity);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::domain::ChatId;

    #[tokio::test]
    async fn same_identity_is_serialized() {
        let locks = Arc::new(UserLocks::default());
        let identity = UserIdentity::telegram_spotify(ChatId(1));
        let guard = locks.lock_user(&identity).await;

        let contender = {
            let locks = locks.clone();
            let identity = identity.clone();
            tokio::spawn(async move {
                let _guard = locks.lock_user(&identity).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn different_identities_do_not_block() {
        let locks = UserLocks::default();
        let _a = locks.lock_user(&UserIdentity::telegram_spotify(ChatId(1))).await;
        let _b = tokio::time::timeout(
            Duration::from_millis(100),
            locks.lock_user(&UserIdentity::telegram_spotify(ChatId(2))),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn idle_entries_are_pruned() {
        let locks = UserLocks::default();
        for chat in 0..50 {
            let _guard = locks.lock_user(&UserIdentity::telegram_spotify(ChatId(chat))).await;
        }
        assert_eq!(locks.tracked(), 0);
    }

    #[tokio::test]
    async fn entry_survives_while_someone_waits() {
        let locks = Arc::new(UserLocks::default());
        let identity = UserIdentity::telegram_spotify(ChatId(1));
        let guard = locks.lock_user(&identity).await;

        let waiter = {
            let locks = locks.clone();
            let identity = identity.clone();
            tokio::spawn(async move {
                let _guard = locks.lock_user(&identity).await;
                tokio::time::sleep(Duration::from_millis(20)).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(guard);
        assert_eq!(locks.tracked(), 1);

        waiter.await.unwrap();
        assert_eq!(locks.tracked(), 0);
    }
}
