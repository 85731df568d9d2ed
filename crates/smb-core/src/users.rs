use std::sync::Arc;

use tracing::debug;

use crate::{
    domain::{ClearLog, ProviderTokens, User, UserId, UserIdentity},
    errors::Error,
    store::UserStore,
    Result,
};

/// Conversation-state accessors over the record store.
///
/// Every mutation re-reads the persisted record first and writes the full
/// record back; nothing is cached between calls.
pub struct UserService {
    store: Arc<dyn UserStore>,
}

impl UserService {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    /// Load the user for `identity`, creating it with defaults on first contact.
    pub async fn get_or_create(&self, identity: &UserIdentity) -> Result<User> {
        if let Some(existing) = self.store.find_by_identity(identity).await? {
            return Ok(existing);
        }

        let user = User::new(identity.clone());
        debug!(user_id = %user.id, messenger_user_id = %identity.messenger_user_id, "creating user");
        self.store.save(&user).await
    }

    pub async fn get(&self, id: UserId) -> Result<Option<User>> {
        self.store.find_by_id(id).await
    }

    /// Reload `user` from the store, falling back to the given copy if it vanished.
    async fn reload(&self, user: &User) -> Result<User> {
        Ok(self
            .store
            .find_by_id(user.id)
            .await?
            .unwrap_or_else(|| user.clone()))
    }

    /// Current persisted clear-log of `user`.
    pub async fn messages_to_clear(&self, user: &User) -> Result<ClearLog> {
        Ok(self.reload(user).await?.messages_to_clear)
    }

    /// Append `message_id` to the persisted clear-log and refresh `user`.
    pub async fn append_message_to_clear(&self, user: &mut User, message_id: &str) -> Result<()> {
        let mut current = self.reload(user).await?;
        current.messages_to_clear.push(message_id);
        debug!(
            user_id = %current.id,
            message_id,
            pending = current.messages_to_clear.len(),
            "message marked to clear"
        );
        *user = self.store.save(&current).await?;
        Ok(())
    }

    /// Persist an empty clear-log.
    pub async fn reset_messages_to_clear(&self, user: &mut User) -> Result<()> {
        let mut current = self.reload(user).await?;
        current.messages_to_clear = ClearLog::default();
        *user = self.store.save(&current).await?;
        Ok(())
    }

    /// Flip the autoclear flag and return the new value.
    pub async fn toggle_autoclear(&self, user: &mut User) -> Result<bool> {
        let mut current = self.reload(user).await?;
        current.autoclear = !current.autoclear;
        *user = self.store.save(&current).await?;
        Ok(user.autoclear)
    }

    /// Store music-provider credentials for the user with `id`.
    pub async fn update_provider_tokens(&self, id: UserId, tokens: ProviderTokens) -> Result<User> {
        let mut user = self
            .store
            .find_by_id(id)
            .await?
            .ok_or_else(|| Error::Store(format!("no user with id {id}")))?;

        user.music_provider_access_token = Some(tokens.access_token);
        user.music_provider_access_token_expires_at = Some(tokens.expires_at);
        if let Some(refresh) = tokens.refresh_token {
            user.music_provider_refresh_token = Some(refresh);
        }
        self.store.save(&user).await
    }
}
