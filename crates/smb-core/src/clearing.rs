use std::sync::Arc;

use tracing::{debug, warn};

use crate::{
    domain::{ChatId, MessageId, MessageRef, User},
    messaging::port::MessagingPort,
    users::UserService,
    Result,
};

/// Outcome of one bulk deletion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClearReport {
    pub attempted: usize,
    pub deleted: usize,
}

/// Maintains the per-user clear-log and deletes everything in it on demand.
pub struct MessageClearer {
    users: Arc<UserService>,
    messenger: Arc<dyn MessagingPort>,
}

impl MessageClearer {
    pub fn new(users: Arc<UserService>, messenger: Arc<dyn MessagingPort>) -> Self {
        Self { users, messenger }
    }

    /// Register a message (inbound or outbound) for later deletion.
    pub async fn append(&self, user: &mut User, message_id: MessageId) -> Result<()> {
        self.users
            .append_message_to_clear(user, &message_id.0.to_string())
            .await
    }

    /// Delete every logged message in log order, then reset the log.
    ///
    /// Deletions are best-effort per message. `keep` is skipped and stays in
    /// the log, so the message that triggered the clear survives it.
    pub async fn clear(
        &self,
        user: &mut User,
        chat_id: ChatId,
        keep: Option<MessageId>,
    ) -> Result<ClearReport> {
        let log = self.users.messages_to_clear(user).await?;
        let keep_raw = keep.map(|id| id.0.to_string());
        debug!(chat_id = chat_id.0, pending = log.len(), "clearing messages");

        let mut report = ClearReport::default();
        let mut kept = false;
        for raw in log.ids() {
            if keep_raw.as_deref() == Some(raw.as_str()) {
                kept = true;
                continue;
            }

            report.attempted += 1;
            let Ok(id) = raw.trim().parse::<i32>() else {
                warn!(chat_id = chat_id.0, entry = %raw, "skipping malformed message id in clear-log");
                continue;
            };

            let msg = MessageRef {
                chat_id,
                message_id: MessageId(id),
            };
            match self.messenger.delete_message(msg).await {
                Ok(()) => report.deleted += 1,
                Err(e) => warn!(
                    chat_id = chat_id.0,
                    message_id = id,
                    error = %e,
                    "failed to delete message"
                ),
            }
        }

        self.users.reset_messages_to_clear(user).await?;
        if let (true, Some(id)) = (kept, keep) {
            self.append(user, id).await?;
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::UserIdentity,
        store::InMemoryUserStore,
        testing::FakeMessenger,
    };

    async fn setup(fail_on: &[i32]) -> (Arc<FakeMessenger>, Arc<UserService>, MessageClearer, User) {
        let messenger = Arc::new(FakeMessenger::failing_deletes(fail_on));
        let users = Arc::new(UserService::new(Arc::new(InMemoryUserStore::new())));
        let clearer = MessageClearer::new(users.clone(), messenger.clone());
        let user = users
            .get_or_create(&UserIdentity::telegram_spotify(ChatId(9)))
            .await
            .unwrap();
        (messenger, users, clearer, user)
    }

    #[tokio::test]
    async fn clears_all_in_append_order_even_when_some_fail() {
        let (messenger, users, clearer, mut user) = setup(&[20]).await;
        for id in [30, 20, 10, 20] {
            clearer.append(&mut user, MessageId(id)).await.unwrap();
        }

        let report = clearer.clear(&mut user, ChatId(9), None).await.unwrap();

        assert_eq!(messenger.delete_attempts(), vec![30, 20, 10, 20]);
        assert_eq!(report, ClearReport { attempted: 4, deleted: 2 });
        assert!(users.messages_to_clear(&user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_log_issues_no_deletes() {
        let (messenger, users, clearer, mut user) = setup(&[]).await;
        let report = clearer.clear(&mut user, ChatId(9), None).await.unwrap();
        assert_eq!(report.attempted, 0);
        assert!(messenger.delete_attempts().is_empty());
        assert!(users.messages_to_clear(&user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn kept_message_survives_and_stays_logged() {
        let (messenger, users, clearer, mut user) = setup(&[]).await;
        for id in [1, 2, 3] {
            clearer.append(&mut user, MessageId(id)).await.unwrap();
        }

        let report = clearer
            .clear(&mut user, ChatId(9), Some(MessageId(3)))
            .await
            .unwrap();

        assert_eq!(report.attempted, 2);
        assert_eq!(messenger.delete_attempts(), vec![1, 2]);
        assert_eq!(users.messages_to_clear(&user).await.unwrap().ids(), ["3"]);
    }

    #[tokio::test]
    async fn keep_absent_from_log_is_not_added() {
        let (_, users, clearer, mut user) = setup(&[]).await;
        clearer.append(&mut user, MessageId(1)).await.unwrap();
        clearer
            .clear(&mut user, ChatId(9), Some(MessageId(99)))
            .await
            .unwrap();
        assert!(users.messages_to_clear(&user).await.unwrap().is_empty());
    }
}
