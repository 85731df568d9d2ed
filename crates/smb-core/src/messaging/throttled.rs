use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    domain::{ChatId, MessageRef},
    messaging::{
        port::MessagingPort,
        types::{MessagingCapabilities, ReplyKeyboard},
    },
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Minimum spacing between any two Bot API calls.
    pub global_min_interval: Duration,
    /// Minimum spacing between two sends into the same chat.
    pub per_chat_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_min_interval: Duration::from_millis(40),
            per_chat_min_interval: Duration::from_millis(1050),
        }
    }
}

/// Next free slot for the whole bot and for each chat.
#[derive(Debug)]
struct Schedule {
    cfg: ThrottleConfig,
    global_next: Instant,
    chat_next: HashMap<ChatId, Instant>,
}

impl Schedule {
    fn new(cfg: ThrottleConfig, now: Instant) -> Self {
        Self {
            cfg,
            global_next: now,
            chat_next: HashMap::new(),
        }
    }

    /// Book a slot and return how long the caller must wait for it.
    ///
    /// With `chat` set the slot must also be free for that chat.
    fn book(&mut self, now: Instant, chat: Option<ChatId>) -> Duration {
        let mut start = self.global_next.max(now);
        if let Some(chat) = chat {
            if let Some(next) = self.chat_next.get(&chat) {
                start = start.max(*next);
            }
            self.chat_next
                .insert(chat, start + self.cfg.per_chat_min_interval);
        }
        self.global_next = start + self.cfg.global_min_interval;
        start.saturating_duration_since(now)
    }
}

/// MessagingPort decorator that spaces outbound calls.
///
/// Sends honor both intervals; deletions only the global one, so clearing a
/// long log does not crawl at one message per second.
pub struct ThrottledMessenger {
    inner: Arc<dyn MessagingPort>,
    schedule: Mutex<Schedule>,
}

impl ThrottledMessenger {
    pub fn new(inner: Arc<dyn MessagingPort>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            schedule: Mutex::new(Schedule::new(cfg, Instant::now())),
        }
    }

    async fn wait_turn(&self, chat: Option<ChatId>) {
        let wait = self.schedule.lock().await.book(Instant::now(), chat);
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }
}

#[async_trait::async_trait]
impl MessagingPort for ThrottledMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        self.inner.capabilities()
    }

    async fn send_html(
        &self,
        chat_id: ChatId,
        html: &str,
        keyboard: Option<&ReplyKeyboard>,
    ) -> Result<MessageRef> {
        self.wait_turn(Some(chat_id)).await;
        self.inner.send_html(chat_id, html, keyboard).await
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.wait_turn(None).await;
        self.inner.delete_message(msg).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn schedule(start: Instant) -> Schedule {
        Schedule::new(
            ThrottleConfig {
                global_min_interval: ms(10),
                per_chat_min_interval: ms(100),
            },
            start,
        )
    }

    #[test]
    fn sends_to_one_chat_use_the_per_chat_interval() {
        let start = Instant::now();
        let mut s = schedule(start);

        assert_eq!(s.book(start, Some(ChatId(1))), Duration::ZERO);
        assert_eq!(s.book(start, Some(ChatId(1))), ms(100));
        assert_eq!(s.book(start, Some(ChatId(1))), ms(200));
    }

    #[test]
    fn other_chats_and_deletes_only_wait_globally() {
        let start = Instant::now();
        let mut s = schedule(start);

        s.book(start, Some(ChatId(1)));
        assert_eq!(s.book(start, Some(ChatId(2))), ms(10));
        assert_eq!(s.book(start, None), ms(20));
        assert_eq!(s.book(start, None), ms(30));
    }

    #[test]
    fn idle_period_resets_waits() {
        let start = Instant::now();
        let mut s = schedule(start);

        s.book(start, Some(ChatId(1)));
        assert_eq!(s.book(start + ms(500), Some(ChatId(1))), Duration::ZERO);
    }
}
