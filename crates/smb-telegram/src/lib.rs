//! Telegram adapter (teloxide).
//!
//! Implements the `smb-core` MessagingPort over the Telegram Bot API and
//! exposes the webhook route Telegram pushes updates to.

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{KeyboardButton, KeyboardMarkup, ParseMode},
};

use tokio::time::sleep;
use tracing::info;

pub mod webhook;

use smb_core::{
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{MessagingCapabilities, ReplyKeyboard},
    },
    Result,
};

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
    max_message_len: usize,
}

impl TelegramMessenger {
    pub fn new(bot: Bot, max_message_len: usize) -> Self {
        Self {
            bot,
            max_message_len,
        }
    }

    pub fn from_token(token: &str, max_message_len: usize) -> Self {
        Self::new(Bot::new(token), max_message_len)
    }

    /// Point Telegram at our webhook; updates carry `secret` in a header.
    pub async fn register_webhook(&self, url: &str, secret: &str) -> Result<()> {
        let url = reqwest::Url::parse(url)
            .map_err(|e| Error::Config(format!("invalid webhook url {url:?}: {e}")))?;
        self.with_retry(|| {
            self.bot
                .set_webhook(url.clone())
                .secret_token(secret.to_string())
        })
        .await?;
        info!(url = %url, "telegram webhook registered");
        Ok(())
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    fn tg_keyboard(keyboard: &ReplyKeyboard) -> KeyboardMarkup {
        let rows: Vec<Vec<KeyboardButton>> = keyboard
            .rows
            .iter()
            .map(|row| row.iter().map(KeyboardButton::new).collect())
            .collect();
        KeyboardMarkup::new(rows).resize_keyboard(keyboard.resize)
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            max_message_len: self.max_message_len,
        }
    }

    async fn send_html(
        &self,
        chat_id: ChatId,
        html: &str,
        keyboard: Option<&ReplyKeyboard>,
    ) -> Result<MessageRef> {
        let markup = keyboard.map(Self::tg_keyboard);
        let msg = self
            .with_retry(|| {
                let req = self
                    .bot
                    .send_message(Self::tg_chat(chat_id), html.to_string())
                    .parse_mode(ParseMode::Html);
                match &markup {
                    Some(m) => req.reply_markup(m.clone()),
                    None => req,
                }
            })
            .await?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.with_retry(|| {
            self.bot
                .delete_message(Self::tg_chat(msg.chat_id), Self::tg_msg_id(msg.message_id))
        })
        .await?;
        Ok(())
    }
}
