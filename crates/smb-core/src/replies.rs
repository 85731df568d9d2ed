use std::sync::Arc;

use crate::{
    clearing::MessageClearer,
    commands::{
        CLEAR_INPUTS, CLOSE_SETTINGS_INPUTS, LYRICS_INPUTS, OPEN_SETTINGS_INPUTS,
        TOGGLE_AUTOCLEAR_INPUTS,
    },
    domain::{ChatId, MessageRef, User},
    errors::Error,
    formatting::{convert_markdown_to_html, escape_html, split_plain_text},
    messaging::{port::MessagingPort, types::ReplyKeyboard},
    Result,
};

/// Default layout: Lyrics / Clear / Settings.
pub fn default_keyboard() -> ReplyKeyboard {
    ReplyKeyboard::single_row([LYRICS_INPUTS[0], CLEAR_INPUTS[0], OPEN_SETTINGS_INPUTS[0]])
}

/// Settings layout; the toggle label names the state it would switch to.
pub fn settings_keyboard(autoclear: bool) -> ReplyKeyboard {
    let next = if autoclear { "Off" } else { "On" };
    ReplyKeyboard::single_row([
        CLOSE_SETTINGS_INPUTS[0].to_string(),
        format!("{} {next}", TOGGLE_AUTOCLEAR_INPUTS[0]),
    ])
}

/// Sends replies and registers every sent message with the clear-log.
pub struct ReplyComposer {
    messenger: Arc<dyn MessagingPort>,
    clearer: Arc<MessageClearer>,
    safe_limit: usize,
}

impl ReplyComposer {
    pub fn new(
        messenger: Arc<dyn MessagingPort>,
        clearer: Arc<MessageClearer>,
        safe_limit: usize,
    ) -> Self {
        let safe_limit = safe_limit.min(messenger.capabilities().max_message_len);
        Self {
            messenger,
            clearer,
            safe_limit,
        }
    }

    /// Send a reply written in the lightweight markup (bold/italic/links).
    ///
    /// `None` means the default keyboard.
    pub async fn send(
        &self,
        chat_id: ChatId,
        user: &mut User,
        markdown: &str,
        keyboard: Option<&ReplyKeyboard>,
    ) -> Result<MessageRef> {
        let html = convert_markdown_to_html(markdown);
        self.send_registered(chat_id, user, &html, keyboard).await
    }

    /// Send literal text, split into several messages if it is too long.
    pub async fn send_plain(
        &self,
        chat_id: ChatId,
        user: &mut User,
        text: &str,
        keyboard: Option<&ReplyKeyboard>,
    ) -> Result<Vec<MessageRef>> {
        let chunks = split_plain_text(text, self.safe_limit);
        if chunks.is_empty() {
            return Err(Error::External("refusing to send an empty message".to_string()));
        }

        let mut sent = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            sent.push(
                self.send_registered(chat_id, user, &escape_html(&chunk), keyboard)
                    .await?,
            );
        }
        Ok(sent)
    }

    async fn send_registered(
        &self,
        chat_id: ChatId,
        user: &mut User,
        html: &str,
        keyboard: Option<&ReplyKeyboard>,
    ) -> Result<MessageRef> {
        let default = default_keyboard();
        let keyboard = keyboard.unwrap_or(&default);
        let msg = self.messenger.send_html(chat_id, html, Some(keyboard)).await?;
        self.clearer.append(user, msg.message_id).await?;
        Ok(msg)
    }
}
