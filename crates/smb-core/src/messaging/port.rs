use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    messaging::types::{MessagingCapabilities, ReplyKeyboard},
    Result,
};

/// Cross-messenger port for outbound calls.
///
/// Telegram is the only implementation; capability flags leave room for
/// adapters with different limits.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    /// Send one HTML-formatted message, optionally replacing the reply keyboard.
    async fn send_html(
        &self,
        chat_id: ChatId,
        html: &str,
        keyboard: Option<&ReplyKeyboard>,
    ) -> Result<MessageRef>;

    async fn delete_message(&self, msg: MessageRef) -> Result<()>;
}
