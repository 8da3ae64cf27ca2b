//! Telegram implementation of the payment notifier.

use async_trait::async_trait;
use shopcore::payment::{Keyboard, MessageRef, Notifier, NotifyError};
use teloxide::prelude::*;
use teloxide::types::MessageId;
use teloxide::{ApiError, RequestError};

use super::keyboards;

/// Edits chat messages through the Bot API.
#[derive(Clone)]
pub struct TelegramNotifier {
    bot: Bot,
}

impl TelegramNotifier {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn edit_message(&self, target: MessageRef, text: &str, keyboard: Keyboard) -> Result<(), NotifyError> {
        let markup = keyboards::render(&keyboard).map_err(|e| NotifyError::Delivery(format!("bad button url: {e}")))?;

        let mut request = self
            .bot
            .edit_message_text(ChatId(target.chat_id), MessageId(target.message_id), text);
        if let Some(markup) = markup {
            request = request.reply_markup(markup);
        }

        match request.await {
            Ok(_) | Err(RequestError::Api(ApiError::MessageNotModified)) => Ok(()),
            Err(e) => {
                tracing::warn!(chat_id = target.chat_id, message_id = target.message_id, "Failed to edit message: {}", e);
                Err(NotifyError::Delivery(e.to_string()))
            }
        }
    }
}
