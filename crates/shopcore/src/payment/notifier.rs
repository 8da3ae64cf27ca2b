//! Outbound notification seam.
//!
//! The payment flow only ever edits the chat message that started the
//! checkout. The bot implements [`Notifier`] on top of Telegram; tests record
//! the calls.

use async_trait::async_trait;
use thiserror::Error;

/// A chat message that can be edited in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: i64,
    pub message_id: i32,
}

impl MessageRef {
    pub fn new(chat_id: i64, message_id: i32) -> Self {
        Self { chat_id, message_id }
    }
}

/// Inline keyboard attached to an edited message.
///
/// Rendering is left to the notifier; the payment flow only says which one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Keyboard {
    /// Pay link plus a cancel button for this payment
    PaymentLink { url: String, payment_id: String },
    /// Back to menu / my orders
    AfterPayment,
    /// Single "back to cart" button
    BackToCart,
    /// Cart contents with a checkout button
    CartCheckout,
    /// Remove the keyboard
    None,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to deliver notification: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Replaces the text and keyboard of `target`.
    async fn edit_message(&self, target: MessageRef, text: &str, keyboard: Keyboard) -> Result<(), NotifyError>;
}
