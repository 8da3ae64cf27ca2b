//! Telegram bot integration and handlers

pub mod bot;
pub mod delivery;
pub mod handlers;
pub mod keyboards;
pub mod notifier;
pub mod views;

// Re-exports for convenience
pub use bot::{create_bot, setup_bot_commands};
pub use delivery::DeliveryStorage;
pub use handlers::{schema, HandlerDeps};
pub use notifier::TelegramNotifier;
