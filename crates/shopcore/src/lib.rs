//! Shopcore - storefront core for the Telegram shop bot
//!
//! This library provides everything the bot needs to take money for a cart
//! without depending on Telegram itself.
//!
//! # Module Structure
//!
//! - `core`: configuration, errors, logging, metrics and formatting helpers
//! - `storage`: order, cart and customer stores (SQLite and in-memory)
//! - `gateway`: HTTP client for the payment provider
//! - `payment`: checkout, payment polling sessions and the task registry

pub mod core;
pub mod gateway;
pub mod payment;
pub mod storage;

// Re-export commonly used types for convenience
pub use core::{config, AppError, AppResult};
pub use gateway::{GatewayClient, GatewayError, PaymentGateway};
pub use payment::{CheckoutError, PaymentCoordinator, TaskRegistry};
pub use storage::{create_pool, DbPool, MemoryStore, SqliteStore};
