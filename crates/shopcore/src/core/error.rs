use thiserror::Error;

use crate::gateway::GatewayError;

/// Centralized error types for the storefront core
///
/// Storage, gateway and notification failures inside the payment flow are
/// converted to this enum so the coordinator has one thing to log and one
/// thing to return.
///
/// # Example
///
/// ```no_run
/// use shopcore::AppError;
///
/// fn handle_error(err: AppError) {
///     eprintln!("Error: {}", err);
/// }
/// ```
#[derive(Error, Debug)]
pub enum AppError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Database connection pool errors
    #[error("Database pool error: {0}")]
    DatabasePool(#[from] r2d2::Error),

    /// Payment provider errors
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// A blocking storage task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Stored data that does not parse back (money, timestamps, enums)
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    /// No order is stored for a payment that the gateway knows about
    #[error("No order for payment {0}")]
    OrderNotFound(String),

    /// Notification channel errors
    #[error("Notification error: {0}")]
    Notification(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Anyhow errors (for general error handling)
    #[error("Application error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Type alias for Result with AppError
pub type AppResult<T> = Result<T, AppError>;
