//! Logging initialization and configuration checking
//!
//! This module provides:
//! - Logger initialization (console + file)
//! - Payment gateway configuration check at startup

use anyhow::{Context, Result};
use std::fs::File;
use std::sync::Arc;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::core::config::Config;

/// Initialize logger for both console and file output
///
/// `RUST_LOG` wins over `level` when set. Records emitted through the `log`
/// facade (teloxide, reqwest internals) are forwarded into tracing.
///
/// # Arguments
/// * `log_file_path` - Path to the log file
/// * `level` - Default filter directive, e.g. `info`
///
/// # Returns
/// * `Ok(())` - Logger initialized successfully
/// * `Err(anyhow::Error)` - Log file or filter invalid, or a logger is already installed
pub fn init_logger(log_file_path: &str, level: &str) -> Result<()> {
    let log_file = File::create(log_file_path).with_context(|| format!("Failed to create log file {log_file_path}"))?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("Invalid log level directive: {level}"))?;

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .with(fmt::layer().with_ansi(false).with_writer(Arc::new(log_file)));

    tracing::subscriber::set_global_default(subscriber).context("Failed to initialize logger")?;
    tracing_log::LogTracer::init().context("Failed to forward log records")?;

    Ok(())
}

/// Logs the payment configuration at application startup
///
/// Missing credentials are not fatal: the bot keeps serving carts and every
/// checkout fails fast with a configuration error.
pub fn log_payment_configuration(config: &Config) {
    let gateway = config.gateway();
    let polling = config.polling();

    tracing::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    tracing::info!("💳 Payment gateway configuration");
    tracing::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    tracing::info!("  • API URL: {}", gateway.api_url);
    tracing::info!("  • Currency: {}", gateway.currency);
    tracing::info!(
        "  • Polling: {} checks every {}s",
        polling.max_attempts,
        polling.interval.as_secs()
    );

    match (&gateway.shop_id, &gateway.secret_key) {
        (Some(shop_id), Some(_)) => {
            tracing::info!("✅ YOOKASSA_SHOP_ID: {}", shop_id);
            tracing::info!("✅ YOOKASSA_SECRET_KEY: set");
        }
        (shop_id, secret) => {
            if shop_id.is_none() {
                tracing::error!("❌ YOOKASSA_SHOP_ID: not set");
            }
            if secret.is_none() {
                tracing::error!("❌ YOOKASSA_SECRET_KEY: not set");
            }
            tracing::error!("   Checkout will FAIL until both are configured!");
        }
    }
}
