use anyhow::{Context, Result};
use std::sync::Arc;
use teloxide::prelude::*;

use shopcore::core::config::Config;
use shopcore::core::logging::log_payment_configuration;
use shopcore::core::metrics::PaymentMetrics;
use shopcore::core::init_logger;
use shopcore::{create_pool, GatewayClient, PaymentCoordinator, SqliteStore};

mod metrics_server;
mod telegram;

use telegram::{create_bot, schema, setup_bot_commands, DeliveryStorage, HandlerDeps, TelegramNotifier};

/// Main entry point for the Telegram bot
///
/// # Errors
/// Returns an error if initialization fails (configuration, logging, database, bot creation).
#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    init_logger(&config.log_file_path, &config.log_level)?;

    tracing::info!("Starting shop bot...");
    log_payment_configuration(&config);

    let pool = create_pool(&config.database_path).context("Failed to open database")?;
    let store = Arc::new(SqliteStore::new(pool));

    let gateway = Arc::new(GatewayClient::new(config.gateway()).context("Failed to build gateway client")?);

    let bot = create_bot(&config)?;
    if let Err(e) = setup_bot_commands(&bot).await {
        tracing::warn!("Failed to set bot commands: {}", e);
    }

    let registry = prometheus::Registry::new();
    let metrics = PaymentMetrics::new(&registry).context("Failed to register metrics")?;

    if config.metrics_enabled {
        let port = config.metrics_port;
        let registry = registry.clone();
        tokio::spawn(async move {
            if let Err(e) = metrics_server::start_metrics_server(port, registry).await {
                tracing::error!("Metrics server error: {}", e);
            }
        });
    }

    let notifier = Arc::new(TelegramNotifier::new(bot.clone()));
    let coordinator = PaymentCoordinator::builder(gateway, notifier.clone())
        .orders(store.clone())
        .carts(store.clone())
        .customers(store.clone())
        .polling(config.polling())
        .metrics(metrics.clone())
        .build()?;

    let deps = HandlerDeps::new(coordinator.clone(), store, notifier);

    tracing::info!("Dispatcher started");
    Dispatcher::builder(bot, schema(deps))
        .dependencies(dptree::deps![DeliveryStorage::new()])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
    tracing::info!("Dispatcher shutdown gracefully");

    let pending = coordinator.active_sessions();
    if pending > 0 {
        tracing::info!("Cancelling {} payment session(s)", pending);
    }
    coordinator.shutdown().await;

    tracing::info!(
        checkouts = metrics.checkouts_total.get(),
        "Shop bot stopped"
    );
    Ok(())
}
