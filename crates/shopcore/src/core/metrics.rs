//! Prometheus metrics for payment sessions
//!
//! Tracks:
//! - Checkouts that reached the gateway
//! - Session outcomes (succeeded / failed / expired / cancelled / error)
//! - Sessions currently polling

use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};

/// Metric handles owned by the payment coordinator.
///
/// Cloning is cheap: prometheus metric handles are reference counted.
#[derive(Clone)]
pub struct PaymentMetrics {
    /// Payments created at the gateway
    pub checkouts_total: IntCounter,
    /// Session exits by outcome label
    pub session_outcomes_total: IntCounterVec,
    /// Sessions currently polling
    pub active_sessions: IntGauge,
}

impl PaymentMetrics {
    /// Creates the metrics and registers them in `registry`.
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let metrics = Self::unregistered()?;
        registry.register(Box::new(metrics.checkouts_total.clone()))?;
        registry.register(Box::new(metrics.session_outcomes_total.clone()))?;
        registry.register(Box::new(metrics.active_sessions.clone()))?;
        Ok(metrics)
    }

    /// Creates the metrics without exposing them anywhere (tests, tools).
    pub fn unregistered() -> prometheus::Result<Self> {
        Ok(Self {
            checkouts_total: IntCounter::with_opts(Opts::new(
                "shop_checkouts_total",
                "Total number of payments created at the gateway",
            ))?,
            session_outcomes_total: IntCounterVec::new(
                Opts::new("shop_payment_sessions_total", "Payment sessions by final outcome"),
                &["outcome"],
            )?,
            active_sessions: IntGauge::with_opts(Opts::new(
                "shop_payment_sessions_active",
                "Payment sessions currently polling the gateway",
            ))?,
        })
    }

    /// Records the end of a session.
    pub fn record_outcome(&self, outcome: &str) {
        self.session_outcomes_total.with_label_values(&[outcome]).inc();
    }
}
