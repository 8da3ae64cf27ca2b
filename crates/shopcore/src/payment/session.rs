//! Payment polling sessions.
//!
//! A session watches one gateway payment until it settles, fails, expires or
//! gets cancelled. Status checks run strictly one after another; both the
//! gateway call and the pause between checks race the session's
//! cancellation token. Storage writes of a terminal transition are never
//! raced, so a cancel arriving mid-write waits for the write to finish.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::messages;
use super::notifier::{Keyboard, MessageRef, Notifier};
use super::registry::{RegistrationGuard, TaskRegistry};
use crate::core::config::PollingConfig;
use crate::core::error::{AppError, AppResult};
use crate::core::metrics::PaymentMetrics;
use crate::gateway::{GatewayStatus, PaymentGateway, PaymentReport};
use crate::storage::{CartStore, OrderStore, PaymentState};

/// Collaborators shared by the coordinator and every session it spawns.
pub(crate) struct SessionContext {
    pub gateway: Arc<dyn PaymentGateway>,
    pub orders: Arc<dyn OrderStore>,
    pub carts: Arc<dyn CartStore>,
    pub notifier: Arc<dyn Notifier>,
    pub registry: Arc<TaskRegistry>,
    pub polling: PollingConfig,
    pub metrics: PaymentMetrics,
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Succeeded,
    /// Gateway reported a status that will not turn into a payment
    Failed(GatewayStatus),
    /// No payment within the polling window
    Expired,
    Cancelled,
}

impl SessionOutcome {
    /// Metrics label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed(_) => "failed",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }
}

/// What a single status check means for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollDecision {
    Settle,
    Wait,
    Fail,
}

/// `succeeded` settles; `pending` and `canceled` keep waiting; anything else,
/// `waiting_for_capture` included, is a failure.
pub fn classify(status: &GatewayStatus) -> PollDecision {
    match status {
        GatewayStatus::Succeeded => PollDecision::Settle,
        GatewayStatus::Pending | GatewayStatus::Canceled => PollDecision::Wait,
        GatewayStatus::WaitingForCapture | GatewayStatus::Other(_) => PollDecision::Fail,
    }
}

/// Result of one status request.
enum Check {
    Cancelled,
    /// Retryable gateway failure
    Unavailable,
    Report(PaymentReport),
}

/// One customer's payment being watched.
#[derive(Debug, Clone)]
pub struct PaymentSession {
    pub session_id: Uuid,
    pub user_id: i64,
    pub order_id: i64,
    pub gateway_id: String,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
    /// Message edited with the outcome
    pub message: MessageRef,
}

impl PaymentSession {
    /// Task body: waits for `start` (or cancellation), polls, and always
    /// releases the registry entry on exit.
    pub(crate) async fn run(
        self,
        ctx: Arc<SessionContext>,
        token: CancellationToken,
        start: tokio::sync::oneshot::Receiver<()>,
    ) {
        let _guard = RegistrationGuard::new(Arc::clone(&ctx.registry), self.user_id, self.session_id);

        tokio::select! {
            biased;
            _ = token.cancelled() => {}
            _ = start => {}
        }

        ctx.metrics.active_sessions.inc();
        let outcome = self.poll(&ctx, &token).await;
        ctx.metrics.active_sessions.dec();

        match outcome {
            Ok(outcome) => {
                ctx.metrics.record_outcome(outcome.label());
                tracing::info!(
                    user_id = self.user_id,
                    order_id = self.order_id,
                    gateway_id = %self.gateway_id,
                    outcome = outcome.label(),
                    elapsed_secs = (Utc::now() - self.created_at).num_seconds(),
                    "Payment session finished"
                );
            }
            Err(e) => {
                ctx.metrics.record_outcome("error");
                tracing::error!(
                    user_id = self.user_id,
                    order_id = self.order_id,
                    gateway_id = %self.gateway_id,
                    "Payment session aborted: {}",
                    e
                );
            }
        }
    }

    async fn poll(&self, ctx: &SessionContext, token: &CancellationToken) -> AppResult<SessionOutcome> {
        let max_attempts = ctx.polling.max_attempts;

        for attempt in 1..=max_attempts {
            match self.check(ctx, token).await? {
                Check::Cancelled => return self.tidy_cancelled(ctx).await,
                Check::Unavailable => {}
                Check::Report(report) => match classify(&report.status) {
                    PollDecision::Settle => return self.settle(ctx).await,
                    PollDecision::Fail => return self.fail(ctx, report.status).await,
                    PollDecision::Wait => {
                        tracing::debug!(
                            gateway_id = %self.gateway_id,
                            attempt,
                            max_attempts,
                            status = %report.status,
                            "Payment not settled yet"
                        );
                    }
                },
            }

            tokio::select! {
                biased;
                _ = token.cancelled() => return self.tidy_cancelled(ctx).await,
                _ = tokio::time::sleep(ctx.polling.interval) => {}
            }
        }

        // One last look before giving up.
        match self.check(ctx, token).await? {
            Check::Cancelled => self.tidy_cancelled(ctx).await,
            Check::Report(report) if report.status == GatewayStatus::Succeeded => self.settle(ctx).await,
            Check::Report(_) | Check::Unavailable => self.expire(ctx).await,
        }
    }

    /// Asks the gateway once. Retryable failures become `Unavailable`;
    /// anything else ends the session with an error.
    async fn check(&self, ctx: &SessionContext, token: &CancellationToken) -> AppResult<Check> {
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => return Ok(Check::Cancelled),
            result = ctx.gateway.get_payment_status(&self.gateway_id) => result,
        };

        match result {
            Ok(report) => Ok(Check::Report(report)),
            Err(e) if e.is_retryable() => {
                tracing::warn!(gateway_id = %self.gateway_id, "Status check failed, will retry: {}", e);
                Ok(Check::Unavailable)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn settle(&self, ctx: &SessionContext) -> AppResult<SessionOutcome> {
        self.record(ctx, PaymentState::Succeeded).await?;
        ctx.carts.clear(self.user_id).await?;

        let text = messages::payment_succeeded(self.order_id, self.amount);
        self.notify(ctx, &text, Keyboard::AfterPayment).await;
        Ok(SessionOutcome::Succeeded)
    }

    async fn fail(&self, ctx: &SessionContext, status: GatewayStatus) -> AppResult<SessionOutcome> {
        self.record(ctx, PaymentState::Failed).await?;

        let text = messages::payment_failed(&status);
        self.notify(ctx, &text, Keyboard::BackToCart).await;
        Ok(SessionOutcome::Failed(status))
    }

    /// Stores the payment state; a missing order stops the session before
    /// the cart or the customer is touched.
    async fn record(&self, ctx: &SessionContext, state: PaymentState) -> AppResult<()> {
        if ctx.orders.update_payment_status(&self.gateway_id, state).await? {
            Ok(())
        } else {
            Err(AppError::OrderNotFound(self.gateway_id.clone()))
        }
    }

    async fn expire(&self, ctx: &SessionContext) -> AppResult<SessionOutcome> {
        ctx.orders.delete_unpaid(&self.gateway_id).await?;
        self.notify(ctx, messages::PAYMENT_EXPIRED, Keyboard::None).await;
        Ok(SessionOutcome::Expired)
    }

    /// A cancelled session removes its own unpaid order; nobody is notified.
    async fn tidy_cancelled(&self, ctx: &SessionContext) -> AppResult<SessionOutcome> {
        if let Err(e) = ctx.orders.delete_unpaid(&self.gateway_id).await {
            tracing::warn!(gateway_id = %self.gateway_id, "Failed to remove order of cancelled payment: {}", e);
        }
        Ok(SessionOutcome::Cancelled)
    }

    async fn notify(&self, ctx: &SessionContext, text: &str, keyboard: Keyboard) {
        if let Err(e) = ctx.notifier.edit_message(self.message, text, keyboard).await {
            tracing::warn!(user_id = self.user_id, gateway_id = %self.gateway_id, "Failed to notify customer: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_gateway_statuses() {
        assert_eq!(classify(&GatewayStatus::Succeeded), PollDecision::Settle);
        assert_eq!(classify(&GatewayStatus::Pending), PollDecision::Wait);
        assert_eq!(classify(&GatewayStatus::Canceled), PollDecision::Wait);
        assert_eq!(classify(&GatewayStatus::WaitingForCapture), PollDecision::Fail);
        assert_eq!(classify(&GatewayStatus::from("expired")), PollDecision::Fail);
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(SessionOutcome::Failed(GatewayStatus::from("x")).label(), "failed");
        assert_eq!(SessionOutcome::Cancelled.label(), "cancelled");
    }
}
