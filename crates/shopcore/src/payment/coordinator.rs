//! Checkout and payment session lifecycle.
//!
//! # Flow
//!
//! 1. `checkout` validates delivery details and the cart, creates the gateway
//!    payment, stores the order with its frozen items and turns the chat
//!    message into the payment prompt.
//! 2. A polling session is spawned and registered for the user. A session the
//!    user already had is cancelled and awaited before the new one polls.
//! 3. The session settles, fails or expires on its own; `cancel` stops it
//!    early and removes the unpaid order.
//!
//! # Example
//!
//! ```ignore
//! use shopcore::payment::{MessageRef, PaymentCoordinator};
//!
//! let coordinator = PaymentCoordinator::builder(gateway, notifier)
//!     .orders(store.clone())
//!     .carts(store.clone())
//!     .customers(store)
//!     .build()?;
//!
//! let receipt = coordinator.checkout(user_id, MessageRef::new(chat_id, message_id)).await?;
//! ```

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::messages;
use super::notifier::{Keyboard, MessageRef, Notifier};
use super::registry::{SessionHandle, TaskRegistry};
use super::session::{PaymentSession, SessionContext};
use crate::core::config::PollingConfig;
use crate::core::error::{AppError, AppResult};
use crate::core::metrics::PaymentMetrics;
use crate::gateway::{GatewayError, PaymentGateway, PaymentMetadata, PaymentRequest};
use crate::storage::{cart_total, CartStore, CustomerStore, NewOrder, NewOrderItem, OrderStore};

// ============================================================================
// Error Types
// ============================================================================

/// Checkout preconditions, checked before the gateway is contacted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("cart is empty")]
    EmptyCart,

    #[error("delivery address and phone are required")]
    MissingDeliveryInfo,
}

/// Why a checkout did not start a payment session.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("checkout rejected: {0}")]
    Validation(#[from] ValidationError),

    /// Gateway credentials are missing
    #[error("payment gateway is not configured: {0}")]
    Configuration(GatewayError),

    #[error("payment could not be created: {0}")]
    Gateway(GatewayError),

    #[error("storage failure during checkout: {0}")]
    Storage(#[from] AppError),
}

impl From<GatewayError> for CheckoutError {
    fn from(err: GatewayError) -> Self {
        if err.is_configuration() {
            Self::Configuration(err)
        } else {
            Self::Gateway(err)
        }
    }
}

impl CheckoutError {
    /// Text to show the customer.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Validation(ValidationError::EmptyCart) => messages::EMPTY_CART,
            Self::Validation(ValidationError::MissingDeliveryInfo) => messages::MISSING_DELIVERY_INFO,
            Self::Configuration(_) | Self::Gateway(_) => messages::PAYMENT_UNAVAILABLE,
            Self::Storage(_) => messages::INTERNAL_ERROR,
        }
    }
}

// ============================================================================
// Coordinator
// ============================================================================

/// A payment session that has been started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutReceipt {
    pub order_id: i64,
    pub gateway_id: String,
    pub amount: Decimal,
    pub confirmation_url: String,
}

/// Starts, tracks and cancels payment sessions.
///
/// Cloning is cheap and every clone shares the same sessions.
#[derive(Clone)]
pub struct PaymentCoordinator {
    ctx: Arc<SessionContext>,
    customers: Arc<dyn CustomerStore>,
}

impl PaymentCoordinator {
    pub fn builder(gateway: Arc<dyn PaymentGateway>, notifier: Arc<dyn Notifier>) -> PaymentCoordinatorBuilder {
        PaymentCoordinatorBuilder {
            gateway,
            notifier,
            orders: None,
            carts: None,
            customers: None,
            polling: PollingConfig::default(),
            metrics: None,
        }
    }

    /// Starts a payment for the user's cart.
    ///
    /// `message` is edited into the payment prompt now and into the outcome
    /// later.
    pub async fn checkout(&self, user_id: i64, message: MessageRef) -> Result<CheckoutReceipt, CheckoutError> {
        let customer = self
            .customers
            .get_delivery_info(user_id)
            .await?
            .filter(|c| c.has_delivery_details())
            .ok_or(ValidationError::MissingDeliveryInfo)?;

        let lines = self.ctx.carts.get_items(user_id).await?;
        if lines.is_empty() {
            return Err(ValidationError::EmptyCart.into());
        }
        let amount = cart_total(&lines);

        let created = self
            .ctx
            .gateway
            .create_payment(&PaymentRequest {
                amount,
                description: None,
                metadata: PaymentMetadata::for_user(user_id),
            })
            .await?;
        let confirmation_url = created
            .confirmation_url
            .ok_or(GatewayError::MissingField("confirmation_url"))?;
        let gateway_id = created.gateway_id;
        self.ctx.metrics.checkouts_total.inc();

        let order = self
            .ctx
            .orders
            .create_order(NewOrder {
                user_id,
                customer,
                payment_id: gateway_id.clone(),
                total_price: amount,
                items: lines.iter().map(NewOrderItem::from).collect(),
            })
            .await?;

        tracing::info!(
            user_id,
            order_id = order.id,
            gateway_id = %gateway_id,
            amount = %amount,
            "Checkout started"
        );

        let prompt = messages::payment_prompt(amount);
        let keyboard = Keyboard::PaymentLink {
            url: confirmation_url.clone(),
            payment_id: gateway_id.clone(),
        };
        if let Err(e) = self.ctx.notifier.edit_message(message, &prompt, keyboard).await {
            tracing::warn!(user_id, gateway_id = %gateway_id, "Failed to show payment prompt: {}", e);
        }

        self.start_session(PaymentSession {
            session_id: Uuid::new_v4(),
            user_id,
            order_id: order.id,
            gateway_id: gateway_id.clone(),
            amount,
            created_at: Utc::now(),
            message,
        })
        .await;

        Ok(CheckoutReceipt {
            order_id: order.id,
            gateway_id,
            amount,
            confirmation_url,
        })
    }

    /// Spawns the polling task, registers it and lets it run once any
    /// displaced session has stopped.
    async fn start_session(&self, session: PaymentSession) {
        let token = CancellationToken::new();
        let (start_tx, start_rx) = tokio::sync::oneshot::channel();
        let user_id = session.user_id;

        let handle = SessionHandle::new(session.session_id, session.gateway_id.clone(), session.order_id, token.clone());
        let join = tokio::spawn(session.run(Arc::clone(&self.ctx), token, start_rx));

        if let Some(displaced) = self.ctx.registry.register(user_id, handle.with_task(join)) {
            displaced.wait().await;
        }
        // The receiver is gone only if the session was already cancelled.
        let _ = start_tx.send(());
    }

    /// Cancels the user's session for `gateway_id` and removes its unpaid order.
    ///
    /// No outcome notice is sent. Returns `true` when a session or an order
    /// was removed; calling it again is harmless. Payments of other users
    /// are left alone.
    pub async fn cancel(&self, user_id: i64, gateway_id: &str) -> AppResult<bool> {
        if let Some(order) = self.ctx.orders.get_by_gateway_id(gateway_id).await? {
            if order.user_id != user_id {
                tracing::warn!(
                    user_id,
                    owner_id = order.user_id,
                    gateway_id,
                    "Refusing to cancel another customer's payment"
                );
                return Ok(false);
            }
        }

        let stopped = match self.ctx.registry.deregister_payment(user_id, gateway_id) {
            Some(handle) => {
                handle.wait().await;
                true
            }
            None => false,
        };

        let deleted = self.ctx.orders.delete_unpaid(gateway_id).await?;
        tracing::info!(user_id, gateway_id, stopped, deleted, "Payment cancelled by customer");
        Ok(stopped || deleted)
    }

    pub fn has_active_session(&self, user_id: i64) -> bool {
        self.ctx.registry.is_active(user_id)
    }

    /// Number of sessions currently registered.
    pub fn active_sessions(&self) -> usize {
        self.ctx.registry.len()
    }

    /// Cancels every session and waits for all of them (shutdown).
    pub async fn shutdown(&self) {
        let users: Vec<i64> = self.ctx.registry.user_ids();
        for user_id in users {
            if let Some(handle) = self.ctx.registry.deregister(user_id) {
                handle.wait().await;
            }
        }
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`PaymentCoordinator`].
pub struct PaymentCoordinatorBuilder {
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    orders: Option<Arc<dyn OrderStore>>,
    carts: Option<Arc<dyn CartStore>>,
    customers: Option<Arc<dyn CustomerStore>>,
    polling: PollingConfig,
    metrics: Option<PaymentMetrics>,
}

impl PaymentCoordinatorBuilder {
    #[must_use]
    pub fn orders(mut self, orders: Arc<dyn OrderStore>) -> Self {
        self.orders = Some(orders);
        self
    }

    #[must_use]
    pub fn carts(mut self, carts: Arc<dyn CartStore>) -> Self {
        self.carts = Some(carts);
        self
    }

    #[must_use]
    pub fn customers(mut self, customers: Arc<dyn CustomerStore>) -> Self {
        self.customers = Some(customers);
        self
    }

    #[must_use]
    pub fn polling(mut self, polling: PollingConfig) -> Self {
        self.polling = polling;
        self
    }

    #[must_use]
    pub fn metrics(mut self, metrics: PaymentMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Builds the coordinator.
    ///
    /// Fails when a store is missing or the metrics cannot be created.
    pub fn build(self) -> AppResult<PaymentCoordinator> {
        let missing = |name: &str| AppError::Validation(format!("payment coordinator needs a {name} store"));
        let orders = self.orders.ok_or_else(|| missing("order"))?;
        let carts = self.carts.ok_or_else(|| missing("cart"))?;
        let customers = self.customers.ok_or_else(|| missing("customer"))?;
        let metrics = match self.metrics {
            Some(metrics) => metrics,
            None => PaymentMetrics::unregistered().map_err(|e| AppError::Anyhow(e.into()))?,
        };

        Ok(PaymentCoordinator {
            ctx: Arc::new(SessionContext {
                gateway: self.gateway,
                orders,
                carts,
                notifier: self.notifier,
                registry: Arc::new(TaskRegistry::new()),
                polling: self.polling,
                metrics,
            }),
            customers,
        })
    }
}
