//! Payment provider integration.
//!
//! Provides the `PaymentGateway` trait the payment coordinator talks to, and
//! `GatewayClient`, its implementation for the YooKassa REST API:
//! - `POST /payments` with Basic auth and an `Idempotence-Key` header
//! - `GET /payments/{id}` for status polling
//!
//! The gateway never panics and never mutates local state. Every failure is
//! logged where it happens and handed back as a `GatewayError` value, so the
//! caller decides what the customer sees.

pub mod client;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub use client::GatewayClient;

/// Payment status as reported by the gateway.
///
/// Unknown values are kept verbatim so they can be logged and stored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum GatewayStatus {
    /// Created, waiting for the customer
    Pending,
    /// Authorized, waiting for capture (not used with `capture: true`)
    WaitingForCapture,
    /// Money received
    Succeeded,
    /// Cancelled by the gateway or the customer abandoned the page
    Canceled,
    /// Anything else the gateway may report
    Other(String),
}

impl GatewayStatus {
    /// Wire representation of the status.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::WaitingForCapture => "waiting_for_capture",
            Self::Succeeded => "succeeded",
            Self::Canceled => "canceled",
            Self::Other(other) => other,
        }
    }
}

impl From<String> for GatewayStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "pending" => Self::Pending,
            "waiting_for_capture" => Self::WaitingForCapture,
            "succeeded" => Self::Succeeded,
            "canceled" => Self::Canceled,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for GatewayStatus {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl fmt::Display for GatewayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata attached to a payment, echoed back by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentMetadata {
    pub user_id: String,
}

impl PaymentMetadata {
    pub fn for_user(user_id: i64) -> Self {
        Self {
            user_id: user_id.to_string(),
        }
    }
}

/// What to charge.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub amount: Decimal,
    /// Shown on the payment page. `None` lets the client derive
    /// `Заказ №<idempotency key prefix>`.
    pub description: Option<String>,
    pub metadata: PaymentMetadata,
}

/// Result of a successful `create_payment`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedPayment {
    pub gateway_id: String,
    pub status: GatewayStatus,
    /// Page the customer has to open to pay
    pub confirmation_url: Option<String>,
}

/// Result of a successful `get_payment_status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentReport {
    pub gateway_id: String,
    pub status: GatewayStatus,
    pub paid: bool,
    pub amount: Decimal,
}

/// Payment gateway errors.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Shop id or secret key missing; nothing was sent
    #[error("payment gateway is not configured: {0} is missing")]
    Configuration(&'static str),

    /// Amount is zero or negative; nothing was sent
    #[error("payment amount must be positive, got {0}")]
    InvalidAmount(Decimal),

    /// Network, TLS or timeout failure
    #[error("gateway request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx answer
    #[error("gateway returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// 2xx answer that is not JSON (maintenance pages, proxies)
    #[error("gateway returned a non-JSON response ({content_type}): {body}")]
    NotJson { content_type: String, body: String },

    /// JSON that does not match the payment object
    #[error("gateway response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),

    /// Payment object without a required field
    #[error("gateway response has no `{0}` field")]
    MissingField(&'static str),
}

impl GatewayError {
    /// Configuration problems never fix themselves; everything else may.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Whether asking again later can give a different answer.
    ///
    /// Network failures, 5xx, 408 and 429 are retried; other 4xx answers
    /// (unknown payment, bad credentials) will not change.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Configuration(_) | Self::InvalidAmount(_) => false,
            Self::Status { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            Self::Http(_) | Self::NotJson { .. } | Self::Decode(_) | Self::MissingField(_) => true,
        }
    }
}

/// Outbound payment provider operations used by the coordinator.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates a payment with a fresh idempotency key.
    async fn create_payment(&self, request: &PaymentRequest) -> Result<CreatedPayment, GatewayError>;

    /// Fetches the current state of a payment.
    async fn get_payment_status(&self, gateway_id: &str) -> Result<PaymentReport, GatewayError>;
}
