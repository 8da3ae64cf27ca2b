//! YooKassa REST client.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{CreatedPayment, GatewayError, GatewayStatus, PaymentGateway, PaymentMetadata, PaymentReport, PaymentRequest};
use crate::core::config::GatewayConfig;

/// Header carrying the per-request idempotency key.
pub const IDEMPOTENCE_KEY_HEADER: &str = "Idempotence-Key";

/// Longest response body excerpt kept in errors and logs.
const BODY_EXCERPT_CHARS: usize = 500;

#[derive(Debug, Serialize)]
struct AmountBody {
    value: String,
    currency: String,
}

#[derive(Debug, Serialize)]
struct ConfirmationBody<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    return_url: &'a str,
}

#[derive(Debug, Serialize)]
struct CreatePaymentBody<'a> {
    amount: AmountBody,
    capture: bool,
    confirmation: ConfirmationBody<'a>,
    description: String,
    metadata: &'a PaymentMetadata,
}

#[derive(Debug, Deserialize)]
struct AmountObject {
    value: Decimal,
}

#[derive(Debug, Deserialize)]
struct ConfirmationObject {
    confirmation_url: Option<String>,
}

/// The subset of the gateway payment object we read.
#[derive(Debug, Deserialize)]
struct PaymentObject {
    id: Option<String>,
    status: Option<GatewayStatus>,
    #[serde(default)]
    paid: bool,
    amount: Option<AmountObject>,
    confirmation: Option<ConfirmationObject>,
}

/// Generates a fresh idempotency key (random UUID v4).
pub fn new_idempotence_key() -> String {
    Uuid::new_v4().to_string()
}

/// HTTP client for the payment gateway.
pub struct GatewayClient {
    http: Client,
    config: GatewayConfig,
}

impl GatewayClient {
    /// Creates a client with its own connection pool and the configured timeout.
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }

    /// Creates a client reusing an existing `reqwest::Client`.
    pub fn with_http_client(http: Client, config: GatewayConfig) -> Self {
        Self { http, config }
    }

    fn credentials(&self) -> Result<(&str, &SecretString), GatewayError> {
        let shop_id = self
            .config
            .shop_id
            .as_deref()
            .ok_or(GatewayError::Configuration("YOOKASSA_SHOP_ID"))?;
        let secret = self
            .config
            .secret_key
            .as_ref()
            .ok_or(GatewayError::Configuration("YOOKASSA_SECRET_KEY"))?;
        Ok((shop_id, secret))
    }

    async fn send_create(&self, request: &PaymentRequest) -> Result<CreatedPayment, GatewayError> {
        let (shop_id, secret) = self.credentials()?;
        if request.amount <= Decimal::ZERO {
            return Err(GatewayError::InvalidAmount(request.amount));
        }

        let idempotence_key = new_idempotence_key();
        let description = request
            .description
            .clone()
            .unwrap_or_else(|| format!("Заказ №{}", &idempotence_key[..8]));

        let body = CreatePaymentBody {
            amount: AmountBody {
                value: format!("{:.2}", request.amount.round_dp(2)),
                currency: self.config.currency.clone(),
            },
            capture: true,
            confirmation: ConfirmationBody {
                kind: "redirect",
                return_url: &self.config.return_url,
            },
            description,
            metadata: &request.metadata,
        };

        let url = format!("{}/payments", self.config.api_url);
        tracing::info!(
            url = %url,
            amount = %body.amount.value,
            idempotence_key = %idempotence_key,
            user_id = %request.metadata.user_id,
            "Creating payment"
        );

        let response = self
            .http
            .post(&url)
            .basic_auth(shop_id, Some(secret.expose_secret()))
            .header(IDEMPOTENCE_KEY_HEADER, &idempotence_key)
            .json(&body)
            .send()
            .await?;

        let payment = read_payment(response).await?;
        let gateway_id = payment.id.ok_or(GatewayError::MissingField("id"))?;
        let status = payment.status.ok_or(GatewayError::MissingField("status"))?;

        tracing::info!(gateway_id = %gateway_id, status = %status, "Payment created");

        Ok(CreatedPayment {
            gateway_id,
            status,
            confirmation_url: payment.confirmation.and_then(|c| c.confirmation_url),
        })
    }

    async fn send_status(&self, gateway_id: &str) -> Result<PaymentReport, GatewayError> {
        let (shop_id, secret) = self.credentials()?;
        let url = format!("{}/payments/{}", self.config.api_url, gateway_id);

        let response = self
            .http
            .get(&url)
            .basic_auth(shop_id, Some(secret.expose_secret()))
            .send()
            .await?;

        let payment = read_payment(response).await?;
        let id = payment.id.ok_or(GatewayError::MissingField("id"))?;
        let status = payment.status.ok_or(GatewayError::MissingField("status"))?;

        Ok(PaymentReport {
            gateway_id: id,
            status,
            paid: payment.paid,
            amount: payment.amount.map(|a| a.value).unwrap_or(Decimal::ZERO),
        })
    }
}

#[async_trait]
impl PaymentGateway for GatewayClient {
    async fn create_payment(&self, request: &PaymentRequest) -> Result<CreatedPayment, GatewayError> {
        let result = self.send_create(request).await;
        if let Err(e) = &result {
            tracing::error!(user_id = %request.metadata.user_id, "Failed to create payment: {}", e);
        }
        result
    }

    async fn get_payment_status(&self, gateway_id: &str) -> Result<PaymentReport, GatewayError> {
        let result = self.send_status(gateway_id).await;
        if let Err(e) = &result {
            tracing::error!(gateway_id = %gateway_id, "Failed to check payment status: {}", e);
        }
        result
    }
}

/// Reads a gateway answer: 2xx, JSON content type, payment object body.
async fn read_payment(response: Response) -> Result<PaymentObject, GatewayError> {
    let status = response.status();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let body = response.text().await?;

    tracing::debug!(status = status.as_u16(), content_type = %content_type, "Gateway response received");

    if !status.is_success() {
        return Err(GatewayError::Status {
            status: status.as_u16(),
            body: excerpt(&body),
        });
    }
    if !content_type.contains("application/json") {
        return Err(GatewayError::NotJson {
            content_type,
            body: excerpt(&body),
        });
    }

    Ok(serde_json::from_str(&body)?)
}

fn excerpt(body: &str) -> String {
    body.chars().take(BODY_EXCERPT_CHARS).collect()
}
