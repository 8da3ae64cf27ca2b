//! Common test utilities
//!
//! Scripted gateway, recording notifier and a seeded in-memory shop.
#![allow(dead_code, clippy::unwrap_used)]

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use shopcore::config::PollingConfig;
use shopcore::gateway::{CreatedPayment, GatewayError, GatewayStatus, PaymentGateway, PaymentReport, PaymentRequest};
use shopcore::payment::{Keyboard, MessageRef, Notifier, NotifyError, PaymentCoordinator};
use shopcore::core::metrics::PaymentMetrics;
use shopcore::storage::{CustomerInfo, MemoryStore, NewOrder, Order, OrderItem, OrderStore, PaymentState, Product};
use shopcore::{AppError, AppResult};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const USER_ID: i64 = 7;
pub const MESSAGE: MessageRef = MessageRef {
    chat_id: 7,
    message_id: 100,
};

/// One scripted answer to `get_payment_status`.
#[derive(Debug, Clone)]
pub enum Step {
    Status(&'static str),
    /// HTTP 500
    Error,
    /// Any other HTTP error status
    Http(u16),
    NotConfigured,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateMode {
    Ok,
    NotConfigured,
    Unavailable,
    NoConfirmationUrl,
}

/// Gateway driven by per-payment scripts.
///
/// Payments are numbered `pay_1`, `pay_2`, ... When a script runs out the
/// payment stays `pending`.
pub struct MockGateway {
    create_mode: Mutex<CreateMode>,
    created: Mutex<Vec<PaymentRequest>>,
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    status_calls: Mutex<HashMap<String, usize>>,
}

impl MockGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            create_mode: Mutex::new(CreateMode::Ok),
            created: Mutex::new(Vec::new()),
            scripts: Mutex::new(HashMap::new()),
            status_calls: Mutex::new(HashMap::new()),
        })
    }

    pub fn set_create_mode(&self, mode: CreateMode) {
        *self.create_mode.lock().unwrap() = mode;
    }

    pub fn script(&self, gateway_id: &str, steps: impl IntoIterator<Item = Step>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(gateway_id.to_string(), steps.into_iter().collect());
    }

    pub fn created(&self) -> Vec<PaymentRequest> {
        self.created.lock().unwrap().clone()
    }

    pub fn status_calls(&self, gateway_id: &str) -> usize {
        self.status_calls.lock().unwrap().get(gateway_id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_payment(&self, request: &PaymentRequest) -> Result<CreatedPayment, GatewayError> {
        let mode = *self.create_mode.lock().unwrap();
        match mode {
            CreateMode::NotConfigured => return Err(GatewayError::Configuration("YOOKASSA_SHOP_ID")),
            CreateMode::Unavailable => {
                return Err(GatewayError::Status {
                    status: 503,
                    body: "unavailable".to_string(),
                })
            }
            CreateMode::Ok | CreateMode::NoConfirmationUrl => {}
        }

        let mut created = self.created.lock().unwrap();
        created.push(request.clone());
        let gateway_id = format!("pay_{}", created.len());

        Ok(CreatedPayment {
            confirmation_url: (mode == CreateMode::Ok).then(|| format!("https://pay.example/{gateway_id}")),
            gateway_id,
            status: GatewayStatus::Pending,
        })
    }

    async fn get_payment_status(&self, gateway_id: &str) -> Result<PaymentReport, GatewayError> {
        *self
            .status_calls
            .lock()
            .unwrap()
            .entry(gateway_id.to_string())
            .or_insert(0) += 1;

        let step = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(gateway_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Step::Status("pending"));

        match step {
            Step::Status(status) => Ok(PaymentReport {
                gateway_id: gateway_id.to_string(),
                status: GatewayStatus::from(status),
                paid: status == "succeeded",
                amount: Decimal::ZERO,
            }),
            Step::Error => Err(GatewayError::Status {
                status: 500,
                body: "internal error".to_string(),
            }),
            Step::Http(status) => Err(GatewayError::Status {
                status,
                body: "{\"type\":\"error\"}".to_string(),
            }),
            Step::NotConfigured => Err(GatewayError::Configuration("YOOKASSA_SECRET_KEY")),
        }
    }
}

/// Records every edit instead of sending it.
#[derive(Default)]
pub struct RecordingNotifier {
    edits: Mutex<Vec<(MessageRef, String, Keyboard)>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn edits(&self) -> Vec<(MessageRef, String, Keyboard)> {
        self.edits.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.edits().into_iter().map(|(_, text, _)| text).collect()
    }

    pub fn last(&self) -> Option<(MessageRef, String, Keyboard)> {
        self.edits.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn edit_message(&self, target: MessageRef, text: &str, keyboard: Keyboard) -> Result<(), NotifyError> {
        self.edits.lock().unwrap().push((target, text.to_string(), keyboard));
        Ok(())
    }
}

pub fn delivery_info() -> CustomerInfo {
    CustomerInfo {
        full_name: Some("Иван Петров".to_string()),
        phone: Some("+79990000000".to_string()),
        address: Some("Москва, ул. Ленина, 1".to_string()),
        username: Some("ivan".to_string()),
    }
}

/// A shop with one product priced 500.00, a customer with delivery details
/// and two of that product in the cart.
pub struct Shop {
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<MockGateway>,
    pub notifier: Arc<RecordingNotifier>,
    pub coordinator: PaymentCoordinator,
}

impl Shop {
    pub async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_product(Product {
                id: 1,
                name: "Чай улун".to_string(),
                price: dec!(500.00),
            })
            .await;
        store.upsert_customer(USER_ID, delivery_info()).await;
        store.add_to_cart(USER_ID, 1, 2).await.unwrap();

        let gateway = MockGateway::new();
        let notifier = RecordingNotifier::new();
        let coordinator = PaymentCoordinator::builder(gateway.clone(), notifier.clone())
            .orders(store.clone())
            .carts(store.clone())
            .customers(store.clone())
            .polling(PollingConfig::default())
            .build()
            .unwrap();

        Self {
            store,
            gateway,
            notifier,
            coordinator,
        }
    }

    /// A second coordinator over the same shop with its own order store and metrics.
    pub fn coordinator_with(&self, orders: Arc<dyn OrderStore>, metrics: PaymentMetrics) -> PaymentCoordinator {
        PaymentCoordinator::builder(self.gateway.clone(), self.notifier.clone())
            .orders(orders)
            .carts(self.store.clone())
            .customers(self.store.clone())
            .metrics(metrics)
            .build()
            .unwrap()
    }

    pub async fn wait_for_idle(&self, user_id: i64) {
        wait_until_idle(&self.coordinator, user_id).await;
    }
}

/// Sleeps in one-second steps (virtual time) until the user has no running
/// session.
pub async fn wait_until_idle(coordinator: &PaymentCoordinator, user_id: i64) {
    for _ in 0..2_000 {
        if !coordinator.has_active_session(user_id) {
            return;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    panic!("payment session of user {user_id} never finished");
}

/// Order store whose payment status writes always fail.
pub struct BrokenStatusWrites {
    inner: Arc<MemoryStore>,
}

impl BrokenStatusWrites {
    pub fn new(inner: Arc<MemoryStore>) -> Arc<Self> {
        Arc::new(Self { inner })
    }
}

#[async_trait]
impl OrderStore for BrokenStatusWrites {
    async fn create_order(&self, order: NewOrder) -> AppResult<Order> {
        self.inner.create_order(order).await
    }

    async fn update_payment_status(&self, _gateway_id: &str, _state: PaymentState) -> AppResult<bool> {
        Err(AppError::Anyhow(anyhow::anyhow!("disk I/O error")))
    }

    async fn delete_unpaid(&self, gateway_id: &str) -> AppResult<bool> {
        self.inner.delete_unpaid(gateway_id).await
    }

    async fn get_by_gateway_id(&self, gateway_id: &str) -> AppResult<Option<Order>> {
        self.inner.get_by_gateway_id(gateway_id).await
    }

    async fn order_items(&self, order_id: i64) -> AppResult<Vec<OrderItem>> {
        self.inner.order_items(order_id).await
    }

    async fn orders_for_user(&self, user_id: i64) -> AppResult<Vec<Order>> {
        self.inner.orders_for_user(user_id).await
    }
}
