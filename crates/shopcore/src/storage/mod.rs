//! Storage layer: orders, carts and customer profiles
//!
//! The payment flow talks to storage through three narrow traits:
//! - `OrderStore`: orders and their frozen line items
//! - `CartStore`: the live cart joined with live catalog prices
//! - `CustomerStore`: delivery details from the customer profile
//!
//! `SqliteStore` implements them on top of an r2d2 SQLite pool,
//! `MemoryStore` keeps everything in process memory.

pub mod db;
pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use strum::{Display, EnumString};

use crate::core::error::AppResult;

pub use db::{create_pool, get_connection, DbConnection, DbPool};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Order lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    New,
    Paid,
    Cancelled,
}

/// Payment state of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum PaymentState {
    Pending,
    Succeeded,
    Failed,
    Refunded,
}

/// A persisted order.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub full_name: Option<String>,
    pub phone: String,
    pub address: String,
    pub username: Option<String>,
    pub status: OrderStatus,
    pub payment_status: PaymentState,
    /// Gateway payment reference
    pub payment_id: Option<String>,
    pub total_price: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A line of an order, frozen at checkout time.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub price: Decimal,
    pub quantity: u32,
}

/// Line item to be written together with a new order.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrderItem {
    pub product_id: i64,
    pub product_name: String,
    pub price: Decimal,
    pub quantity: u32,
}

impl From<&CartLine> for NewOrderItem {
    fn from(line: &CartLine) -> Self {
        Self {
            product_id: line.product_id,
            product_name: line.product_name.clone(),
            price: line.price,
            quantity: line.quantity,
        }
    }
}

/// Everything needed to persist an order in one transaction.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: i64,
    pub customer: CustomerInfo,
    pub payment_id: String,
    pub total_price: Decimal,
    pub items: Vec<NewOrderItem>,
}

/// One cart row joined with the current catalog price.
#[derive(Debug, Clone, PartialEq)]
pub struct CartLine {
    pub product_id: i64,
    pub product_name: String,
    pub quantity: u32,
    pub price: Decimal,
}

impl CartLine {
    pub fn subtotal(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

/// Sum of `quantity × price` over the cart.
pub fn cart_total(lines: &[CartLine]) -> Decimal {
    lines.iter().map(CartLine::subtotal).sum()
}

/// Delivery details from the customer profile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomerInfo {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub username: Option<String>,
}

impl CustomerInfo {
    /// Address and phone are both present and non-blank.
    pub fn has_delivery_details(&self) -> bool {
        let filled = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.trim().is_empty());
        filled(&self.address) && filled(&self.phone)
    }
}

/// Catalog entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub price: Decimal,
}

/// Durable orders and order items.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Writes the order and all its items atomically.
    async fn create_order(&self, order: NewOrder) -> AppResult<Order>;

    /// Sets the payment state of the order with this gateway id.
    ///
    /// `Succeeded` also moves the order to `paid`. Returns `false` when no
    /// such order exists.
    async fn update_payment_status(&self, gateway_id: &str, state: PaymentState) -> AppResult<bool>;

    /// Deletes the order and its items unless the payment already succeeded.
    ///
    /// Returns `true` when something was deleted.
    async fn delete_unpaid(&self, gateway_id: &str) -> AppResult<bool>;

    async fn get_by_gateway_id(&self, gateway_id: &str) -> AppResult<Option<Order>>;

    async fn order_items(&self, order_id: i64) -> AppResult<Vec<OrderItem>>;

    /// Orders of a user, newest first.
    async fn orders_for_user(&self, user_id: i64) -> AppResult<Vec<Order>>;
}

/// Read access to carts plus clearing after a successful payment.
#[async_trait]
pub trait CartStore: Send + Sync {
    async fn get_items(&self, user_id: i64) -> AppResult<Vec<CartLine>>;

    async fn clear(&self, user_id: i64) -> AppResult<()>;
}

#[async_trait]
pub trait CustomerStore: Send + Sync {
    async fn get_delivery_info(&self, user_id: i64) -> AppResult<Option<CustomerInfo>>;
}
