//! SQLite-backed stores.
//!
//! rusqlite is blocking, so every call takes a pooled connection inside
//! `tokio::task::spawn_blocking`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::str::FromStr;

use super::{
    CartLine, CartStore, CustomerInfo, CustomerStore, DbConnection, DbPool, NewOrder, Order, OrderItem, OrderStatus,
    OrderStore, PaymentState, Product,
};
use crate::core::error::{AppError, AppResult};

const ORDER_COLUMNS: &str = "id, user_id, full_name, phone, address, username, status, payment_status, \
                             payment_id, total_price, created_at, updated_at";

/// Order, cart and customer store on an SQLite pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn with_conn<T, F>(&self, f: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut DbConnection) -> AppResult<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut conn)
        })
        .await?
    }

    /// Creates or updates a customer profile.
    pub async fn upsert_customer(&self, user_id: i64, info: CustomerInfo) -> AppResult<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO users (telegram_id, username, full_name, phone, address, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(telegram_id) DO UPDATE SET
                     username = excluded.username,
                     full_name = excluded.full_name,
                     phone = excluded.phone,
                     address = excluded.address",
                params![
                    user_id,
                    info.username,
                    info.full_name,
                    info.phone,
                    info.address,
                    Utc::now().to_rfc3339()
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Makes sure a profile exists, refreshing only the Telegram username.
    pub async fn register_user(&self, user_id: i64, username: Option<String>) -> AppResult<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO users (telegram_id, username, created_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(telegram_id) DO UPDATE SET username = excluded.username",
                params![user_id, username, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
        .await
    }

    /// Creates or updates a catalog entry.
    pub async fn upsert_product(&self, product: Product) -> AppResult<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO products (id, name, price) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET name = excluded.name, price = excluded.price",
                params![product.id, product.name, product.price.to_string()],
            )?;
            Ok(())
        })
        .await
    }

    /// Adds `quantity` of a product to the cart, summing with what is already there.
    pub async fn add_to_cart(&self, user_id: i64, product_id: i64, quantity: u32) -> AppResult<()> {
        if quantity == 0 {
            return Err(AppError::Validation("quantity must be at least 1".to_string()));
        }
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT OR IGNORE INTO users (telegram_id, created_at) VALUES (?1, ?2)",
                params![user_id, Utc::now().to_rfc3339()],
            )?;
            tx.execute(
                "INSERT INTO cart_items (user_id, product_id, quantity) VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id, product_id) DO UPDATE SET quantity = quantity + excluded.quantity",
                params![user_id, product_id, quantity],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }
}

fn parse_decimal(raw: &str) -> AppResult<Decimal> {
    Decimal::from_str(raw).map_err(|e| AppError::CorruptRecord(format!("bad amount {raw:?}: {e}")))
}

fn parse_timestamp(raw: &str) -> AppResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AppError::CorruptRecord(format!("bad timestamp {raw:?}: {e}")))
}

fn parse_enum<T: FromStr>(raw: &str) -> AppResult<T> {
    raw.parse()
        .map_err(|_| AppError::CorruptRecord(format!("unknown status {raw:?}")))
}

/// Raw `orders` row; text columns are parsed after the query.
struct OrderRow {
    id: i64,
    user_id: i64,
    full_name: Option<String>,
    phone: String,
    address: String,
    username: Option<String>,
    status: String,
    payment_status: String,
    payment_id: Option<String>,
    total_price: String,
    created_at: String,
    updated_at: String,
}

impl OrderRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            full_name: row.get(2)?,
            phone: row.get(3)?,
            address: row.get(4)?,
            username: row.get(5)?,
            status: row.get(6)?,
            payment_status: row.get(7)?,
            payment_id: row.get(8)?,
            total_price: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }

    fn into_order(self) -> AppResult<Order> {
        Ok(Order {
            id: self.id,
            user_id: self.user_id,
            full_name: self.full_name,
            phone: self.phone,
            address: self.address,
            username: self.username,
            status: parse_enum::<OrderStatus>(&self.status)?,
            payment_status: parse_enum::<PaymentState>(&self.payment_status)?,
            payment_id: self.payment_id,
            total_price: parse_decimal(&self.total_price)?,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

fn load_order(conn: &DbConnection, gateway_id: &str) -> AppResult<Option<Order>> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE payment_id = ?1");
    conn.query_row(&sql, params![gateway_id], OrderRow::from_row)
        .optional()?
        .map(OrderRow::into_order)
        .transpose()
}

#[async_trait]
impl OrderStore for SqliteStore {
    async fn create_order(&self, order: NewOrder) -> AppResult<Order> {
        if order.items.is_empty() {
            return Err(AppError::Validation("order has no items".to_string()));
        }
        let gateway_id = order.payment_id.clone();

        self.with_conn(move |conn| {
            let now = Utc::now().to_rfc3339();
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO orders (user_id, full_name, phone, address, username, status, payment_status,
                                     payment_id, total_price, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
                params![
                    order.user_id,
                    order.customer.full_name,
                    order.customer.phone.unwrap_or_default(),
                    order.customer.address.unwrap_or_default(),
                    order.customer.username,
                    OrderStatus::New.to_string(),
                    PaymentState::Pending.to_string(),
                    order.payment_id,
                    order.total_price.to_string(),
                    now,
                ],
            )?;
            let order_id = tx.last_insert_rowid();

            {
                let mut stmt = tx.prepare(
                    "INSERT INTO order_items (order_id, product_id, product_name, price, quantity)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )?;
                for item in &order.items {
                    stmt.execute(params![
                        order_id,
                        item.product_id,
                        item.product_name,
                        item.price.to_string(),
                        item.quantity
                    ])?;
                }
            }
            tx.commit()?;

            tracing::info!(order_id, gateway_id = %gateway_id, items = order.items.len(), "Order created");

            load_order(conn, &gateway_id)?
                .ok_or_else(|| AppError::CorruptRecord(format!("order {order_id} vanished after insert")))
        })
        .await
    }

    async fn update_payment_status(&self, gateway_id: &str, state: PaymentState) -> AppResult<bool> {
        let gateway_id = gateway_id.to_string();
        self.with_conn(move |conn| {
            let now = Utc::now().to_rfc3339();
            let updated = if state == PaymentState::Succeeded {
                conn.execute(
                    "UPDATE orders SET payment_status = ?1, status = ?2, updated_at = ?3 WHERE payment_id = ?4",
                    params![state.to_string(), OrderStatus::Paid.to_string(), now, gateway_id],
                )?
            } else {
                conn.execute(
                    "UPDATE orders SET payment_status = ?1, updated_at = ?2 WHERE payment_id = ?3",
                    params![state.to_string(), now, gateway_id],
                )?
            };
            Ok(updated > 0)
        })
        .await
    }

    async fn delete_unpaid(&self, gateway_id: &str) -> AppResult<bool> {
        let gateway_id = gateway_id.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let found: Option<(i64, String)> = tx
                .query_row(
                    "SELECT id, payment_status FROM orders WHERE payment_id = ?1",
                    params![gateway_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let Some((order_id, payment_status)) = found else {
                return Ok(false);
            };
            if parse_enum::<PaymentState>(&payment_status)? == PaymentState::Succeeded {
                tracing::warn!(order_id, gateway_id = %gateway_id, "Refusing to delete a paid order");
                return Ok(false);
            }

            tx.execute("DELETE FROM order_items WHERE order_id = ?1", params![order_id])?;
            tx.execute("DELETE FROM orders WHERE id = ?1", params![order_id])?;
            tx.commit()?;

            tracing::info!(order_id, gateway_id = %gateway_id, "Unpaid order deleted");
            Ok(true)
        })
        .await
    }

    async fn get_by_gateway_id(&self, gateway_id: &str) -> AppResult<Option<Order>> {
        let gateway_id = gateway_id.to_string();
        self.with_conn(move |conn| load_order(conn, &gateway_id)).await
    }

    async fn order_items(&self, order_id: i64) -> AppResult<Vec<OrderItem>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, order_id, product_id, product_name, price, quantity
                 FROM order_items WHERE order_id = ?1 ORDER BY id",
            )?;
            let rows = stmt
                .query_map(params![order_id], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, u32>(5)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            rows.into_iter()
                .map(|(id, order_id, product_id, product_name, price, quantity)| {
                    Ok(OrderItem {
                        id,
                        order_id,
                        product_id,
                        product_name,
                        price: parse_decimal(&price)?,
                        quantity,
                    })
                })
                .collect()
        })
        .await
    }

    async fn orders_for_user(&self, user_id: i64) -> AppResult<Vec<Order>> {
        self.with_conn(move |conn| {
            let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = ?1 ORDER BY id DESC");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![user_id], OrderRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(OrderRow::into_order).collect()
        })
        .await
    }
}

#[async_trait]
impl CartStore for SqliteStore {
    async fn get_items(&self, user_id: i64) -> AppResult<Vec<CartLine>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT p.id, p.name, c.quantity, p.price
                 FROM cart_items c JOIN products p ON p.id = c.product_id
                 WHERE c.user_id = ?1 AND p.is_active = 1
                 ORDER BY p.name",
            )?;
            let rows = stmt
                .query_map(params![user_id], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, u32>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            rows.into_iter()
                .map(|(product_id, product_name, quantity, price)| {
                    Ok(CartLine {
                        product_id,
                        product_name,
                        quantity,
                        price: parse_decimal(&price)?,
                    })
                })
                .collect()
        })
        .await
    }

    async fn clear(&self, user_id: i64) -> AppResult<()> {
        self.with_conn(move |conn| {
            let removed = conn.execute("DELETE FROM cart_items WHERE user_id = ?1", params![user_id])?;
            tracing::debug!(user_id, removed, "Cart cleared");
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl CustomerStore for SqliteStore {
    async fn get_delivery_info(&self, user_id: i64) -> AppResult<Option<CustomerInfo>> {
        self.with_conn(move |conn| {
            let info = conn
                .query_row(
                    "SELECT full_name, phone, address, username FROM users WHERE telegram_id = ?1",
                    params![user_id],
                    |row| {
                        Ok(CustomerInfo {
                            full_name: row.get(0)?,
                            phone: row.get(1)?,
                            address: row.get(2)?,
                            username: row.get(3)?,
                        })
                    },
                )
                .optional()?;
            Ok(info)
        })
        .await
    }
}
