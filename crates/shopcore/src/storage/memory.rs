//! In-memory stores for tests and local runs.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use super::{
    CartLine, CartStore, CustomerInfo, CustomerStore, NewOrder, Order, OrderItem, OrderStatus, OrderStore,
    PaymentState, Product,
};
use crate::core::error::{AppError, AppResult};

#[derive(Default)]
struct MemoryState {
    customers: HashMap<i64, CustomerInfo>,
    products: HashMap<i64, Product>,
    /// user id -> product id -> quantity
    carts: HashMap<i64, BTreeMap<i64, u32>>,
    orders: BTreeMap<i64, Order>,
    items: Vec<OrderItem>,
    next_order_id: i64,
    next_item_id: i64,
}

impl MemoryState {
    fn order_by_gateway_id(&self, gateway_id: &str) -> Option<&Order> {
        self.orders
            .values()
            .find(|o| o.payment_id.as_deref() == Some(gateway_id))
    }
}

/// Order, cart and customer store kept in process memory.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert_customer(&self, user_id: i64, info: CustomerInfo) {
        self.state.write().await.customers.insert(user_id, info);
    }

    pub async fn upsert_product(&self, product: Product) {
        self.state.write().await.products.insert(product.id, product);
    }

    /// Adds `quantity` of a product to the cart, summing with what is already there.
    pub async fn add_to_cart(&self, user_id: i64, product_id: i64, quantity: u32) -> AppResult<()> {
        if quantity == 0 {
            return Err(AppError::Validation("quantity must be at least 1".to_string()));
        }
        let mut state = self.state.write().await;
        if !state.products.contains_key(&product_id) {
            return Err(AppError::Validation(format!("unknown product {product_id}")));
        }
        *state
            .carts
            .entry(user_id)
            .or_default()
            .entry(product_id)
            .or_insert(0) += quantity;
        Ok(())
    }

    /// Number of stored order items across all orders.
    pub async fn order_item_count(&self) -> usize {
        self.state.read().await.items.len()
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn create_order(&self, order: NewOrder) -> AppResult<Order> {
        if order.items.is_empty() {
            return Err(AppError::Validation("order has no items".to_string()));
        }
        let mut state = self.state.write().await;
        if state.order_by_gateway_id(&order.payment_id).is_some() {
            return Err(AppError::Validation(format!(
                "order for payment {} already exists",
                order.payment_id
            )));
        }

        state.next_order_id += 1;
        let order_id = state.next_order_id;
        let now = Utc::now();

        for item in order.items {
            state.next_item_id += 1;
            let id = state.next_item_id;
            state.items.push(OrderItem {
                id,
                order_id,
                product_id: item.product_id,
                product_name: item.product_name,
                price: item.price,
                quantity: item.quantity,
            });
        }

        let created = Order {
            id: order_id,
            user_id: order.user_id,
            full_name: order.customer.full_name,
            phone: order.customer.phone.unwrap_or_default(),
            address: order.customer.address.unwrap_or_default(),
            username: order.customer.username,
            status: OrderStatus::New,
            payment_status: PaymentState::Pending,
            payment_id: Some(order.payment_id),
            total_price: order.total_price,
            created_at: now,
            updated_at: now,
        };
        state.orders.insert(order_id, created.clone());
        Ok(created)
    }

    async fn update_payment_status(&self, gateway_id: &str, payment_state: PaymentState) -> AppResult<bool> {
        let mut state = self.state.write().await;
        let Some(order) = state
            .orders
            .values_mut()
            .find(|o| o.payment_id.as_deref() == Some(gateway_id))
        else {
            return Ok(false);
        };

        order.payment_status = payment_state;
        if payment_state == PaymentState::Succeeded {
            order.status = OrderStatus::Paid;
        }
        order.updated_at = Utc::now();
        Ok(true)
    }

    async fn delete_unpaid(&self, gateway_id: &str) -> AppResult<bool> {
        let mut state = self.state.write().await;
        let Some(order) = state.order_by_gateway_id(gateway_id) else {
            return Ok(false);
        };
        if order.payment_status == PaymentState::Succeeded {
            tracing::warn!(order_id = order.id, gateway_id, "Refusing to delete a paid order");
            return Ok(false);
        }

        let order_id = order.id;
        state.orders.remove(&order_id);
        state.items.retain(|item| item.order_id != order_id);
        Ok(true)
    }

    async fn get_by_gateway_id(&self, gateway_id: &str) -> AppResult<Option<Order>> {
        Ok(self.state.read().await.order_by_gateway_id(gateway_id).cloned())
    }

    async fn order_items(&self, order_id: i64) -> AppResult<Vec<OrderItem>> {
        let state = self.state.read().await;
        Ok(state
            .items
            .iter()
            .filter(|item| item.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn orders_for_user(&self, user_id: i64) -> AppResult<Vec<Order>> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .values()
            .rev()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CartStore for MemoryStore {
    async fn get_items(&self, user_id: i64) -> AppResult<Vec<CartLine>> {
        let state = self.state.read().await;
        let Some(cart) = state.carts.get(&user_id) else {
            return Ok(Vec::new());
        };

        let mut lines: Vec<CartLine> = cart
            .iter()
            .filter_map(|(product_id, quantity)| {
                state.products.get(product_id).map(|product| CartLine {
                    product_id: product.id,
                    product_name: product.name.clone(),
                    quantity: *quantity,
                    price: product.price,
                })
            })
            .collect();
        lines.sort_by(|a, b| a.product_name.cmp(&b.product_name));
        Ok(lines)
    }

    async fn clear(&self, user_id: i64) -> AppResult<()> {
        self.state.write().await.carts.remove(&user_id);
        Ok(())
    }
}

#[async_trait]
impl CustomerStore for MemoryStore {
    async fn get_delivery_info(&self, user_id: i64) -> AppResult<Option<CustomerInfo>> {
        Ok(self.state.read().await.customers.get(&user_id).cloned())
    }
}
