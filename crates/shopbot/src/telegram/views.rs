//! Texts for the cart, order list and menu screens.

use shopcore::core::utils::format_price;
use rust_decimal::Decimal;
use shopcore::storage::{cart_total, CartLine, CustomerInfo, Order, OrderStatus, PaymentState};

pub const EMPTY_CART: &str = "🛒 Ваша корзина пуста. Добавьте товары из каталога.";
pub const CHECKOUT_EMPTY_CART: &str = "Корзина пуста, невозможно оформить заказ";
pub const NO_ORDERS: &str = "📦 У вас пока нет заказов.\n\nВы можете сделать заказ в нашем каталоге товаров.";

pub fn greeting(full_name: &str) -> String {
    format!("👋 Привет, {full_name}!\n\nДобро пожаловать в наш магазин")
}

pub fn cart(lines: &[CartLine]) -> String {
    if lines.is_empty() {
        return EMPTY_CART.to_string();
    }

    let mut text = String::from("🛒 Ваша корзина:\n\n");
    for (i, line) in lines.iter().enumerate() {
        text.push_str(&format!(
            "{}. {}\n   Цена: {} × {} шт. = {}\n\n",
            i + 1,
            line.product_name,
            format_price(line.price),
            line.quantity,
            format_price(line.subtotal())
        ));
    }
    text.push_str(&format!("Общая стоимость: {}", format_price(cart_total(lines))));
    text
}

/// Delivery details and the amount to pay, shown before the payment is created.
pub fn delivery_summary(customer: &CustomerInfo, total: Decimal) -> String {
    let field = |value: &Option<String>| value.clone().unwrap_or_default();
    format!(
        "📦 Данные доставки:\n\n👤 ФИО: {}\n📱 Телефон: {}\n🏠 Адрес: {}\n\n💰 Общая стоимость: {}",
        field(&customer.full_name),
        field(&customer.phone),
        field(&customer.address),
        format_price(total)
    )
}

fn status_text(order: &Order) -> &'static str {
    match (order.status, order.payment_status) {
        (OrderStatus::Paid, _) => "Оплачен",
        (OrderStatus::Cancelled, _) => "Отменен",
        (OrderStatus::New, PaymentState::Pending) => "Ожидает оплаты",
        (OrderStatus::New, PaymentState::Failed) => "Оплата не прошла",
        (OrderStatus::New, _) => "Новый",
    }
}

pub fn orders(orders: &[Order]) -> String {
    if orders.is_empty() {
        return NO_ORDERS.to_string();
    }

    let mut text = String::from("📋 Ваши заказы:\n\n");
    for order in orders {
        text.push_str(&format!(
            "Заказ #{} - {} - {} ({})\n",
            order.id,
            status_text(order),
            format_price(order.total_price),
            order.created_at.format("%d.%m.%Y %H:%M")
        ));
    }
    text
}
