//! Customer-facing texts of the payment flow.

use rust_decimal::Decimal;

use crate::core::utils::{format_amount, format_price, CURRENCY_SUFFIX};
use crate::gateway::GatewayStatus;

pub const MISSING_DELIVERY_INFO: &str = "Для оформления заказа необходимо указать адрес и телефон";
pub const EMPTY_CART: &str = "🛒 Корзина пуста!";
pub const PAYMENT_UNAVAILABLE: &str = "Не удалось создать платеж. Попробуйте позже.";
pub const INTERNAL_ERROR: &str = "❌ Произошла ошибка. Попробуйте позже.";
pub const PAYMENT_CANCELLED: &str = "Платеж отменен.";

pub const PAYMENT_EXPIRED: &str =
    "⏱ Время ожидания оплаты истекло.\n\nЗаказ был отменен. Вы можете создать новый заказ в любое время.";

/// Prompt shown with the pay link.
pub fn payment_prompt(amount: Decimal) -> String {
    format!(
        "💳 Оплата заказа\n\n\
         Сумма к оплате: {}\n\n\
         Для оплаты нажмите на кнопку ниже. После оплаты статус заказа обновится автоматически.",
        format_price(amount)
    )
}

pub fn payment_succeeded(order_id: i64, amount: Decimal) -> String {
    format!(
        "✅ Оплата прошла успешно!\n\n\
         Номер заказа: {order_id}\n\
         Сумма: {} {CURRENCY_SUFFIX}\n\n\
         Спасибо за покупку! Мы свяжемся с вами в ближайшее время.",
        format_amount(amount)
    )
}

pub fn payment_failed(status: &GatewayStatus) -> String {
    format!("❌ Платеж не был завершен.\n\nСтатус: {status}\n\nВы можете повторить попытку оплаты.")
}
