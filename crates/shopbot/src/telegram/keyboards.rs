//! Inline keyboards and callback data.

use shopcore::payment::Keyboard;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

pub const CHECKOUT: &str = "checkout";
pub const CHECKOUT_EDIT: &str = "checkout_edit";
pub const CHECKOUT_CANCEL: &str = "checkout_cancel";
pub const CHECKOUT_PAYMENT: &str = "checkout_payment";
pub const CANCEL_PAYMENT_PREFIX: &str = "cancel_payment_";
pub const CART: &str = "cart";
pub const MY_ORDERS: &str = "my_orders";
pub const START: &str = "start";

/// What an inline button asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    /// Review delivery details before paying
    StartCheckout,
    EditDelivery,
    CancelDelivery,
    /// Create the payment
    Checkout,
    CancelPayment(String),
    Cart,
    MyOrders,
    Start,
    Unknown,
}

impl CallbackAction {
    pub fn parse(data: &str) -> Self {
        match data {
            CHECKOUT => Self::StartCheckout,
            CHECKOUT_EDIT => Self::EditDelivery,
            CHECKOUT_CANCEL => Self::CancelDelivery,
            CHECKOUT_PAYMENT => Self::Checkout,
            CART => Self::Cart,
            MY_ORDERS => Self::MyOrders,
            START => Self::Start,
            _ => match data.strip_prefix(CANCEL_PAYMENT_PREFIX) {
                Some(payment_id) if !payment_id.is_empty() => Self::CancelPayment(payment_id.to_string()),
                _ => Self::Unknown,
            },
        }
    }
}

pub fn main_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("🛒 Корзина", CART),
        InlineKeyboardButton::callback("📦 Мои заказы", MY_ORDERS),
    ]])
}

/// Under the delivery details summary.
pub fn delivery_confirm() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback("✏️ Изменить данные", CHECKOUT_EDIT)],
        vec![InlineKeyboardButton::callback("💳 Перейти к оплате", CHECKOUT_PAYMENT)],
        vec![InlineKeyboardButton::callback("🔙 Вернуться в корзину", CART)],
    ])
}

/// Under every delivery question.
pub fn delivery_input() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback("❌ Отменить", CHECKOUT_CANCEL)],
        vec![InlineKeyboardButton::callback("🔙 Вернуться в корзину", CART)],
    ])
}

/// Renders a payment-flow keyboard; `None` means no keyboard.
pub fn render(keyboard: &Keyboard) -> Result<Option<InlineKeyboardMarkup>, url::ParseError> {
    let markup = match keyboard {
        Keyboard::PaymentLink { url, payment_id } => InlineKeyboardMarkup::new(vec![
            vec![InlineKeyboardButton::url("💳 Перейти к оплате", url::Url::parse(url)?)],
            vec![InlineKeyboardButton::callback(
                "❌ Отменить платеж",
                format!("{CANCEL_PAYMENT_PREFIX}{payment_id}"),
            )],
        ]),
        Keyboard::AfterPayment => InlineKeyboardMarkup::new(vec![
            vec![InlineKeyboardButton::callback("🏠 Вернуться в меню", START)],
            vec![InlineKeyboardButton::callback("📋 Мои заказы", MY_ORDERS)],
        ]),
        Keyboard::BackToCart => {
            InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback("🛒 Вернуться в корзину", CART)]])
        }
        Keyboard::CartCheckout => InlineKeyboardMarkup::new(vec![
            vec![InlineKeyboardButton::callback("📝 Оформить заказ", CHECKOUT)],
            vec![InlineKeyboardButton::callback("🔙 Назад", START)],
        ]),
        Keyboard::None => return Ok(None),
    };
    Ok(Some(markup))
}
