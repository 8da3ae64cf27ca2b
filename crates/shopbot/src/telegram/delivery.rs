//! Delivery details dialogue
//!
//! Checkout needs a phone and an address on the customer's profile. When they
//! are missing (or the customer wants to change them) the bot asks for the
//! full name, the phone and the address, one message each. The state lives in
//! teloxide's in-memory dialogue storage; only the finished details reach the
//! database.

use shopcore::core::utils::format_phone_number;
use shopcore::storage::CustomerInfo;
use teloxide::dispatching::dialogue::{Dialogue, InMemStorage};

pub type DeliveryStorage = InMemStorage<DeliveryState>;
pub type DeliveryDialogue = Dialogue<DeliveryState, DeliveryStorage>;

pub const ASK_FULL_NAME: &str = "Пожалуйста, введите ваше ФИО:";
pub const ASK_PHONE: &str = "Пожалуйста, введите ваш номер телефона:";
pub const ASK_ADDRESS: &str = "Пожалуйста, введите адрес доставки:";
pub const EMPTY_FULL_NAME: &str = "ФИО не может быть пустым. Пожалуйста, введите ваше ФИО:";
pub const INVALID_PHONE: &str = "Некорректный номер телефона. Пожалуйста, введите номер в формате +7XXXXXXXXXX:";
pub const EMPTY_ADDRESS: &str = "Адрес не может быть пустым. Пожалуйста, введите адрес доставки:";

/// Where the customer is in the delivery questionnaire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DeliveryState {
    #[default]
    Idle,
    FullName,
    Phone {
        full_name: String,
    },
    Address {
        full_name: String,
        phone: String,
    },
}

impl DeliveryState {
    pub fn is_collecting(&self) -> bool {
        !matches!(self, Self::Idle)
    }
}

/// Answers collected by the dialogue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryDetails {
    pub full_name: String,
    pub phone: String,
    pub address: String,
}

impl DeliveryDetails {
    pub fn into_customer(self, username: Option<String>) -> CustomerInfo {
        CustomerInfo {
            full_name: Some(self.full_name),
            phone: Some(self.phone),
            address: Some(self.address),
            username,
        }
    }
}

/// What to do with one message of the customer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStep {
    /// Accepted; move to `state` and ask `prompt`
    Next { state: DeliveryState, prompt: &'static str },
    /// Rejected; ask again
    Retry(&'static str),
    Done(DeliveryDetails),
}

/// Applies the customer's `input` to the current state.
pub fn advance(state: &DeliveryState, input: &str) -> DeliveryStep {
    let input = input.trim();

    match state {
        DeliveryState::Idle => DeliveryStep::Next {
            state: DeliveryState::FullName,
            prompt: ASK_FULL_NAME,
        },
        DeliveryState::FullName if input.is_empty() => DeliveryStep::Retry(EMPTY_FULL_NAME),
        DeliveryState::FullName => DeliveryStep::Next {
            state: DeliveryState::Phone {
                full_name: input.to_string(),
            },
            prompt: ASK_PHONE,
        },
        DeliveryState::Phone { full_name } => match format_phone_number(input) {
            Some(phone) => DeliveryStep::Next {
                state: DeliveryState::Address {
                    full_name: full_name.clone(),
                    phone,
                },
                prompt: ASK_ADDRESS,
            },
            None => DeliveryStep::Retry(INVALID_PHONE),
        },
        DeliveryState::Address { .. } if input.is_empty() => DeliveryStep::Retry(EMPTY_ADDRESS),
        DeliveryState::Address { full_name, phone } => DeliveryStep::Done(DeliveryDetails {
            full_name: full_name.clone(),
            phone: phone.clone(),
            address: input.to_string(),
        }),
    }
}
