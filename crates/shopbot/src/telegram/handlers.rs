//! Dispatcher schema and handlers

use std::num::TryFromIntError;
use std::sync::Arc;

use shopcore::payment::{messages, Keyboard, MessageRef, Notifier, PaymentCoordinator};
use shopcore::storage::{cart_total, CartStore, CustomerStore, OrderStore, SqliteStore};
use teloxide::dispatching::{HandlerExt, UpdateFilterExt, UpdateHandler};
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardMarkup, MaybeInaccessibleMessage, Message, MessageId, User, UserId};

use super::bot::Command;
use super::delivery::{self, DeliveryDialogue, DeliveryState, DeliveryStep, DeliveryStorage};
use super::keyboards::{self, CallbackAction};
use super::views;

/// Error type for handlers
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Dependencies required by handlers
#[derive(Clone)]
pub struct HandlerDeps {
    pub coordinator: PaymentCoordinator,
    pub store: Arc<SqliteStore>,
    pub notifier: Arc<dyn Notifier>,
}

impl HandlerDeps {
    pub fn new(coordinator: PaymentCoordinator, store: Arc<SqliteStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            coordinator,
            store,
            notifier,
        }
    }
}

/// Creates the dispatcher schema for the bot.
///
/// Both branches enter the delivery dialogue, so the dispatcher needs a
/// [`DeliveryStorage`] among its dependencies.
pub fn schema(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    let deps_messages = deps.clone();
    let deps_callback = deps;

    dptree::entry()
        .branch(message_handler(deps_messages))
        .branch(callback_handler(deps_callback))
}

fn telegram_user_id(user: &User) -> Result<i64, TryFromIntError> {
    checked_user_id(user.id)
}

/// Telegram ids are unsigned; the database stores them as INTEGER.
fn checked_user_id(id: UserId) -> Result<i64, TryFromIntError> {
    i64::try_from(id.0)
}

/// Commands first; plain text only while delivery details are being collected
fn message_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    let deps_commands = deps.clone();
    let deps_delivery = deps;

    Update::filter_message()
        .enter_dialogue::<Message, DeliveryStorage, DeliveryState>()
        .branch(dptree::entry().filter_command::<Command>().endpoint(
            move |bot: Bot, msg: Message, cmd: Command, dialogue: DeliveryDialogue, state: DeliveryState| {
                let deps = deps_commands.clone();
                async move { handle_command(&bot, &msg, cmd, &dialogue, &state, &deps).await }
            },
        ))
        .branch(dptree::filter(|state: DeliveryState| state.is_collecting()).endpoint(
            move |bot: Bot, msg: Message, dialogue: DeliveryDialogue, state: DeliveryState| {
                let deps = deps_delivery.clone();
                async move { handle_delivery_input(&bot, &msg, &dialogue, &state, &deps).await }
            },
        ))
}

/// Handler for inline keyboard buttons
fn callback_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_callback_query()
        .enter_dialogue::<CallbackQuery, DeliveryStorage, DeliveryState>()
        .endpoint(
            move |bot: Bot, q: CallbackQuery, dialogue: DeliveryDialogue, state: DeliveryState| {
                let deps = deps.clone();
                async move { handle_callback(&bot, &q, &dialogue, &state, &deps).await }
            },
        )
}

/// Leaves the questionnaire; the in-memory storage errors on exiting a dialogue it never saw.
async fn leave_dialogue(dialogue: &DeliveryDialogue, state: &DeliveryState) -> Result<(), HandlerError> {
    if state.is_collecting() {
        dialogue.exit().await?;
    }
    Ok(())
}

async fn handle_command(
    bot: &Bot,
    msg: &Message,
    cmd: Command,
    dialogue: &DeliveryDialogue,
    state: &DeliveryState,
    deps: &HandlerDeps,
) -> Result<(), HandlerError> {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    let user_id = telegram_user_id(user)?;
    tracing::info!(user_id, command = ?cmd, "Received command");
    leave_dialogue(dialogue, state).await?;

    match cmd {
        Command::Start => {
            deps.store.register_user(user_id, user.username.clone()).await?;
            bot.send_message(msg.chat.id, views::greeting(&user.full_name()))
                .reply_markup(keyboards::main_menu())
                .await?;
        }
        Command::Cart => {
            let lines = deps.store.get_items(user_id).await?;
            let mut request = bot.send_message(msg.chat.id, views::cart(&lines));
            if !lines.is_empty() {
                if let Some(markup) = keyboards::render(&Keyboard::CartCheckout)? {
                    request = request.reply_markup(markup);
                }
            }
            request.await?;
        }
    }
    Ok(())
}

/// One answer of the delivery questionnaire.
async fn handle_delivery_input(
    bot: &Bot,
    msg: &Message,
    dialogue: &DeliveryDialogue,
    state: &DeliveryState,
    deps: &HandlerDeps,
) -> Result<(), HandlerError> {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    let user_id = telegram_user_id(user)?;

    match delivery::advance(state, msg.text().unwrap_or_default()) {
        DeliveryStep::Next { state, prompt } => {
            dialogue.update(state).await?;
            bot.send_message(msg.chat.id, prompt)
                .reply_markup(keyboards::delivery_input())
                .await?;
        }
        DeliveryStep::Retry(prompt) => {
            bot.send_message(msg.chat.id, prompt)
                .reply_markup(keyboards::delivery_input())
                .await?;
        }
        DeliveryStep::Done(details) => {
            let customer = details.into_customer(user.username.clone());
            deps.store.upsert_customer(user_id, customer.clone()).await?;
            dialogue.exit().await?;
            tracing::info!(user_id, "Delivery details saved");

            let lines = deps.store.get_items(user_id).await?;
            bot.send_message(msg.chat.id, views::delivery_summary(&customer, cart_total(&lines)))
                .reply_markup(keyboards::delivery_confirm())
                .await?;
        }
    }
    Ok(())
}

async fn handle_callback(
    bot: &Bot,
    q: &CallbackQuery,
    dialogue: &DeliveryDialogue,
    state: &DeliveryState,
    deps: &HandlerDeps,
) -> Result<(), HandlerError> {
    let user_id = telegram_user_id(&q.from)?;
    let action = CallbackAction::parse(q.data.as_deref().unwrap_or_default());
    let Some(message) = q.message.as_ref().map(message_ref) else {
        bot.answer_callback_query(q.id.clone()).await?;
        return Ok(());
    };
    tracing::debug!(user_id, action = ?action, "Callback received");

    match action {
        CallbackAction::StartCheckout => {
            let lines = deps.store.get_items(user_id).await?;
            if lines.is_empty() {
                bot.answer_callback_query(q.id.clone())
                    .text(views::CHECKOUT_EMPTY_CART)
                    .show_alert(true)
                    .await?;
                return Ok(());
            }
            bot.answer_callback_query(q.id.clone()).await?;

            match deps.store.get_delivery_info(user_id).await? {
                Some(customer) if customer.has_delivery_details() => {
                    leave_dialogue(dialogue, state).await?;
                    let summary = views::delivery_summary(&customer, cart_total(&lines));
                    edit(bot, message, &summary, keyboards::delivery_confirm()).await?;
                }
                _ => ask_full_name(bot, dialogue, message).await?,
            }
        }
        CallbackAction::EditDelivery => {
            bot.answer_callback_query(q.id.clone()).await?;
            ask_full_name(bot, dialogue, message).await?;
        }
        CallbackAction::CancelDelivery => {
            bot.answer_callback_query(q.id.clone()).await?;
            leave_dialogue(dialogue, state).await?;
            show_cart(deps, user_id, message).await?;
        }
        CallbackAction::Checkout => {
            leave_dialogue(dialogue, state).await?;
            let mut answer = bot.answer_callback_query(q.id.clone());
            if let Err(e) = deps.coordinator.checkout(user_id, message).await {
                tracing::warn!(user_id, "Checkout failed: {}", e);
                answer = answer.text(e.user_message()).show_alert(true);
            }
            answer.await?;
        }
        CallbackAction::CancelPayment(payment_id) => {
            deps.coordinator.cancel(user_id, &payment_id).await?;
            bot.answer_callback_query(q.id.clone())
                .text(messages::PAYMENT_CANCELLED)
                .show_alert(true)
                .await?;
            show_cart(deps, user_id, message).await?;
        }
        CallbackAction::Cart => {
            bot.answer_callback_query(q.id.clone()).await?;
            leave_dialogue(dialogue, state).await?;
            show_cart(deps, user_id, message).await?;
        }
        CallbackAction::MyOrders => {
            bot.answer_callback_query(q.id.clone()).await?;
            leave_dialogue(dialogue, state).await?;
            let orders = deps.store.orders_for_user(user_id).await?;
            edit(bot, message, &views::orders(&orders), keyboards::main_menu()).await?;
        }
        CallbackAction::Start => {
            bot.answer_callback_query(q.id.clone()).await?;
            leave_dialogue(dialogue, state).await?;
            edit(bot, message, &views::greeting(&q.from.full_name()), keyboards::main_menu()).await?;
        }
        CallbackAction::Unknown => {
            bot.answer_callback_query(q.id.clone()).await?;
        }
    }
    Ok(())
}

/// Starts (or restarts) the questionnaire in place of `message`.
async fn ask_full_name(bot: &Bot, dialogue: &DeliveryDialogue, message: MessageRef) -> Result<(), HandlerError> {
    dialogue.update(DeliveryState::FullName).await?;
    edit(bot, message, delivery::ASK_FULL_NAME, keyboards::delivery_input()).await?;
    Ok(())
}

fn message_ref(message: &MaybeInaccessibleMessage) -> MessageRef {
    MessageRef::new(message.chat().id.0, message.id().0)
}

/// Replaces `message` with the cart contents.
async fn show_cart(deps: &HandlerDeps, user_id: i64, message: MessageRef) -> Result<(), HandlerError> {
    let lines = deps.store.get_items(user_id).await?;
    let keyboard = if lines.is_empty() {
        Keyboard::None
    } else {
        Keyboard::CartCheckout
    };
    deps.notifier
        .edit_message(message, &views::cart(&lines), keyboard)
        .await?;
    Ok(())
}

async fn edit(
    bot: &Bot,
    message: MessageRef,
    text: &str,
    markup: InlineKeyboardMarkup,
) -> Result<(), teloxide::RequestError> {
    bot.edit_message_text(ChatId(message.chat_id), MessageId(message.message_id), text)
        .reply_markup(markup)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_user_ids_are_converted_without_wrapping() {
        assert_eq!(checked_user_id(UserId(123_456_789)).ok(), Some(123_456_789));
        assert_eq!(checked_user_id(UserId(i64::MAX as u64)).ok(), Some(i64::MAX));
        assert!(checked_user_id(UserId(u64::MAX)).is_err());
    }
}
