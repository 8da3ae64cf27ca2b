//! Checkout and payment polling, end to end against the in-memory shop.
//!
//! Time is paused: the 15 s poll interval and the 60-check window run in
//! virtual time.

#![allow(clippy::unwrap_used)]

mod common;

use common::{wait_until_idle, BrokenStatusWrites, CreateMode, Shop, Step, MESSAGE, USER_ID};
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;
use shopcore::core::metrics::PaymentMetrics;
use shopcore::payment::{CheckoutError, Keyboard, PaymentCoordinator, ValidationError};
use shopcore::storage::{CartStore, CustomerInfo, OrderStatus, OrderStore, PaymentState};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_checkout_with_empty_cart_never_reaches_gateway() {
    let shop = Shop::new().await;
    shop.store.clear(USER_ID).await.unwrap();

    let err = shop.coordinator.checkout(USER_ID, MESSAGE).await.unwrap_err();

    assert!(matches!(err, CheckoutError::Validation(ValidationError::EmptyCart)));
    assert!(shop.gateway.created().is_empty());
    assert!(shop.store.orders_for_user(USER_ID).await.unwrap().is_empty());
    assert!(!shop.coordinator.has_active_session(USER_ID));
}

#[tokio::test(start_paused = true)]
async fn test_checkout_without_phone_is_rejected() {
    let shop = Shop::new().await;
    shop.store
        .upsert_customer(
            USER_ID,
            CustomerInfo {
                phone: None,
                ..common::delivery_info()
            },
        )
        .await;

    let err = shop.coordinator.checkout(USER_ID, MESSAGE).await.unwrap_err();

    assert!(matches!(err, CheckoutError::Validation(ValidationError::MissingDeliveryInfo)));
    assert_eq!(err.user_message(), "Для оформления заказа необходимо указать адрес и телефон");
    assert!(shop.gateway.created().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_checkout_without_profile_is_rejected() {
    let shop = Shop::new().await;

    let err = shop.coordinator.checkout(999, MESSAGE).await.unwrap_err();

    assert!(matches!(err, CheckoutError::Validation(ValidationError::MissingDeliveryInfo)));
}

#[tokio::test(start_paused = true)]
async fn test_gateway_failures_leave_user_idle() {
    let shop = Shop::new().await;

    shop.gateway.set_create_mode(CreateMode::NotConfigured);
    let err = shop.coordinator.checkout(USER_ID, MESSAGE).await.unwrap_err();
    assert!(matches!(err, CheckoutError::Configuration(_)));

    shop.gateway.set_create_mode(CreateMode::Unavailable);
    let err = shop.coordinator.checkout(USER_ID, MESSAGE).await.unwrap_err();
    assert!(matches!(err, CheckoutError::Gateway(_)));
    assert_eq!(err.user_message(), "Не удалось создать платеж. Попробуйте позже.");

    shop.gateway.set_create_mode(CreateMode::NoConfirmationUrl);
    let err = shop.coordinator.checkout(USER_ID, MESSAGE).await.unwrap_err();
    assert!(matches!(err, CheckoutError::Gateway(_)));

    assert!(shop.store.orders_for_user(USER_ID).await.unwrap().is_empty());
    assert!(!shop.coordinator.has_active_session(USER_ID));
    assert!(shop.notifier.edits().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_checkout_charges_cart_total_and_shows_prompt() {
    let shop = Shop::new().await;

    let receipt = shop.coordinator.checkout(USER_ID, MESSAGE).await.unwrap();

    assert_eq!(receipt.amount, dec!(1000.00));
    assert_eq!(receipt.gateway_id, "pay_1");

    let created = shop.gateway.created();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].amount, dec!(1000.00));
    assert_eq!(created[0].metadata.user_id, "7");

    let order = shop.store.get_by_gateway_id("pay_1").await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::New);
    assert_eq!(order.payment_status, PaymentState::Pending);
    assert_eq!(order.total_price, dec!(1000.00));
    assert_eq!(order.address, "Москва, ул. Ленина, 1");

    let items = shop.store.order_items(order.id).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!((items[0].quantity, items[0].price), (2, dec!(500.00)));

    let (target, text, keyboard) = shop.notifier.last().unwrap();
    assert_eq!(target, MESSAGE);
    assert!(text.contains("Сумма к оплате: 1 000 руб."));
    assert_eq!(
        keyboard,
        Keyboard::PaymentLink {
            url: "https://pay.example/pay_1".to_string(),
            payment_id: "pay_1".to_string(),
        }
    );
    assert!(shop.coordinator.has_active_session(USER_ID));
}

#[tokio::test(start_paused = true)]
async fn test_succeeded_payment_settles_order_and_clears_cart() {
    let shop = Shop::new().await;
    shop.gateway
        .script("pay_1", [Step::Status("pending"), Step::Status("succeeded")]);

    let receipt = shop.coordinator.checkout(USER_ID, MESSAGE).await.unwrap();
    shop.wait_for_idle(USER_ID).await;

    let order = shop.store.get_by_gateway_id("pay_1").await.unwrap().unwrap();
    assert_eq!(order.payment_status, PaymentState::Succeeded);
    assert_eq!(order.status, OrderStatus::Paid);
    assert!(shop.store.get_items(USER_ID).await.unwrap().is_empty());
    assert_eq!(shop.gateway.status_calls("pay_1"), 2);

    let (_, text, keyboard) = shop.notifier.last().unwrap();
    assert!(text.contains(&format!("Номер заказа: {}", receipt.order_id)));
    assert!(text.contains("1000 руб."));
    assert_eq!(keyboard, Keyboard::AfterPayment);
    assert_eq!(shop.coordinator.active_sessions(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_transient_status_errors_keep_polling() {
    let shop = Shop::new().await;
    shop.gateway.script(
        "pay_1",
        [Step::Error, Step::Error, Step::Status("canceled"), Step::Status("succeeded")],
    );

    shop.coordinator.checkout(USER_ID, MESSAGE).await.unwrap();
    shop.wait_for_idle(USER_ID).await;

    let order = shop.store.get_by_gateway_id("pay_1").await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(shop.gateway.status_calls("pay_1"), 4);
}

#[tokio::test(start_paused = true)]
async fn test_unexpected_status_fails_payment() {
    let shop = Shop::new().await;
    shop.gateway.script("pay_1", [Step::Status("waiting_for_capture")]);

    shop.coordinator.checkout(USER_ID, MESSAGE).await.unwrap();
    shop.wait_for_idle(USER_ID).await;

    let order = shop.store.get_by_gateway_id("pay_1").await.unwrap().unwrap();
    assert_eq!(order.payment_status, PaymentState::Failed);
    assert_eq!(order.status, OrderStatus::New);
    assert_eq!(shop.store.get_items(USER_ID).await.unwrap().len(), 1);

    let (_, text, keyboard) = shop.notifier.last().unwrap();
    assert!(text.contains("Статус: waiting_for_capture"));
    assert_eq!(keyboard, Keyboard::BackToCart);
}

#[tokio::test(start_paused = true)]
async fn test_pending_payment_expires_after_polling_window() {
    let shop = Shop::new().await;

    let started = tokio::time::Instant::now();
    let receipt = shop.coordinator.checkout(USER_ID, MESSAGE).await.unwrap();
    shop.wait_for_idle(USER_ID).await;

    // 60 checks 15 s apart, then the final check.
    assert_eq!(shop.gateway.status_calls("pay_1"), 61);
    assert!(started.elapsed() >= Duration::from_secs(60 * 15));

    assert_eq!(shop.store.get_by_gateway_id("pay_1").await.unwrap(), None);
    assert!(shop.store.order_items(receipt.order_id).await.unwrap().is_empty());
    assert_eq!(shop.store.order_item_count().await, 0);

    let (_, text, keyboard) = shop.notifier.last().unwrap();
    assert!(text.starts_with("⏱ Время ожидания оплаты истекло."));
    assert_eq!(keyboard, Keyboard::None);
}

#[tokio::test(start_paused = true)]
async fn test_final_check_can_still_settle() {
    let shop = Shop::new().await;
    let mut steps: Vec<Step> = (0..60).map(|_| Step::Status("pending")).collect();
    steps.push(Step::Status("succeeded"));
    shop.gateway.script("pay_1", steps);

    shop.coordinator.checkout(USER_ID, MESSAGE).await.unwrap();
    shop.wait_for_idle(USER_ID).await;

    let order = shop.store.get_by_gateway_id("pay_1").await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(shop.notifier.last().unwrap().2, Keyboard::AfterPayment);
}

#[tokio::test(start_paused = true)]
async fn test_new_checkout_displaces_running_session() {
    let shop = Shop::new().await;

    let first = shop.coordinator.checkout(USER_ID, MESSAGE).await.unwrap();
    tokio::time::sleep(Duration::from_secs(20)).await;
    let second = shop.coordinator.checkout(USER_ID, MESSAGE).await.unwrap();

    assert_eq!(shop.coordinator.active_sessions(), 1);
    assert_eq!(shop.store.get_by_gateway_id(&first.gateway_id).await.unwrap(), None);
    assert!(shop.store.get_by_gateway_id(&second.gateway_id).await.unwrap().is_some());

    let calls_after_displacement = shop.gateway.status_calls(&first.gateway_id);
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(shop.gateway.status_calls(&first.gateway_id), calls_after_displacement);

    let orders = shop.store.orders_for_user(USER_ID).await.unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].payment_id.as_deref(), Some(second.gateway_id.as_str()));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_mid_poll_removes_order_without_outcome_notice() {
    let shop = Shop::new().await;

    let receipt = shop.coordinator.checkout(USER_ID, MESSAGE).await.unwrap();
    tokio::time::sleep(Duration::from_secs(31)).await;
    let calls_before_cancel = shop.gateway.status_calls("pay_1");
    assert!(calls_before_cancel >= 2);

    assert!(shop.coordinator.cancel(USER_ID, &receipt.gateway_id).await.unwrap());

    assert!(!shop.coordinator.has_active_session(USER_ID));
    assert_eq!(shop.store.get_by_gateway_id("pay_1").await.unwrap(), None);
    assert_eq!(shop.store.order_item_count().await, 0);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(shop.gateway.status_calls("pay_1"), calls_before_cancel);

    // Only the payment prompt was ever shown.
    assert_eq!(shop.notifier.edits().len(), 1);

    // Cart is untouched so the customer can try again.
    assert_eq!(shop.store.get_items(USER_ID).await.unwrap().len(), 1);

    assert!(!shop.coordinator.cancel(USER_ID, &receipt.gateway_id).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_of_stale_payment_keeps_current_session() {
    let shop = Shop::new().await;
    let first = shop.coordinator.checkout(USER_ID, MESSAGE).await.unwrap();
    let second = shop.coordinator.checkout(USER_ID, MESSAGE).await.unwrap();

    assert!(!shop.coordinator.cancel(USER_ID, &first.gateway_id).await.unwrap());

    assert!(shop.coordinator.has_active_session(USER_ID));
    assert!(shop.store.get_by_gateway_id(&second.gateway_id).await.unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_sessions_of_different_users_are_independent() {
    let shop = Shop::new().await;
    shop.store.upsert_customer(8, common::delivery_info()).await;
    shop.store.add_to_cart(8, 1, 1).await.unwrap();
    shop.gateway.script("pay_2", [Step::Status("succeeded")]);

    shop.coordinator.checkout(USER_ID, MESSAGE).await.unwrap();
    shop.coordinator.checkout(8, MESSAGE).await.unwrap();
    shop.wait_for_idle(8).await;

    assert!(shop.coordinator.has_active_session(USER_ID));
    assert_eq!(shop.coordinator.active_sessions(), 1);

    shop.coordinator.shutdown().await;
    assert_eq!(shop.coordinator.active_sessions(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_outcomes_are_counted() {
    let shop = Shop::new().await;
    let metrics = PaymentMetrics::unregistered().unwrap();
    let coordinator = PaymentCoordinator::builder(shop.gateway.clone(), shop.notifier.clone())
        .orders(shop.store.clone())
        .carts(shop.store.clone())
        .customers(shop.store.clone())
        .metrics(metrics.clone())
        .build()
        .unwrap();
    shop.gateway.script("pay_1", [Step::Status("succeeded")]);

    coordinator.checkout(USER_ID, MESSAGE).await.unwrap();
    for _ in 0..60 {
        if !coordinator.has_active_session(USER_ID) {
            break;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    assert_eq!(metrics.checkouts_total.get(), 1);
    assert_eq!(metrics.session_outcomes_total.with_label_values(&["succeeded"]).get(), 1);
    assert_eq!(metrics.active_sessions.get(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_of_another_users_payment_is_refused() {
    let shop = Shop::new().await;
    shop.gateway.script(
        "pay_1",
        [Step::Status("pending"), Step::Status("pending"), Step::Status("succeeded")],
    );
    let receipt = shop.coordinator.checkout(USER_ID, MESSAGE).await.unwrap();

    assert!(!shop.coordinator.cancel(666, &receipt.gateway_id).await.unwrap());
    assert!(shop.store.get_by_gateway_id("pay_1").await.unwrap().is_some());
    assert!(shop.coordinator.has_active_session(USER_ID));

    shop.wait_for_idle(USER_ID).await;

    let order = shop.store.get_by_gateway_id("pay_1").await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(shop.notifier.last().unwrap().2, Keyboard::AfterPayment);
}

#[tokio::test(start_paused = true)]
async fn test_success_without_stored_order_leaves_cart_and_customer_alone() {
    let shop = Shop::new().await;
    let metrics = PaymentMetrics::unregistered().unwrap();
    let coordinator = shop.coordinator_with(shop.store.clone(), metrics.clone());
    shop.gateway
        .script("pay_1", [Step::Status("pending"), Step::Status("succeeded")]);

    coordinator.checkout(USER_ID, MESSAGE).await.unwrap();
    assert!(shop.store.delete_unpaid("pay_1").await.unwrap());
    wait_until_idle(&coordinator, USER_ID).await;

    assert_eq!(shop.store.get_by_gateway_id("pay_1").await.unwrap(), None);
    assert_eq!(shop.store.get_items(USER_ID).await.unwrap().len(), 1);
    // Only the payment prompt.
    assert_eq!(shop.notifier.edits().len(), 1);
    assert_eq!(metrics.session_outcomes_total.with_label_values(&["error"]).get(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_configuration_error_while_polling_ends_session() {
    let shop = Shop::new().await;
    let metrics = PaymentMetrics::unregistered().unwrap();
    let coordinator = shop.coordinator_with(shop.store.clone(), metrics.clone());
    shop.gateway.script("pay_1", [Step::NotConfigured]);

    coordinator.checkout(USER_ID, MESSAGE).await.unwrap();
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert!(!coordinator.has_active_session(USER_ID));
    assert_eq!(shop.gateway.status_calls("pay_1"), 1);
    assert_eq!(metrics.session_outcomes_total.with_label_values(&["error"]).get(), 1);
    assert_eq!(metrics.active_sessions.get(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_payment_ends_session_but_server_errors_do_not() {
    let shop = Shop::new().await;
    shop.gateway.script(
        "pay_1",
        [Step::Error, Step::Http(429), Step::Http(404), Step::Status("succeeded")],
    );

    shop.coordinator.checkout(USER_ID, MESSAGE).await.unwrap();
    shop.wait_for_idle(USER_ID).await;

    assert_eq!(shop.gateway.status_calls("pay_1"), 3);
    let order = shop.store.get_by_gateway_id("pay_1").await.unwrap().unwrap();
    assert_eq!(order.payment_status, PaymentState::Pending);
    assert_eq!(shop.store.get_items(USER_ID).await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_storage_failure_on_settle_releases_session() {
    let shop = Shop::new().await;
    let metrics = PaymentMetrics::unregistered().unwrap();
    let coordinator = shop.coordinator_with(BrokenStatusWrites::new(shop.store.clone()), metrics.clone());
    shop.gateway.script("pay_1", [Step::Status("succeeded")]);

    coordinator.checkout(USER_ID, MESSAGE).await.unwrap();
    wait_until_idle(&coordinator, USER_ID).await;

    assert!(!coordinator.has_active_session(USER_ID));
    assert_eq!(coordinator.active_sessions(), 0);
    assert_eq!(metrics.session_outcomes_total.with_label_values(&["error"]).get(), 1);
    assert_eq!(metrics.session_outcomes_total.with_label_values(&["succeeded"]).get(), 0);
    assert_eq!(metrics.active_sessions.get(), 0);
    assert_eq!(shop.store.get_items(USER_ID).await.unwrap().len(), 1);
    assert_eq!(shop.notifier.edits().len(), 1);
}
