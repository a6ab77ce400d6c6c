mod common;

use common::{approved_payment, pending_payment, seeded_scenario};
use orderpay::application::reconcile::FinalizeOutcome;
use orderpay::domain::order::PaymentState;
use rust_decimal_macros::dec;
use std::sync::Arc;

#[tokio::test]
async fn test_finalize_is_idempotent() {
    let s = seeded_scenario().await;
    let payment = approved_payment("P1", "O1");

    let first = s.engine.finalize("O1", &payment).await.unwrap();
    assert!(matches!(first, FinalizeOutcome::Applied(_)));

    let second = s.engine.finalize("O1", &payment).await.unwrap();
    assert!(matches!(second, FinalizeOutcome::AlreadyProcessed(_)));

    let order = s.orders.get("O1").await.unwrap().unwrap();
    assert!(order.is_paid);
    assert_eq!(order.payment_status, PaymentState::Approved);
    assert_eq!(order.payment.as_ref().unwrap().provider_payment_id, "P1");

    assert_eq!(s.payments.records_for_order("O1").await.unwrap().len(), 1);
    assert_eq!(s.tasks.for_order("O1").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_concurrent_finalize_applies_once() {
    let s = Arc::new(seeded_scenario().await);
    let payment = approved_payment("P1", "O1");

    let mut handles = Vec::new();
    for _ in 0..8 {
        let s = s.clone();
        let payment = payment.clone();
        handles.push(tokio::spawn(async move {
            s.engine.finalize("O1", &payment).await.unwrap()
        }));
    }

    let mut applied = 0;
    for handle in handles {
        if matches!(handle.await.unwrap(), FinalizeOutcome::Applied(_)) {
            applied += 1;
        }
    }
    assert_eq!(applied, 1, "exactly one caller must win the finalize");

    assert_eq!(s.payments.records_for_order("O1").await.unwrap().len(), 1);
    assert_eq!(s.tasks.for_order("O1").await.unwrap().len(), 1);

    // Stock deducted exactly once: 2 lattes = 2 beans (open first).
    let beans = s.inventory.get_ingredient("beans").await.unwrap().unwrap();
    assert_eq!(beans.open_units, dec!(1));
    assert_eq!(beans.sealed_units, dec!(10));
}

#[tokio::test]
async fn test_not_approved_payment_records_verdict_without_mutation() {
    let s = seeded_scenario().await;
    let mut payment = approved_payment("P1", "O1");
    payment.status = PaymentState::Rejected;

    let outcome = s.engine.finalize("O1", &payment).await.unwrap();
    assert!(matches!(
        outcome,
        FinalizeOutcome::NotApproved {
            state: PaymentState::Rejected,
            ..
        }
    ));

    let order = s.orders.get("O1").await.unwrap().unwrap();
    assert!(!order.is_paid);
    assert_eq!(order.payment_status, PaymentState::Rejected);
    assert!(s.payments.records_for_order("O1").await.unwrap().is_empty());
    assert!(s.tasks.for_order("O1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_webhook_and_poll_converge() {
    let s = seeded_scenario().await;
    s.gateway.register_payment(approved_payment("P1", "O1")).await;

    // Webhook wins the race.
    let outcome = s.engine.process_webhook("t-1", "P1").await.unwrap();
    assert!(matches!(outcome, FinalizeOutcome::Applied(_)));

    // A later poll converges on the already-processed order.
    let outcome = s.engine.poll_order("O1").await.unwrap();
    assert!(matches!(outcome, FinalizeOutcome::AlreadyProcessed(_)));
    assert_eq!(outcome.status_label(), "approved");

    assert_eq!(s.payments.records_for_order("O1").await.unwrap().len(), 1);
    assert_eq!(s.tasks.for_order("O1").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_poll_with_no_provider_payment_stays_pending() {
    let s = seeded_scenario().await;

    let outcome = s.engine.poll_order("O1").await.unwrap();
    assert!(matches!(
        outcome,
        FinalizeOutcome::NotApproved {
            state: PaymentState::Pending,
            ..
        }
    ));
    assert_eq!(outcome.status_label(), "pending");
}

#[tokio::test]
async fn test_poll_selects_latest_approved_payment() {
    let s = seeded_scenario().await;

    let mut early = approved_payment("P-early", "O1");
    early.approved_at = Some(common::t0() - chrono::Duration::hours(2));
    let late = approved_payment("P-late", "O1");

    s.gateway.register_payment(early).await;
    s.gateway.register_payment(late).await;
    s.gateway.register_payment(pending_payment("P-stale", "O1")).await;

    let outcome = s.engine.poll_order("O1").await.unwrap();
    assert!(matches!(outcome, FinalizeOutcome::Applied(_)));

    let order = s.orders.get("O1").await.unwrap().unwrap();
    assert_eq!(order.payment.as_ref().unwrap().provider_payment_id, "P-late");
}

#[tokio::test]
async fn test_webhook_redelivery_is_harmless() {
    let s = seeded_scenario().await;
    s.gateway.register_payment(approved_payment("P1", "O1")).await;

    s.engine.process_webhook("t-1", "P1").await.unwrap();
    let redelivery = s.engine.process_webhook("t-1", "P1").await.unwrap();
    assert!(matches!(redelivery, FinalizeOutcome::AlreadyProcessed(_)));

    assert_eq!(s.payments.records_for_order("O1").await.unwrap().len(), 1);
    assert_eq!(s.tasks.for_order("O1").await.unwrap().len(), 1);

    let beans = s.inventory.get_ingredient("beans").await.unwrap().unwrap();
    assert_eq!(beans.open_units, dec!(1));
}

#[tokio::test]
async fn test_side_effect_failure_does_not_roll_back_payment() {
    use orderpay::domain::order::{Amount, Order};
    use orderpay::interfaces::replay::Scenario;

    // An order whose tenant row is gone: the fulfillment trigger errors
    // when it reads the tenant policy.
    let s = Scenario::in_memory(common::t0());
    let mut order = Order::new("O1", "t-gone", Amount::new(dec!(1000)).unwrap());
    order.customer_email = Some("client@example.com".to_string());
    s.orders.store(order).await.unwrap();

    let outcome = s.engine.finalize("O1", &approved_payment("P1", "O1")).await.unwrap();
    assert!(matches!(outcome, FinalizeOutcome::Applied(_)));

    // Payment confirmation stands even though deduction failed.
    let order = s.orders.get("O1").await.unwrap().unwrap();
    assert!(order.is_paid);
    assert!(!order.stock_deducted);
    assert_eq!(s.tasks.for_order("O1").await.unwrap().len(), 1);
}
