mod common;

use common::{approved_payment, seeded_scenario};
use orderpay::domain::inventory::StockDeduction;
use orderpay::domain::order::OrderStatus;
use orderpay::domain::tenant::FulfillmentPolicy;
use rust_decimal_macros::dec;

#[tokio::test]
async fn test_open_package_precedence_through_finalize() {
    let s = seeded_scenario().await;
    // 2 lattes consume 2 beans and 4 milk. Beans: 3 open, 10 sealed.
    s.engine.finalize("O1", &approved_payment("P1", "O1")).await.unwrap();

    let beans = s.inventory.get_ingredient("beans").await.unwrap().unwrap();
    assert_eq!(beans.open_units, dec!(1));
    assert_eq!(beans.sealed_units, dec!(10));

    let milk = s.inventory.get_ingredient("milk").await.unwrap().unwrap();
    assert_eq!(milk.open_units, dec!(0));
    assert_eq!(milk.sealed_units, dec!(16));
}

#[tokio::test]
async fn test_deduct_stock_exactly_once() {
    let s = seeded_scenario().await;

    let first = s.fulfillment.deduct_stock("O1").await.unwrap();
    assert!(matches!(first, StockDeduction::Applied { .. }));

    let second = s.fulfillment.deduct_stock("O1").await.unwrap();
    assert_eq!(second, StockDeduction::AlreadyDeducted);

    let beans = s.inventory.get_ingredient("beans").await.unwrap().unwrap();
    assert_eq!(beans.total(), dec!(11));
}

#[tokio::test]
async fn test_pay_now_and_delivery_trigger_race_deducts_once() {
    let s = seeded_scenario().await;

    // Payment approval deducts for an on-payment tenant; the later
    // delivery confirmation must not deduct again.
    s.engine.finalize("O1", &approved_payment("P1", "O1")).await.unwrap();
    let at_delivery = s.fulfillment.confirm_delivery("O1").await.unwrap();
    assert!(at_delivery.is_none());

    let order = s.orders.get("O1").await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Delivered);
    assert!(order.stock_deducted);

    let beans = s.inventory.get_ingredient("beans").await.unwrap().unwrap();
    assert_eq!(beans.total(), dec!(11));
}

#[tokio::test]
async fn test_on_delivery_tenant_defers_deduction() {
    let s = seeded_scenario().await;
    let mut tenant = s.tenants.get("t-1").await.unwrap().unwrap();
    tenant.fulfillment = FulfillmentPolicy::OnDelivery;
    s.tenants.store(tenant).await.unwrap();

    s.engine.finalize("O1", &approved_payment("P1", "O1")).await.unwrap();
    let order = s.orders.get("O1").await.unwrap().unwrap();
    assert!(order.is_paid);
    assert!(!order.stock_deducted, "on-delivery tenant must not deduct at payment");

    let outcome = s.fulfillment.confirm_delivery("O1").await.unwrap();
    assert!(matches!(outcome, Some(StockDeduction::Applied { .. })));

    let beans = s.inventory.get_ingredient("beans").await.unwrap().unwrap();
    assert_eq!(beans.total(), dec!(11));
}

#[tokio::test]
async fn test_insufficient_stock_reported_and_goes_negative() {
    let s = seeded_scenario().await;
    let mut milk = s.inventory.get_ingredient("milk").await.unwrap().unwrap();
    milk.open_units = dec!(1);
    milk.sealed_units = dec!(1);
    s.inventory.store_ingredient(milk).await.unwrap();

    // 2 lattes need 4 milk; 2 available.
    let outcome = s.fulfillment.deduct_stock("O1").await.unwrap();
    let StockDeduction::Applied { shortages } = outcome else {
        panic!("expected applied deduction");
    };
    assert_eq!(shortages.len(), 1);
    assert_eq!(shortages[0].ingredient_id, "milk");
    assert_eq!(shortages[0].requested, dec!(4));
    assert_eq!(shortages[0].shortfall, dec!(2));

    let milk = s.inventory.get_ingredient("milk").await.unwrap().unwrap();
    assert_eq!(milk.open_units, dec!(0));
    assert_eq!(milk.sealed_units, dec!(-2));

    // Paid fulfillment is never blocked by a shortage.
    let order = s.orders.get("O1").await.unwrap().unwrap();
    assert!(order.stock_deducted);
}
