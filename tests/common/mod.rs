use chrono::{DateTime, TimeZone, Utc};
use orderpay::domain::inventory::{IngredientStock, InventoryItem, RecipeComponent};
use orderpay::domain::order::{Amount, Order, OrderLine, PaymentState};
use orderpay::domain::payment::ProviderPayment;
use orderpay::domain::ports::{InventoryStore, OrderStore, TenantStore};
use orderpay::domain::tenant::Tenant;
use orderpay::interfaces::replay::Scenario;
use rust_decimal_macros::dec;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap()
}

/// A wired stack with one tenant (legacy plaintext token), one pending
/// order `O1` for two lattes, and the latte recipe over two ingredients.
pub async fn seeded_scenario() -> Scenario {
    let scenario = Scenario::in_memory(t0());

    let mut tenant = Tenant::new("t-1", "Cafe Centro", "cafe-centro");
    tenant.legacy_access_token = Some("APP_USR-tenant-1".to_string());
    scenario.tenants.store(tenant).await.unwrap();

    let mut order = Order::new("O1", "t-1", Amount::new(dec!(1000)).unwrap());
    order.order_number = 1;
    order.customer_email = Some("client@example.com".to_string());
    order.lines.push(OrderLine {
        item_id: "latte".to_string(),
        name: "Latte".to_string(),
        quantity: 2,
        unit_price: dec!(500),
    });
    scenario.orders.store(order).await.unwrap();

    scenario
        .inventory
        .store_item(InventoryItem {
            id: "latte".to_string(),
            tenant_id: "t-1".to_string(),
            name: "Latte".to_string(),
            recipe: vec![
                RecipeComponent {
                    ingredient_id: "beans".to_string(),
                    quantity: dec!(1),
                },
                RecipeComponent {
                    ingredient_id: "milk".to_string(),
                    quantity: dec!(2),
                },
            ],
        })
        .await
        .unwrap();
    scenario
        .inventory
        .store_ingredient(IngredientStock {
            id: "beans".to_string(),
            tenant_id: "t-1".to_string(),
            name: "Coffee beans".to_string(),
            open_units: dec!(3),
            sealed_units: dec!(10),
            min_stock: dec!(0),
        })
        .await
        .unwrap();
    scenario
        .inventory
        .store_ingredient(IngredientStock {
            id: "milk".to_string(),
            tenant_id: "t-1".to_string(),
            name: "Milk".to_string(),
            open_units: dec!(0),
            sealed_units: dec!(20),
            min_stock: dec!(0),
        })
        .await
        .unwrap();

    scenario
}

pub fn approved_payment(payment_id: &str, order_id: &str) -> ProviderPayment {
    ProviderPayment {
        id: payment_id.to_string(),
        status: PaymentState::Approved,
        status_detail: Some("accredited".to_string()),
        external_reference: Some(order_id.to_string()),
        transaction_amount: dec!(1000),
        payment_method: Some("account_money".to_string()),
        payer_email: Some("payer@example.com".to_string()),
        approved_at: Some(t0()),
    }
}

pub fn pending_payment(payment_id: &str, order_id: &str) -> ProviderPayment {
    ProviderPayment {
        status: PaymentState::Pending,
        status_detail: Some("pending_waiting_payment".to_string()),
        approved_at: None,
        ..approved_payment(payment_id, order_id)
    }
}
