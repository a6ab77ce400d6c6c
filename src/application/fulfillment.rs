use crate::domain::inventory::{Shortage, StockDeduction};
use crate::domain::order::{Order, OrderStatus};
use crate::domain::ports::{InventoryStoreRef, OrderStoreRef, TenantStoreRef};
use crate::domain::tenant::FulfillmentPolicy;
use crate::error::{PaymentError, Result};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Exactly-once recipe-based stock deduction.
///
/// The compare-and-set on `Order.stock_deducted` covers the race between
/// the pay-now and pay-on-delivery call sites: whichever runs second is a
/// no-op.
pub struct FulfillmentTrigger {
    orders: OrderStoreRef,
    inventory: InventoryStoreRef,
    tenants: TenantStoreRef,
}

impl FulfillmentTrigger {
    pub fn new(
        orders: OrderStoreRef,
        inventory: InventoryStoreRef,
        tenants: TenantStoreRef,
    ) -> Self {
        Self {
            orders,
            inventory,
            tenants,
        }
    }

    /// Deducts the order's recipe components from ingredient stock, open
    /// units first. Shortages are recorded for operational review but never
    /// block a paid order: sealed stock goes negative instead.
    pub async fn deduct_stock(&self, order_id: &str) -> Result<StockDeduction> {
        if !self.orders.set_stock_deducted_if_not(order_id).await? {
            return Ok(StockDeduction::AlreadyDeducted);
        }

        let order = self
            .orders
            .get(order_id)
            .await?
            .ok_or_else(|| PaymentError::NotFound(format!("order {order_id}")))?;

        let required = self.required_ingredients(&order).await?;
        let mut shortages = Vec::new();

        for (ingredient_id, quantity) in required {
            match self.inventory.get_ingredient(&ingredient_id).await? {
                Some(mut stock) => {
                    let shortfall = stock.consume(quantity);
                    if shortfall > Decimal::ZERO {
                        tracing::warn!(
                            order_id,
                            ingredient_id,
                            %quantity,
                            %shortfall,
                            "insufficient stock, deducted into negative"
                        );
                        shortages.push(Shortage {
                            ingredient_id: ingredient_id.clone(),
                            name: stock.name.clone(),
                            requested: quantity,
                            shortfall,
                        });
                    }
                    self.inventory.store_ingredient(stock).await?;
                }
                None => {
                    tracing::warn!(order_id, ingredient_id, "recipe references unknown ingredient");
                    shortages.push(Shortage {
                        ingredient_id: ingredient_id.clone(),
                        name: ingredient_id.clone(),
                        requested: quantity,
                        shortfall: quantity,
                    });
                }
            }
        }

        tracing::info!(order_id, shortages = shortages.len(), "stock deducted");
        Ok(StockDeduction::Applied { shortages })
    }

    /// Total ingredient quantities consumed by the order, aggregated across
    /// lines so shared ingredients are drawn once.
    async fn required_ingredients(&self, order: &Order) -> Result<BTreeMap<String, Decimal>> {
        let mut required: BTreeMap<String, Decimal> = BTreeMap::new();
        for line in &order.lines {
            let Some(item) = self.inventory.get_item(&line.item_id).await? else {
                tracing::warn!(order_id = %order.id, item_id = %line.item_id, "order line references unknown item");
                continue;
            };
            for component in &item.recipe {
                *required.entry(component.ingredient_id.clone()).or_default() +=
                    component.quantity * Decimal::from(line.quantity);
            }
        }
        Ok(required)
    }

    /// Runs the deduction at payment approval when the tenant is configured
    /// for it. Returns `None` when the tenant defers to delivery.
    pub async fn trigger_on_payment(&self, order: &Order) -> Result<Option<StockDeduction>> {
        match self.policy_for(&order.tenant_id).await? {
            FulfillmentPolicy::OnPayment => Ok(Some(self.deduct_stock(&order.id).await?)),
            FulfillmentPolicy::OnDelivery => Ok(None),
        }
    }

    /// Marks the order delivered and runs the deduction for tenants that
    /// deduct at delivery confirmation.
    pub async fn confirm_delivery(&self, order_id: &str) -> Result<Option<StockDeduction>> {
        let order = self
            .orders
            .get(order_id)
            .await?
            .ok_or_else(|| PaymentError::NotFound(format!("order {order_id}")))?;
        self.orders
            .set_status(order_id, OrderStatus::Delivered)
            .await?;

        match self.policy_for(&order.tenant_id).await? {
            FulfillmentPolicy::OnDelivery => Ok(Some(self.deduct_stock(order_id).await?)),
            FulfillmentPolicy::OnPayment => Ok(None),
        }
    }

    async fn policy_for(&self, tenant_id: &str) -> Result<FulfillmentPolicy> {
        let tenant = self
            .tenants
            .get(tenant_id)
            .await?
            .ok_or_else(|| PaymentError::NotFound(format!("tenant {tenant_id}")))?;
        Ok(tenant.fulfillment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::inventory::{IngredientStock, InventoryItem, RecipeComponent};
    use crate::domain::order::{Amount, OrderLine};
    use crate::domain::ports::{InventoryStore, OrderStore, TenantStore};
    use crate::domain::tenant::Tenant;
    use crate::infrastructure::in_memory::{
        InMemoryInventoryStore, InMemoryOrderStore, InMemoryTenantStore,
    };
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    struct Fixture {
        trigger: FulfillmentTrigger,
        orders: Arc<InMemoryOrderStore>,
        inventory: Arc<InMemoryInventoryStore>,
    }

    async fn fixture(policy: FulfillmentPolicy) -> Fixture {
        let orders = Arc::new(InMemoryOrderStore::new());
        let inventory = Arc::new(InMemoryInventoryStore::new());
        let tenants = Arc::new(InMemoryTenantStore::new());

        let mut tenant = Tenant::new("t-1", "Cafe", "cafe");
        tenant.fulfillment = policy;
        tenants.store(tenant).await.unwrap();

        inventory
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
        inventory
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
        inventory
            .store_ingredient(IngredientStock {
                id: "milk".to_string(),
                tenant_id: "t-1".to_string(),
                name: "Milk".to_string(),
                open_units: dec!(0),
                sealed_units: dec!(4),
                min_stock: dec!(0),
            })
            .await
            .unwrap();

        let mut order = Order::new("o-1", "t-1", Amount::new(dec!(1000)).unwrap());
        order.lines.push(OrderLine {
            item_id: "latte".to_string(),
            name: "Latte".to_string(),
            quantity: 5,
            unit_price: dec!(200),
        });
        orders.store(order).await.unwrap();

        Fixture {
            trigger: FulfillmentTrigger::new(orders.clone(), inventory.clone(), tenants),
            orders,
            inventory,
        }
    }

    #[tokio::test]
    async fn test_open_units_drawn_before_sealed() {
        let f = fixture(FulfillmentPolicy::OnPayment).await;
        // 5 lattes consume 5 beans: 3 open + 2 sealed.
        f.trigger.deduct_stock("o-1").await.unwrap();

        let beans = f.inventory.get_ingredient("beans").await.unwrap().unwrap();
        assert_eq!(beans.open_units, dec!(0));
        assert_eq!(beans.sealed_units, dec!(8));
    }

    #[tokio::test]
    async fn test_second_deduction_is_noop() {
        let f = fixture(FulfillmentPolicy::OnPayment).await;

        let first = f.trigger.deduct_stock("o-1").await.unwrap();
        assert!(matches!(first, StockDeduction::Applied { .. }));

        let second = f.trigger.deduct_stock("o-1").await.unwrap();
        assert_eq!(second, StockDeduction::AlreadyDeducted);

        let beans = f.inventory.get_ingredient("beans").await.unwrap().unwrap();
        assert_eq!(beans.total(), dec!(8));
    }

    #[tokio::test]
    async fn test_shortage_recorded_but_not_blocking() {
        let f = fixture(FulfillmentPolicy::OnPayment).await;
        // 5 lattes need 10 milk; only 4 sealed exist.
        let outcome = f.trigger.deduct_stock("o-1").await.unwrap();

        let StockDeduction::Applied { shortages } = outcome else {
            panic!("expected applied deduction");
        };
        assert_eq!(shortages.len(), 1);
        assert_eq!(shortages[0].ingredient_id, "milk");
        assert_eq!(shortages[0].shortfall, dec!(6));

        let milk = f.inventory.get_ingredient("milk").await.unwrap().unwrap();
        assert_eq!(milk.sealed_units, dec!(-6));

        // The order is still marked deducted.
        let order = f.orders.get("o-1").await.unwrap().unwrap();
        assert!(order.stock_deducted);
    }

    #[tokio::test]
    async fn test_on_delivery_policy_defers_payment_trigger() {
        let f = fixture(FulfillmentPolicy::OnDelivery).await;
        let order = f.orders.get("o-1").await.unwrap().unwrap();

        let at_payment = f.trigger.trigger_on_payment(&order).await.unwrap();
        assert!(at_payment.is_none());

        let beans = f.inventory.get_ingredient("beans").await.unwrap().unwrap();
        assert_eq!(beans.total(), dec!(13));

        let at_delivery = f.trigger.confirm_delivery("o-1").await.unwrap();
        assert!(matches!(at_delivery, Some(StockDeduction::Applied { .. })));

        let order = f.orders.get("o-1").await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Delivered);
    }
}
