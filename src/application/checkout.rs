use crate::application::secrets::SecretVault;
use crate::domain::order::{Order, PaymentState};
use crate::domain::payment::PaymentIntent;
use crate::domain::ports::{
    CheckoutItem, CheckoutRequest, ClockRef, GatewayRef, OrderStoreRef, PaymentStoreRef,
    TenantStoreRef,
};
use crate::error::{PaymentError, Result};
use chrono::Duration;
use std::sync::Arc;
use uuid::Uuid;

const DEFAULT_CURRENCY: &str = "ARS";
const INTENT_TTL_HOURS: i64 = 24;
/// Provider limit on the card-statement descriptor.
const STATEMENT_DESCRIPTOR_MAX: usize = 22;

/// What a caller needs to send the customer to the provider's checkout.
#[derive(Debug, PartialEq, Clone)]
pub struct CheckoutHandle {
    pub intent_id: Uuid,
    pub checkout_url: String,
    pub external_reference: String,
}

impl From<PaymentIntent> for CheckoutHandle {
    fn from(intent: PaymentIntent) -> Self {
        Self {
            intent_id: intent.id,
            checkout_url: intent.checkout_url,
            external_reference: intent.external_reference,
        }
    }
}

/// Records outbound checkout sessions per order.
///
/// The provider-side session carries `external_reference = order.id`, so
/// reconciliation later resolves payments to orders with no extra lookup
/// state.
pub struct IntentTracker {
    orders: OrderStoreRef,
    payments: PaymentStoreRef,
    tenants: TenantStoreRef,
    vault: Arc<SecretVault>,
    gateway: GatewayRef,
    clock: ClockRef,
    base_url: String,
}

impl IntentTracker {
    pub fn new(
        orders: OrderStoreRef,
        payments: PaymentStoreRef,
        tenants: TenantStoreRef,
        vault: Arc<SecretVault>,
        gateway: GatewayRef,
        clock: ClockRef,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            orders,
            payments,
            tenants,
            vault,
            gateway,
            clock,
            base_url: base_url.into(),
        }
    }

    /// Creates (or reuses) a provider checkout session for the order. The
    /// pending intent is persisted before the URL is handed back.
    pub async fn create_intent(
        &self,
        order_id: &str,
        items: Vec<CheckoutItem>,
    ) -> Result<CheckoutHandle> {
        let order = self
            .orders
            .get(order_id)
            .await?
            .ok_or_else(|| PaymentError::NotFound(format!("order {order_id}")))?;
        if order.is_paid {
            return Err(PaymentError::ValidationError(format!(
                "order {order_id} is already paid"
            )));
        }

        let now = self.clock.now();
        if let Some(intent) = self.payments.intent_for_order(order_id).await?
            && intent.is_active(now)
        {
            tracing::debug!(order_id, intent_id = %intent.id, "reusing active checkout intent");
            return Ok(intent.into());
        }

        let tenant = self
            .tenants
            .get(&order.tenant_id)
            .await?
            .ok_or_else(|| PaymentError::NotFound(format!("tenant {}", order.tenant_id)))?;
        let token = self.vault.access_token(&tenant.id).await?;

        let items = if items.is_empty() {
            Self::items_from(&order)
        } else {
            items
        };

        let request = CheckoutRequest {
            external_reference: order.id.clone(),
            items,
            total_amount: order.total_amount.value(),
            currency: DEFAULT_CURRENCY.to_string(),
            statement_descriptor: truncate(&tenant.name, STATEMENT_DESCRIPTOR_MAX),
            notification_url: format!(
                "{}/hooks/payments?tenant_id={}",
                self.base_url, tenant.id
            ),
            back_url: format!("{}/m/{}/orders/{}", self.base_url, tenant.slug, order.id),
        };

        let session = self.gateway.create_checkout(&token, request).await?;

        let intent = PaymentIntent {
            id: Uuid::new_v4(),
            tenant_id: tenant.id.clone(),
            order_id: order.id.clone(),
            provider_reference: session.preference_id,
            external_reference: order.id.clone(),
            amount: order.total_amount,
            currency: DEFAULT_CURRENCY.to_string(),
            status: PaymentState::Pending,
            checkout_url: session.checkout_url,
            expires_at: now + Duration::hours(INTENT_TTL_HOURS),
            created_at: now,
        };
        self.payments.store_intent(intent.clone()).await?;
        tracing::info!(order_id, intent_id = %intent.id, "created checkout intent");

        Ok(intent.into())
    }

    fn items_from(order: &Order) -> Vec<CheckoutItem> {
        order
            .lines
            .iter()
            .map(|line| CheckoutItem {
                title: line.name.clone(),
                quantity: line.quantity,
                unit_price: line.unit_price,
            })
            .collect()
    }
}

fn truncate(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}
