use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::inventory::{IngredientStock, InventoryItem};
use super::notification::NotificationTask;
use super::order::{Order, OrderStatus, PaymentMeta, PaymentState};
use super::payment::{PaymentIntent, PaymentRecord, ProviderPayment};
use super::secret::{EncryptedSecret, SecretType};
use super::tenant::Tenant;
use crate::error::Result;

/// Store for orders. The compare-and-set methods are the concurrency
/// boundary: two racing finalize or deduction calls are serialized by the
/// conditional update, not by any in-process coordination.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn get(&self, order_id: &str) -> Result<Option<Order>>;
    async fn store(&self, order: Order) -> Result<()>;
    /// Flips `is_paid` false -> true and writes the payment metadata in one
    /// conditional update. Returns false when the order was already paid.
    async fn set_paid_if_unpaid(&self, order_id: &str, meta: PaymentMeta) -> Result<bool>;
    /// Flips `stock_deducted` false -> true. Returns false when a previous
    /// call already deducted.
    async fn set_stock_deducted_if_not(&self, order_id: &str) -> Result<bool>;
    /// Records a non-approved provider verdict on `payment_status`.
    async fn record_verdict(&self, order_id: &str, state: PaymentState) -> Result<()>;
    /// Updates the order lifecycle status without touching payment fields.
    async fn set_status(&self, order_id: &str, status: OrderStatus) -> Result<()>;
    async fn all(&self) -> Result<Vec<Order>>;
}

/// Store for checkout intents and applied payment records.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn store_intent(&self, intent: PaymentIntent) -> Result<()>;
    async fn intent_for_order(&self, order_id: &str) -> Result<Option<PaymentIntent>>;
    /// Insert honouring the unique constraint on `provider_payment_id`.
    /// Returns false when a record with that id already exists; the caller
    /// must re-read the order rather than retry the insert.
    async fn try_insert_record(&self, record: PaymentRecord) -> Result<bool>;
    async fn get_record(&self, provider_payment_id: &str) -> Result<Option<PaymentRecord>>;
    async fn records_for_order(&self, order_id: &str) -> Result<Vec<PaymentRecord>>;
}

#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn get_item(&self, item_id: &str) -> Result<Option<InventoryItem>>;
    async fn store_item(&self, item: InventoryItem) -> Result<()>;
    async fn get_ingredient(&self, ingredient_id: &str) -> Result<Option<IngredientStock>>;
    async fn store_ingredient(&self, stock: IngredientStock) -> Result<()>;
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn enqueue(&self, task: NotificationTask) -> Result<()>;
    async fn update(&self, task: NotificationTask) -> Result<()>;
    /// Pending tasks with `next_attempt_at <= now`, oldest first, bounded.
    async fn due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<NotificationTask>>;
    async fn get(&self, id: Uuid) -> Result<Option<NotificationTask>>;
    async fn for_order(&self, order_id: &str) -> Result<Vec<NotificationTask>>;
}

#[async_trait]
pub trait TenantStore: Send + Sync {
    async fn get(&self, tenant_id: &str) -> Result<Option<Tenant>>;
    async fn store(&self, tenant: Tenant) -> Result<()>;
    async fn set_secrets_encrypted(&self, tenant_id: &str, encrypted: bool) -> Result<()>;
}

#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn put(&self, secret: EncryptedSecret) -> Result<()>;
    async fn get(
        &self,
        tenant_id: &str,
        secret_type: SecretType,
    ) -> Result<Option<EncryptedSecret>>;
}

/// One line of a checkout session sent to the provider.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct CheckoutItem {
    pub title: String,
    pub quantity: u32,
    pub unit_price: Decimal,
}

/// Request body for a provider checkout session.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct CheckoutRequest {
    pub external_reference: String,
    pub items: Vec<CheckoutItem>,
    pub total_amount: Decimal,
    pub currency: String,
    pub statement_descriptor: String,
    pub notification_url: String,
    pub back_url: String,
}

/// A created provider checkout session.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct CheckoutSession {
    pub preference_id: String,
    pub checkout_url: String,
}

/// A token grant returned by the provider's OAuth refresh endpoint.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in_secs: Option<u64>,
}

/// The external payment provider. All calls carry the tenant's access
/// token; implementations are expected to bound their own time.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout(
        &self,
        access_token: &str,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession>;
    async fn fetch_payment(&self, access_token: &str, payment_id: &str)
    -> Result<ProviderPayment>;
    async fn search_by_reference(
        &self,
        access_token: &str,
        external_reference: &str,
    ) -> Result<Vec<ProviderPayment>>;
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant>;
}

#[derive(Debug, PartialEq, Clone)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Outbound email delivery.
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Injected time source so every time-dependent component is testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub type OrderStoreRef = Arc<dyn OrderStore>;
pub type PaymentStoreRef = Arc<dyn PaymentStore>;
pub type InventoryStoreRef = Arc<dyn InventoryStore>;
pub type NotificationStoreRef = Arc<dyn NotificationStore>;
pub type TenantStoreRef = Arc<dyn TenantStore>;
pub type SecretStoreRef = Arc<dyn SecretStore>;
pub type GatewayRef = Arc<dyn PaymentGateway>;
pub type MailSenderRef = Arc<dyn MailSender>;
pub type ClockRef = Arc<dyn Clock>;
