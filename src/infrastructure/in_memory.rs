use crate::domain::inventory::{IngredientStock, InventoryItem};
use crate::domain::notification::{NotificationTask, TaskStatus};
use crate::domain::order::{Order, OrderStatus, PaymentMeta, PaymentState};
use crate::domain::payment::{PaymentIntent, PaymentRecord};
use crate::domain::ports::{
    InventoryStore, NotificationStore, OrderStore, PaymentStore, SecretStore, TenantStore,
};
use crate::domain::secret::{EncryptedSecret, SecretType};
use crate::domain::tenant::Tenant;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A thread-safe in-memory store for orders.
///
/// The compare-and-set methods take the write lock once and perform the
/// read-check-write under it, which is what makes them safe against two
/// racing finalize or deduction calls.
#[derive(Default, Clone)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<HashMap<String, Order>>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn get(&self, order_id: &str) -> Result<Option<Order>> {
        let orders = self.orders.read().await;
        Ok(orders.get(order_id).cloned())
    }

    async fn store(&self, order: Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        orders.insert(order.id.clone(), order);
        Ok(())
    }

    async fn set_paid_if_unpaid(&self, order_id: &str, meta: PaymentMeta) -> Result<bool> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(order_id)
            .ok_or_else(|| PaymentError::NotFound(format!("order {order_id}")))?;
        if order.is_paid {
            return Ok(false);
        }
        order.apply_approval(meta);
        Ok(true)
    }

    async fn set_stock_deducted_if_not(&self, order_id: &str) -> Result<bool> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(order_id)
            .ok_or_else(|| PaymentError::NotFound(format!("order {order_id}")))?;
        if order.stock_deducted {
            return Ok(false);
        }
        order.stock_deducted = true;
        Ok(true)
    }

    async fn record_verdict(&self, order_id: &str, state: PaymentState) -> Result<()> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(order_id)
            .ok_or_else(|| PaymentError::NotFound(format!("order {order_id}")))?;
        order.record_verdict(state);
        Ok(())
    }

    async fn set_status(&self, order_id: &str, status: OrderStatus) -> Result<()> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(order_id)
            .ok_or_else(|| PaymentError::NotFound(format!("order {order_id}")))?;
        order.status = status;
        Ok(())
    }

    async fn all(&self) -> Result<Vec<Order>> {
        let orders = self.orders.read().await;
        let mut all: Vec<Order> = orders.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }
}

/// In-memory store for checkout intents (keyed by order) and payment
/// records (keyed by provider payment id, first writer wins).
#[derive(Default, Clone)]
pub struct InMemoryPaymentStore {
    intents: Arc<RwLock<HashMap<String, PaymentIntent>>>,
    records: Arc<RwLock<HashMap<String, PaymentRecord>>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn store_intent(&self, intent: PaymentIntent) -> Result<()> {
        let mut intents = self.intents.write().await;
        intents.insert(intent.order_id.clone(), intent);
        Ok(())
    }

    async fn intent_for_order(&self, order_id: &str) -> Result<Option<PaymentIntent>> {
        let intents = self.intents.read().await;
        Ok(intents.get(order_id).cloned())
    }

    async fn try_insert_record(&self, record: PaymentRecord) -> Result<bool> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.provider_payment_id) {
            return Ok(false);
        }
        records.insert(record.provider_payment_id.clone(), record);
        Ok(true)
    }

    async fn get_record(&self, provider_payment_id: &str) -> Result<Option<PaymentRecord>> {
        let records = self.records.read().await;
        Ok(records.get(provider_payment_id).cloned())
    }

    async fn records_for_order(&self, order_id: &str) -> Result<Vec<PaymentRecord>> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|r| r.order_id == order_id)
            .cloned()
            .collect())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryInventoryStore {
    items: Arc<RwLock<HashMap<String, InventoryItem>>>,
    ingredients: Arc<RwLock<HashMap<String, IngredientStock>>>,
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    async fn get_item(&self, item_id: &str) -> Result<Option<InventoryItem>> {
        let items = self.items.read().await;
        Ok(items.get(item_id).cloned())
    }

    async fn store_item(&self, item: InventoryItem) -> Result<()> {
        let mut items = self.items.write().await;
        items.insert(item.id.clone(), item);
        Ok(())
    }

    async fn get_ingredient(&self, ingredient_id: &str) -> Result<Option<IngredientStock>> {
        let ingredients = self.ingredients.read().await;
        Ok(ingredients.get(ingredient_id).cloned())
    }

    async fn store_ingredient(&self, stock: IngredientStock) -> Result<()> {
        let mut ingredients = self.ingredients.write().await;
        ingredients.insert(stock.id.clone(), stock);
        Ok(())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryNotificationStore {
    tasks: Arc<RwLock<HashMap<Uuid, NotificationTask>>>,
}

impl InMemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationStore for InMemoryNotificationStore {
    async fn enqueue(&self, task: NotificationTask) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        tasks.insert(task.id, task);
        Ok(())
    }

    async fn update(&self, task: NotificationTask) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        tasks.insert(task.id, task);
        Ok(())
    }

    async fn due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<NotificationTask>> {
        let tasks = self.tasks.read().await;
        let mut due: Vec<NotificationTask> = tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending && t.next_attempt_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|t| t.next_attempt_at);
        due.truncate(limit);
        Ok(due)
    }

    async fn get(&self, id: Uuid) -> Result<Option<NotificationTask>> {
        let tasks = self.tasks.read().await;
        Ok(tasks.get(&id).cloned())
    }

    async fn for_order(&self, order_id: &str) -> Result<Vec<NotificationTask>> {
        let tasks = self.tasks.read().await;
        Ok(tasks
            .values()
            .filter(|t| t.order_id == order_id)
            .cloned()
            .collect())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryTenantStore {
    tenants: Arc<RwLock<HashMap<String, Tenant>>>,
}

impl InMemoryTenantStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TenantStore for InMemoryTenantStore {
    async fn get(&self, tenant_id: &str) -> Result<Option<Tenant>> {
        let tenants = self.tenants.read().await;
        Ok(tenants.get(tenant_id).cloned())
    }

    async fn store(&self, tenant: Tenant) -> Result<()> {
        let mut tenants = self.tenants.write().await;
        tenants.insert(tenant.id.clone(), tenant);
        Ok(())
    }

    async fn set_secrets_encrypted(&self, tenant_id: &str, encrypted: bool) -> Result<()> {
        let mut tenants = self.tenants.write().await;
        let tenant = tenants
            .get_mut(tenant_id)
            .ok_or_else(|| PaymentError::NotFound(format!("tenant {tenant_id}")))?;
        tenant.secrets_encrypted = encrypted;
        Ok(())
    }
}

#[derive(Default, Clone)]
pub struct InMemorySecretStore {
    secrets: Arc<RwLock<HashMap<(String, SecretType), EncryptedSecret>>>,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn put(&self, secret: EncryptedSecret) -> Result<()> {
        let mut secrets = self.secrets.write().await;
        secrets.insert((secret.tenant_id.clone(), secret.secret_type), secret);
        Ok(())
    }

    async fn get(
        &self,
        tenant_id: &str,
        secret_type: SecretType,
    ) -> Result<Option<EncryptedSecret>> {
        let secrets = self.secrets.read().await;
        Ok(secrets.get(&(tenant_id.to_string(), secret_type)).cloned())
    }
}
