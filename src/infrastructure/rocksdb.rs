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
use rocksdb::{ColumnFamilyDescriptor, DB, Options};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub const CF_ORDERS: &str = "orders";
pub const CF_INTENTS: &str = "payment_intents";
pub const CF_RECORDS: &str = "payment_records";
pub const CF_TASKS: &str = "notification_tasks";
pub const CF_TENANTS: &str = "tenants";
pub const CF_SECRETS: &str = "secrets";
pub const CF_ITEMS: &str = "inventory_items";
pub const CF_INGREDIENTS: &str = "ingredients";

const ALL_CFS: [&str; 8] = [
    CF_ORDERS,
    CF_INTENTS,
    CF_RECORDS,
    CF_TASKS,
    CF_TENANTS,
    CF_SECRETS,
    CF_ITEMS,
    CF_INGREDIENTS,
];

/// Persistent store backed by RocksDB, one column family per logical
/// table. Rate windows are deliberately absent: they are ephemeral by
/// design and rebuilt on restart.
///
/// `Clone` shares the underlying `Arc<DB>`. The conditional updates
/// (paid/deducted flags, unique record insert) serialize through
/// `write_lock`; RocksDB itself only guarantees single-key atomicity.
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a database at `path`, ensuring all column families
    /// exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;
        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn put_json<T: Serialize>(&self, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.db.cf_handle(cf_name).ok_or_else(|| {
            PaymentError::InternalError(Box::new(std::io::Error::other(format!(
                "column family {cf_name} not found"
            ))))
        })?;
        let bytes = serde_json::to_vec(value)?;
        self.db.put_cf(&cf, key, bytes)?;
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.db.cf_handle(cf_name).ok_or_else(|| {
            PaymentError::InternalError(Box::new(std::io::Error::other(format!(
                "column family {cf_name} not found"
            ))))
        })?;
        match self.db.get_cf(&cf, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan_json<T: DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self.db.cf_handle(cf_name).ok_or_else(|| {
            PaymentError::InternalError(Box::new(std::io::Error::other(format!(
                "column family {cf_name} not found"
            ))))
        })?;
        let mut values = Vec::new();
        for item in self.db.iterator_cf(&cf, rocksdb::IteratorMode::Start) {
            let (_key, bytes) =
                item.map_err(|e| PaymentError::InternalError(Box::new(e)))?;
            values.push(serde_json::from_slice(&bytes)?);
        }
        Ok(values)
    }

    fn secret_key(tenant_id: &str, secret_type: SecretType) -> Vec<u8> {
        let suffix = match secret_type {
            SecretType::AccessToken => "access_token",
            SecretType::RefreshToken => "refresh_token",
        };
        format!("{tenant_id}:{suffix}").into_bytes()
    }
}

#[async_trait]
impl OrderStore for RocksDBStore {
    async fn get(&self, order_id: &str) -> Result<Option<Order>> {
        self.get_json(CF_ORDERS, order_id.as_bytes())
    }

    async fn store(&self, order: Order) -> Result<()> {
        self.put_json(CF_ORDERS, order.id.clone().as_bytes(), &order)
    }

    async fn set_paid_if_unpaid(&self, order_id: &str, meta: PaymentMeta) -> Result<bool> {
        let _guard = self.write_lock.lock().unwrap();
        let mut order: Order = self
            .get_json(CF_ORDERS, order_id.as_bytes())?
            .ok_or_else(|| PaymentError::NotFound(format!("order {order_id}")))?;
        if order.is_paid {
            return Ok(false);
        }
        order.apply_approval(meta);
        self.put_json(CF_ORDERS, order_id.as_bytes(), &order)?;
        Ok(true)
    }

    async fn set_stock_deducted_if_not(&self, order_id: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().unwrap();
        let mut order: Order = self
            .get_json(CF_ORDERS, order_id.as_bytes())?
            .ok_or_else(|| PaymentError::NotFound(format!("order {order_id}")))?;
        if order.stock_deducted {
            return Ok(false);
        }
        order.stock_deducted = true;
        self.put_json(CF_ORDERS, order_id.as_bytes(), &order)?;
        Ok(true)
    }

    async fn record_verdict(&self, order_id: &str, state: PaymentState) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap();
        let mut order: Order = self
            .get_json(CF_ORDERS, order_id.as_bytes())?
            .ok_or_else(|| PaymentError::NotFound(format!("order {order_id}")))?;
        order.record_verdict(state);
        self.put_json(CF_ORDERS, order_id.as_bytes(), &order)
    }

    async fn set_status(&self, order_id: &str, status: OrderStatus) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap();
        let mut order: Order = self
            .get_json(CF_ORDERS, order_id.as_bytes())?
            .ok_or_else(|| PaymentError::NotFound(format!("order {order_id}")))?;
        order.status = status;
        self.put_json(CF_ORDERS, order_id.as_bytes(), &order)
    }

    async fn all(&self) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self.scan_json(CF_ORDERS)?;
        orders.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(orders)
    }
}

#[async_trait]
impl PaymentStore for RocksDBStore {
    async fn store_intent(&self, intent: PaymentIntent) -> Result<()> {
        self.put_json(CF_INTENTS, intent.order_id.clone().as_bytes(), &intent)
    }

    async fn intent_for_order(&self, order_id: &str) -> Result<Option<PaymentIntent>> {
        self.get_json(CF_INTENTS, order_id.as_bytes())
    }

    async fn try_insert_record(&self, record: PaymentRecord) -> Result<bool> {
        let _guard = self.write_lock.lock().unwrap();
        let key = record.provider_payment_id.clone();
        let existing: Option<PaymentRecord> = self.get_json(CF_RECORDS, key.as_bytes())?;
        if existing.is_some() {
            return Ok(false);
        }
        self.put_json(CF_RECORDS, key.as_bytes(), &record)?;
        Ok(true)
    }

    async fn get_record(&self, provider_payment_id: &str) -> Result<Option<PaymentRecord>> {
        self.get_json(CF_RECORDS, provider_payment_id.as_bytes())
    }

    async fn records_for_order(&self, order_id: &str) -> Result<Vec<PaymentRecord>> {
        let records: Vec<PaymentRecord> = self.scan_json(CF_RECORDS)?;
        Ok(records
            .into_iter()
            .filter(|r| r.order_id == order_id)
            .collect())
    }
}

#[async_trait]
impl InventoryStore for RocksDBStore {
    async fn get_item(&self, item_id: &str) -> Result<Option<InventoryItem>> {
        self.get_json(CF_ITEMS, item_id.as_bytes())
    }

    async fn store_item(&self, item: InventoryItem) -> Result<()> {
        self.put_json(CF_ITEMS, item.id.clone().as_bytes(), &item)
    }

    async fn get_ingredient(&self, ingredient_id: &str) -> Result<Option<IngredientStock>> {
        self.get_json(CF_INGREDIENTS, ingredient_id.as_bytes())
    }

    async fn store_ingredient(&self, stock: IngredientStock) -> Result<()> {
        self.put_json(CF_INGREDIENTS, stock.id.clone().as_bytes(), &stock)
    }
}

#[async_trait]
impl NotificationStore for RocksDBStore {
    async fn enqueue(&self, task: NotificationTask) -> Result<()> {
        self.put_json(CF_TASKS, task.id.as_bytes(), &task)
    }

    async fn update(&self, task: NotificationTask) -> Result<()> {
        self.put_json(CF_TASKS, task.id.as_bytes(), &task)
    }

    async fn due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<NotificationTask>> {
        let tasks: Vec<NotificationTask> = self.scan_json(CF_TASKS)?;
        let mut due: Vec<NotificationTask> = tasks
            .into_iter()
            .filter(|t| t.status == TaskStatus::Pending && t.next_attempt_at <= now)
            .collect();
        due.sort_by_key(|t| t.next_attempt_at);
        due.truncate(limit);
        Ok(due)
    }

    async fn get(&self, id: Uuid) -> Result<Option<NotificationTask>> {
        self.get_json(CF_TASKS, id.as_bytes())
    }

    async fn for_order(&self, order_id: &str) -> Result<Vec<NotificationTask>> {
        let tasks: Vec<NotificationTask> = self.scan_json(CF_TASKS)?;
        Ok(tasks.into_iter().filter(|t| t.order_id == order_id).collect())
    }
}

#[async_trait]
impl TenantStore for RocksDBStore {
    async fn get(&self, tenant_id: &str) -> Result<Option<Tenant>> {
        self.get_json(CF_TENANTS, tenant_id.as_bytes())
    }

    async fn store(&self, tenant: Tenant) -> Result<()> {
        self.put_json(CF_TENANTS, tenant.id.clone().as_bytes(), &tenant)
    }

    async fn set_secrets_encrypted(&self, tenant_id: &str, encrypted: bool) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap();
        let mut tenant: Tenant = self
            .get_json(CF_TENANTS, tenant_id.as_bytes())?
            .ok_or_else(|| PaymentError::NotFound(format!("tenant {tenant_id}")))?;
        tenant.secrets_encrypted = encrypted;
        self.put_json(CF_TENANTS, tenant_id.as_bytes(), &tenant)
    }
}

#[async_trait]
impl SecretStore for RocksDBStore {
    async fn put(&self, secret: EncryptedSecret) -> Result<()> {
        let key = Self::secret_key(&secret.tenant_id, secret.secret_type);
        self.put_json(CF_SECRETS, &key, &secret)
    }

    async fn get(
        &self,
        tenant_id: &str,
        secret_type: SecretType,
    ) -> Result<Option<EncryptedSecret>> {
        self.get_json(CF_SECRETS, &Self::secret_key(tenant_id, secret_type))
    }
}
