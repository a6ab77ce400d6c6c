use crate::application::checkout::IntentTracker;
use crate::application::fulfillment::FulfillmentTrigger;
use crate::application::notify::NotificationDispatcher;
use crate::application::rate_limit::RateLimiter;
use crate::application::reconcile::ReconciliationEngine;
use crate::application::secrets::{SecretVault, VaultKey};
use crate::domain::inventory::{IngredientStock, InventoryItem};
use crate::domain::order::Order;
use crate::domain::payment::ProviderPayment;
use crate::domain::ports::{
    CheckoutItem, Clock, InventoryStoreRef, NotificationStoreRef, OrderStoreRef, PaymentStoreRef,
    SecretStoreRef, TenantStoreRef,
};
use crate::domain::tenant::Tenant;
use crate::error::{PaymentError, Result};
use crate::infrastructure::clock::ManualClock;
use crate::infrastructure::gateway::InMemoryGateway;
use crate::infrastructure::in_memory::{
    InMemoryInventoryStore, InMemoryNotificationStore, InMemoryOrderStore, InMemoryPaymentStore,
    InMemorySecretStore, InMemoryTenantStore,
};
use crate::infrastructure::mailer::RecordingMailer;
use crate::interfaces::api::{
    CreateCheckoutRequest, PaymentApi, PollRequest, WebhookRequest,
};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use std::io::{BufRead, BufReader, Read};
use std::sync::Arc;

/// One line of a scenario file: either seed data or an inbound event.
#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScenarioEvent {
    SeedTenant { tenant: Tenant },
    SeedOrder { order: Order },
    SeedItem { item: InventoryItem },
    SeedIngredient { ingredient: IngredientStock },
    /// Registers a payment on the provider side, as if the customer had
    /// completed checkout there.
    SeedProviderPayment { payment: ProviderPayment },
    Webhook {
        tenant_id: String,
        payload: Value,
    },
    Poll { order_id: String },
    Checkout {
        order_id: String,
        #[serde(default)]
        items: Vec<CheckoutItem>,
    },
    /// Runs one notification batch of the given size.
    RunNotifications { limit: usize },
    AdvanceClock { seconds: i64 },
}

/// Streaming reader for JSON-lines scenario files. Blank lines and `#`
/// comments are skipped; a malformed line surfaces as an error for that
/// line without aborting the stream.
pub struct ScenarioReader<R: Read> {
    reader: BufReader<R>,
}

impl<R: Read> ScenarioReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: BufReader::new(source),
        }
    }

    pub fn events(self) -> impl Iterator<Item = Result<ScenarioEvent>> {
        self.reader
            .lines()
            .map(|line| line.map_err(PaymentError::from))
            .filter(|line| match line {
                Ok(text) => {
                    let text = text.trim();
                    !text.is_empty() && !text.starts_with('#')
                }
                Err(_) => true,
            })
            .map(|line| {
                line.and_then(|text| serde_json::from_str(&text).map_err(PaymentError::from))
            })
    }
}

/// Everything a scenario needs to run against one wired-up stack. Doubles
/// as the fixture for integration tests, which reach into the stores and
/// collaborators directly.
pub struct Scenario {
    pub api: PaymentApi,
    pub engine: Arc<ReconciliationEngine>,
    pub tracker: Arc<IntentTracker>,
    pub fulfillment: Arc<FulfillmentTrigger>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub vault: Arc<SecretVault>,
    pub limiter: Arc<RateLimiter>,
    pub gateway: Arc<InMemoryGateway>,
    pub mailer: Arc<RecordingMailer>,
    pub clock: Arc<ManualClock>,
    pub orders: OrderStoreRef,
    pub payments: PaymentStoreRef,
    pub inventory: InventoryStoreRef,
    pub tenants: TenantStoreRef,
    pub secrets: SecretStoreRef,
    pub tasks: NotificationStoreRef,
    /// Caller ip stamped on replayed requests.
    pub caller_ip: String,
}

impl Scenario {
    /// Wires the full stack over in-memory stores, a scriptable gateway
    /// and a recording mailer, with the clock pinned at `start`.
    pub fn in_memory(start: DateTime<Utc>) -> Self {
        Self::assemble(
            Arc::new(InMemoryOrderStore::new()),
            Arc::new(InMemoryPaymentStore::new()),
            Arc::new(InMemoryInventoryStore::new()),
            Arc::new(InMemoryNotificationStore::new()),
            Arc::new(InMemoryTenantStore::new()),
            Arc::new(InMemorySecretStore::new()),
            start,
        )
    }

    /// Same wiring over a persistent RocksDB store.
    #[cfg(feature = "storage-rocksdb")]
    pub fn with_rocksdb<P: AsRef<std::path::Path>>(
        path: P,
        start: DateTime<Utc>,
    ) -> Result<Self> {
        let store = crate::infrastructure::rocksdb::RocksDBStore::open(path)?;
        Ok(Self::assemble(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store),
            start,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        orders: OrderStoreRef,
        payments: PaymentStoreRef,
        inventory: InventoryStoreRef,
        tasks: NotificationStoreRef,
        tenants: TenantStoreRef,
        secrets: SecretStoreRef,
        start: DateTime<Utc>,
    ) -> Self {
        let clock = Arc::new(ManualClock::new(start));
        let gateway = Arc::new(InMemoryGateway::new());
        let mailer = Arc::new(RecordingMailer::new());

        let vault = Arc::new(SecretVault::new(
            tenants.clone(),
            secrets.clone(),
            gateway.clone(),
            VaultKey::generate(),
            clock.clone(),
        ));
        let fulfillment = Arc::new(FulfillmentTrigger::new(
            orders.clone(),
            inventory.clone(),
            tenants.clone(),
        ));
        let dispatcher = Arc::new(NotificationDispatcher::new(
            orders.clone(),
            tasks.clone(),
            tenants.clone(),
            mailer.clone(),
            clock.clone(),
        ));
        let engine = Arc::new(ReconciliationEngine::new(
            orders.clone(),
            payments.clone(),
            vault.clone(),
            gateway.clone(),
            fulfillment.clone(),
            dispatcher.clone(),
        ));
        let tracker = Arc::new(IntentTracker::new(
            orders.clone(),
            payments.clone(),
            tenants.clone(),
            vault.clone(),
            gateway.clone(),
            clock.clone(),
            "https://orderpay.test",
        ));
        let limiter = Arc::new(RateLimiter::new(clock.clone()));
        let api = PaymentApi::new(engine.clone(), tracker.clone(), limiter.clone());

        Self {
            api,
            engine,
            tracker,
            fulfillment,
            dispatcher,
            vault,
            limiter,
            gateway,
            mailer,
            clock,
            orders,
            payments,
            inventory,
            tenants,
            secrets,
            tasks,
            caller_ip: "127.0.0.1".to_string(),
        }
    }

    /// Applies one event and returns the JSON line to report for it.
    pub async fn apply(&self, event: ScenarioEvent) -> Result<Value> {
        match event {
            ScenarioEvent::SeedTenant { tenant } => {
                let id = tenant.id.clone();
                self.tenants.store(tenant).await?;
                Ok(json!({ "seeded": "tenant", "id": id }))
            }
            ScenarioEvent::SeedOrder { order } => {
                let id = order.id.clone();
                self.orders.store(order).await?;
                Ok(json!({ "seeded": "order", "id": id }))
            }
            ScenarioEvent::SeedItem { item } => {
                let id = item.id.clone();
                self.inventory.store_item(item).await?;
                Ok(json!({ "seeded": "item", "id": id }))
            }
            ScenarioEvent::SeedIngredient { ingredient } => {
                let id = ingredient.id.clone();
                self.inventory.store_ingredient(ingredient).await?;
                Ok(json!({ "seeded": "ingredient", "id": id }))
            }
            ScenarioEvent::SeedProviderPayment { payment } => {
                let id = payment.id.clone();
                self.gateway.register_payment(payment).await;
                Ok(json!({ "seeded": "provider_payment", "id": id }))
            }
            ScenarioEvent::Webhook { tenant_id, payload } => {
                let response = self
                    .api
                    .handle_webhook(WebhookRequest {
                        tenant_id,
                        caller_ip: self.caller_ip.clone(),
                        payload,
                    })
                    .await;
                Ok(json!({ "endpoint": "webhook", "status": response.status, "body": response.body }))
            }
            ScenarioEvent::Poll { order_id } => {
                let response = self
                    .api
                    .handle_poll(PollRequest {
                        order_id,
                        caller_ip: self.caller_ip.clone(),
                    })
                    .await;
                Ok(json!({ "endpoint": "poll", "status": response.status, "body": response.body }))
            }
            ScenarioEvent::Checkout { order_id, items } => {
                let response = self
                    .api
                    .handle_create_checkout(CreateCheckoutRequest {
                        order_id,
                        items,
                        caller_ip: self.caller_ip.clone(),
                    })
                    .await;
                Ok(json!({ "endpoint": "checkout", "status": response.status, "body": response.body }))
            }
            ScenarioEvent::RunNotifications { limit } => {
                let report = self.dispatcher.process_batch(limit).await?;
                Ok(json!({
                    "notifications": {
                        "sent": report.sent,
                        "retried": report.retried,
                        "failed": report.failed,
                        "cancelled": report.cancelled,
                    }
                }))
            }
            ScenarioEvent::AdvanceClock { seconds } => {
                self.clock.advance(Duration::seconds(seconds));
                // The sweep that a long-running service does on a timer.
                let evicted = self.limiter.sweep();
                Ok(json!({
                    "clock": self.clock.now().to_rfc3339(),
                    "evicted_rate_windows": evicted,
                }))
            }
        }
    }

    /// Final state of every order and its notification tasks, for the end
    /// of a replay.
    pub async fn summary(&self) -> Result<Value> {
        let mut orders = Vec::new();
        for order in self.orders.all().await? {
            let tasks = self.tasks.for_order(&order.id).await?;
            orders.push(json!({
                "id": order.id,
                "is_paid": order.is_paid,
                "payment_status": order.payment_status,
                "stock_deducted": order.stock_deducted,
                "notifications": tasks
                    .iter()
                    .map(|t| json!({ "status": t.status, "attempts": t.attempts }))
                    .collect::<Vec<_>>(),
            }));
        }
        Ok(json!({ "orders": orders }))
    }
}
