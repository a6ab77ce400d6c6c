use crate::application::fulfillment::FulfillmentTrigger;
use crate::application::notify::NotificationDispatcher;
use crate::application::secrets::SecretVault;
use crate::domain::order::{Order, PaymentState};
use crate::domain::payment::ProviderPayment;
use crate::domain::ports::{GatewayRef, OrderStoreRef, PaymentStoreRef};
use crate::error::{PaymentError, Result};
use std::sync::Arc;

/// Result of a finalize call. Every variant carries the order as it stood
/// after the call, so handlers can answer without a second read.
#[derive(Debug, PartialEq, Clone)]
pub enum FinalizeOutcome {
    /// This call confirmed the payment and triggered the side effects.
    Applied(Order),
    /// The order was already paid; nothing was mutated.
    AlreadyProcessed(Order),
    /// The provider has not approved the payment; only the verdict was
    /// recorded.
    NotApproved { order: Order, state: PaymentState },
}

impl FinalizeOutcome {
    pub fn order(&self) -> &Order {
        match self {
            FinalizeOutcome::Applied(order) => order,
            FinalizeOutcome::AlreadyProcessed(order) => order,
            FinalizeOutcome::NotApproved { order, .. } => order,
        }
    }

    /// The status string surfaced to poll/webhook callers.
    pub fn status_label(&self) -> &'static str {
        match self {
            FinalizeOutcome::Applied(_) | FinalizeOutcome::AlreadyProcessed(_) => "approved",
            FinalizeOutcome::NotApproved { .. } => "pending",
        }
    }
}

/// The single idempotent convergence point for both ingestion paths.
///
/// Correctness under concurrency rests on two store-level guards: the
/// `is_paid` short-circuit, and the unique constraint on
/// `provider_payment_id` as the final backstop against races and duplicate
/// provider redelivery.
pub struct ReconciliationEngine {
    orders: OrderStoreRef,
    payments: PaymentStoreRef,
    vault: Arc<SecretVault>,
    gateway: GatewayRef,
    fulfillment: Arc<FulfillmentTrigger>,
    dispatcher: Arc<NotificationDispatcher>,
}

impl ReconciliationEngine {
    pub fn new(
        orders: OrderStoreRef,
        payments: PaymentStoreRef,
        vault: Arc<SecretVault>,
        gateway: GatewayRef,
        fulfillment: Arc<FulfillmentTrigger>,
        dispatcher: Arc<NotificationDispatcher>,
    ) -> Self {
        Self {
            orders,
            payments,
            vault,
            gateway,
            fulfillment,
            dispatcher,
        }
    }

    /// Webhook path: the provider pushed a payment id. Fetch the full
    /// payment, resolve the order through its external reference, finalize.
    pub async fn process_webhook(
        &self,
        tenant_id: &str,
        payment_id: &str,
    ) -> Result<FinalizeOutcome> {
        let token = self.vault.access_token(tenant_id).await?;
        let payment = self.gateway.fetch_payment(&token, payment_id).await?;
        let order_id = payment.external_reference.clone().ok_or_else(|| {
            PaymentError::ValidationError(format!(
                "payment {payment_id} carries no external reference"
            ))
        })?;
        tracing::info!(tenant_id, payment_id, order_id, "webhook payment received");
        self.finalize(&order_id, &payment).await
    }

    /// Poll path: the caller asks about an order. Search the provider by
    /// external reference and finalize against the best candidate. Safe to
    /// call repeatedly.
    pub async fn poll_order(&self, order_id: &str) -> Result<FinalizeOutcome> {
        let order = self.load(order_id).await?;
        if order.is_paid {
            return Ok(FinalizeOutcome::AlreadyProcessed(order));
        }

        let token = self.vault.access_token(&order.tenant_id).await?;
        let candidates = self.gateway.search_by_reference(&token, order_id).await?;
        tracing::debug!(order_id, candidates = candidates.len(), "poll search result");

        let Some(payment) = select_most_recent(candidates) else {
            return Ok(FinalizeOutcome::NotApproved {
                order,
                state: PaymentState::Pending,
            });
        };
        self.finalize(order_id, &payment).await
    }

    /// The idempotent finalize operation. Both ingestion paths converge
    /// here; nothing else flips an order to paid.
    pub async fn finalize(
        &self,
        order_id: &str,
        payment: &ProviderPayment,
    ) -> Result<FinalizeOutcome> {
        let order = self.load(order_id).await?;

        if order.is_paid {
            return Ok(FinalizeOutcome::AlreadyProcessed(order));
        }

        if payment.status != PaymentState::Approved {
            self.orders.record_verdict(order_id, payment.status).await?;
            let order = self.load(order_id).await?;
            return Ok(FinalizeOutcome::NotApproved {
                order,
                state: payment.status,
            });
        }

        let inserted = self
            .payments
            .try_insert_record(payment.clone().into_record(order_id))
            .await?;
        if !inserted {
            // A concurrent finalize (or a provider redelivery) holds this
            // payment id. Re-check rather than retry the insert.
            return self.resolve_duplicate(order_id).await;
        }

        let meta = crate::domain::order::PaymentMeta {
            provider_payment_id: payment.id.clone(),
            method: payment.payment_method.clone(),
            payer_email: payment.payer_email.clone(),
            approved_at: payment.approved_at,
        };
        if !self.orders.set_paid_if_unpaid(order_id, meta).await? {
            // A different payment confirmed the order between our load and
            // the conditional update.
            let order = self.load(order_id).await?;
            return Ok(FinalizeOutcome::AlreadyProcessed(order));
        }

        let order = self.load(order_id).await?;
        tracing::info!(order_id, payment_id = %payment.id, "order finalized as paid");
        self.run_side_effects(&order).await;
        Ok(FinalizeOutcome::Applied(order))
    }

    /// The losing side of a duplicate insert: re-check once, then once
    /// more, then treat as already processed. The winner's conditional
    /// update lands between the checks in any realistic interleaving.
    async fn resolve_duplicate(&self, order_id: &str) -> Result<FinalizeOutcome> {
        for _ in 0..2 {
            let order = self.load(order_id).await?;
            if order.is_paid {
                return Ok(FinalizeOutcome::AlreadyProcessed(order));
            }
            tokio::task::yield_now().await;
        }
        let order = self.load(order_id).await?;
        tracing::warn!(order_id, "duplicate payment insert with order still unpaid, treating as processed");
        Ok(FinalizeOutcome::AlreadyProcessed(order))
    }

    /// At-least-once consequences of the first successful finalize. Their
    /// failure is logged and left to the next cycle, never rolled back into
    /// the payment confirmation.
    async fn run_side_effects(&self, order: &Order) {
        match NotificationDispatcher::recipient_for(order) {
            Some(recipient) => {
                if let Err(e) = self.dispatcher.enqueue(order, recipient).await {
                    tracing::warn!(order_id = %order.id, error = %e, "failed to queue confirmation");
                }
            }
            None => {
                tracing::debug!(order_id = %order.id, "order has no customer email, skipping notification");
            }
        }

        if let Err(e) = self.fulfillment.trigger_on_payment(order).await {
            tracing::warn!(order_id = %order.id, error = %e, "stock deduction failed");
        }
    }

    async fn load(&self, order_id: &str) -> Result<Order> {
        self.orders
            .get(order_id)
            .await?
            .ok_or_else(|| PaymentError::NotFound(format!("order {order_id}")))
    }
}

/// Picks the authoritative candidate among multiple payments matching one
/// external reference: latest `approved_at` wins; candidates that were
/// never approved rank last in their original order.
fn select_most_recent(mut payments: Vec<ProviderPayment>) -> Option<ProviderPayment> {
    if payments.is_empty() {
        return None;
    }
    payments.sort_by_key(|p| p.approved_at);
    payments.pop()
}
