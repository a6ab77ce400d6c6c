use crate::domain::payment::ProviderPayment;
use crate::domain::ports::{
    CheckoutRequest, CheckoutSession, PaymentGateway, TokenGrant,
};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::RwLock;

/// In-memory double for the external payment provider.
///
/// Scenarios and tests register provider-side payments and refresh grants
/// up front; the handlers then exercise the same gateway port the real
/// adapter would implement. `set_unreachable` simulates a provider outage.
#[derive(Default, Clone)]
pub struct InMemoryGateway {
    payments: Arc<RwLock<HashMap<String, ProviderPayment>>>,
    refresh_grants: Arc<RwLock<HashMap<String, TokenGrant>>>,
    preference_seq: Arc<AtomicU64>,
    unreachable: Arc<AtomicBool>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register_payment(&self, payment: ProviderPayment) {
        let mut payments = self.payments.write().await;
        payments.insert(payment.id.clone(), payment);
    }

    pub async fn register_refresh_grant(&self, refresh_token: impl Into<String>, grant: TokenGrant) {
        let mut grants = self.refresh_grants.write().await;
        grants.insert(refresh_token.into(), grant);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    fn check_reachable(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            Err(PaymentError::UpstreamUnavailable(
                "payment gateway timed out".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PaymentGateway for InMemoryGateway {
    async fn create_checkout(
        &self,
        _access_token: &str,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession> {
        self.check_reachable()?;
        if request.items.is_empty() {
            return Err(PaymentError::ValidationError(
                "checkout requires at least one item".to_string(),
            ));
        }
        let seq = self.preference_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let preference_id = format!("pref-{seq}");
        Ok(CheckoutSession {
            checkout_url: format!("https://gateway.test/checkout/{preference_id}"),
            preference_id,
        })
    }

    async fn fetch_payment(
        &self,
        _access_token: &str,
        payment_id: &str,
    ) -> Result<ProviderPayment> {
        self.check_reachable()?;
        let payments = self.payments.read().await;
        payments
            .get(payment_id)
            .cloned()
            .ok_or_else(|| PaymentError::NotFound(format!("provider payment {payment_id}")))
    }

    async fn search_by_reference(
        &self,
        _access_token: &str,
        external_reference: &str,
    ) -> Result<Vec<ProviderPayment>> {
        self.check_reachable()?;
        let payments = self.payments.read().await;
        Ok(payments
            .values()
            .filter(|p| p.external_reference.as_deref() == Some(external_reference))
            .cloned()
            .collect())
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant> {
        self.check_reachable()?;
        let grants = self.refresh_grants.read().await;
        grants
            .get(refresh_token)
            .cloned()
            .ok_or_else(|| {
                PaymentError::ValidationError("refresh token rejected by provider".to_string())
            })
    }
}
