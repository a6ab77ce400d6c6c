use crate::domain::order::{Amount, PaymentState};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An outbound checkout session created with the provider.
///
/// `external_reference` is deterministically the order id, so a payment
/// coming back from the provider resolves to its order without any extra
/// lookup state.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct PaymentIntent {
    pub id: Uuid,
    pub tenant_id: String,
    pub order_id: String,
    /// Provider-side preference/session id.
    pub provider_reference: String,
    pub external_reference: String,
    pub amount: Amount,
    pub currency: String,
    pub status: PaymentState,
    pub checkout_url: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl PaymentIntent {
    /// A pending intent that has not reached its expiry is still usable for
    /// checkout and must not be duplicated.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.status == PaymentState::Pending && now < self.expires_at
    }
}

/// An authoritative payment confirmation applied to an order.
///
/// `provider_payment_id` is unique across the store; a duplicate insert is
/// how a concurrent finalize race or a provider redelivery is detected.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct PaymentRecord {
    pub provider_payment_id: String,
    pub order_id: String,
    pub amount: Decimal,
    pub status: PaymentState,
    pub status_detail: Option<String>,
    pub method: Option<String>,
    pub payer_email: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
}

/// A payment as returned by the provider's API, either fetched by id
/// (webhook path) or found by external reference (poll path).
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct ProviderPayment {
    pub id: String,
    pub status: PaymentState,
    pub status_detail: Option<String>,
    pub external_reference: Option<String>,
    pub transaction_amount: Decimal,
    pub payment_method: Option<String>,
    pub payer_email: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
}

impl ProviderPayment {
    pub fn into_record(self, order_id: &str) -> PaymentRecord {
        PaymentRecord {
            provider_payment_id: self.id,
            order_id: order_id.to_string(),
            amount: self.transaction_amount,
            status: self.status,
            status_detail: self.status_detail,
            method: self.payment_method,
            payer_email: self.payer_email,
            approved_at: self.approved_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn test_intent_activity_window() {
        let created = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let intent = PaymentIntent {
            id: Uuid::new_v4(),
            tenant_id: "t-1".to_string(),
            order_id: "o-1".to_string(),
            provider_reference: "pref-1".to_string(),
            external_reference: "o-1".to_string(),
            amount: Amount::new(dec!(100)).unwrap(),
            currency: "ARS".to_string(),
            status: PaymentState::Pending,
            checkout_url: "https://gateway.test/checkout/pref-1".to_string(),
            expires_at: created + chrono::Duration::hours(24),
            created_at: created,
        };

        assert!(intent.is_active(created + chrono::Duration::hours(1)));
        assert!(!intent.is_active(created + chrono::Duration::hours(25)));

        let mut expired = intent.clone();
        expired.status = PaymentState::Expired;
        assert!(!expired.is_active(created));
    }

    #[test]
    fn test_provider_payment_into_record() {
        let payment = ProviderPayment {
            id: "mp-77".to_string(),
            status: PaymentState::Approved,
            status_detail: Some("accredited".to_string()),
            external_reference: Some("o-9".to_string()),
            transaction_amount: dec!(1500),
            payment_method: Some("account_money".to_string()),
            payer_email: Some("payer@example.com".to_string()),
            approved_at: None,
        };

        let record = payment.into_record("o-9");
        assert_eq!(record.provider_payment_id, "mp-77");
        assert_eq!(record.order_id, "o-9");
        assert_eq!(record.amount, dec!(1500));
        assert_eq!(record.status, PaymentState::Approved);
    }
}
