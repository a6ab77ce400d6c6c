use serde::{Deserialize, Serialize};

/// When recipe-based stock deduction runs for a tenant's orders. Exactly
/// one call site performs the deduction per order.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Copy, Default)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentPolicy {
    /// Deduct as soon as the payment is approved.
    #[default]
    OnPayment,
    /// Deduct when delivery is confirmed (pay-on-delivery flows).
    OnDelivery,
}

/// An independent merchant account within the platform.
///
/// `secrets_encrypted` is the credential-migration flag: while false, reads
/// fall back to the legacy plaintext columns below; it flips true only once
/// encrypted tokens are durably stored.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub secrets_encrypted: bool,
    pub legacy_access_token: Option<String>,
    pub legacy_refresh_token: Option<String>,
    pub fulfillment: FulfillmentPolicy,
}

impl Tenant {
    pub fn new(id: impl Into<String>, name: impl Into<String>, slug: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            slug: slug.into(),
            secrets_encrypted: false,
            legacy_access_token: None,
            legacy_refresh_token: None,
            fulfillment: FulfillmentPolicy::default(),
        }
    }
}
