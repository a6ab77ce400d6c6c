use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// The kinds of provider credentials stored per tenant.
///
/// Each variant carries its own expiry semantics: access tokens expire on a
/// provider-supplied TTL, refresh tokens do not expire.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum SecretType {
    AccessToken,
    RefreshToken,
}

impl SecretType {
    /// Expiry to apply when storing a secret of this type. `ttl` is the
    /// provider-reported lifetime, honoured only for access tokens.
    pub fn expiry_from(
        &self,
        now: DateTime<Utc>,
        ttl: Option<Duration>,
    ) -> Option<DateTime<Utc>> {
        match self {
            SecretType::AccessToken => ttl.map(|ttl| now + ttl),
            SecretType::RefreshToken => None,
        }
    }
}

/// An encrypted per-tenant credential, exclusively owned by its tenant row
/// and rotated on refresh.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct EncryptedSecret {
    pub tenant_id: String,
    pub secret_type: SecretType,
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>,
    pub expires_at: Option<DateTime<Utc>>,
    pub version: u32,
}

impl EncryptedSecret {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if now >= at)
    }
}
