use crate::domain::ports::{ClockRef, GatewayRef, SecretStoreRef, TenantStoreRef};
use crate::domain::secret::{EncryptedSecret, SecretType};
use crate::domain::tenant::Tenant;
use crate::error::{PaymentError, Result};
use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit},
};
use chrono::Duration;
use rand::RngCore;
use std::sync::Once;
use zeroize::Zeroize;

/// 256-bit master key for the per-tenant secret vault.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct VaultKey([u8; 32]);

impl VaultKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    fn cipher(&self) -> XChaCha20Poly1305 {
        XChaCha20Poly1305::new((&self.0).into())
    }
}

fn encrypt(key: &VaultKey, plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
    let mut nonce = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut nonce);
    let ciphertext = key
        .cipher()
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|e| {
            PaymentError::InternalError(Box::new(std::io::Error::other(format!(
                "secret encryption failed: {e}"
            ))))
        })?;
    Ok((ciphertext, nonce.to_vec()))
}

fn decrypt(key: &VaultKey, ciphertext: &[u8], nonce: &[u8]) -> Result<Vec<u8>> {
    key.cipher()
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|e| {
            PaymentError::InternalError(Box::new(std::io::Error::other(format!(
                "secret decryption failed: {e}"
            ))))
        })
}

/// Encrypt/decrypt/rotate access to per-tenant provider credentials.
///
/// Reads fall back to the tenant's legacy plaintext columns while
/// `secrets_encrypted` is false (migration period). Writes flip the flag
/// only after every token is durably stored, so a partial failure leaves
/// the tenant eligible for a retried migration.
pub struct SecretVault {
    tenants: TenantStoreRef,
    secrets: SecretStoreRef,
    gateway: GatewayRef,
    key: VaultKey,
    clock: ClockRef,
    plaintext_warning: Once,
}

impl SecretVault {
    pub fn new(
        tenants: TenantStoreRef,
        secrets: SecretStoreRef,
        gateway: GatewayRef,
        key: VaultKey,
        clock: ClockRef,
    ) -> Self {
        Self {
            tenants,
            secrets,
            gateway,
            key,
            clock,
            plaintext_warning: Once::new(),
        }
    }

    async fn tenant(&self, tenant_id: &str) -> Result<Tenant> {
        self.tenants
            .get(tenant_id)
            .await?
            .ok_or_else(|| PaymentError::NotFound(format!("tenant {tenant_id}")))
    }

    async fn decrypted(
        &self,
        tenant_id: &str,
        secret_type: SecretType,
    ) -> Result<Option<(String, EncryptedSecret)>> {
        match self.secrets.get(tenant_id, secret_type).await? {
            Some(secret) => {
                let plaintext = decrypt(&self.key, &secret.ciphertext, &secret.nonce)?;
                let token = String::from_utf8(plaintext).map_err(|e| {
                    PaymentError::InternalError(Box::new(std::io::Error::other(format!(
                        "stored secret is not utf-8: {e}"
                    ))))
                })?;
                Ok(Some((token, secret)))
            }
            None => Ok(None),
        }
    }

    fn warn_plaintext(&self, tenant_id: &str) {
        self.plaintext_warning.call_once(|| {
            tracing::warn!(
                tenant_id,
                "serving plaintext provider token; tenant has not migrated to encrypted secrets"
            );
        });
    }

    /// Returns the tenant's provider access token, refreshing it
    /// transparently when the stored encrypted token has expired.
    pub async fn access_token(&self, tenant_id: &str) -> Result<String> {
        let tenant = self.tenant(tenant_id).await?;

        if tenant.secrets_encrypted {
            match self.decrypted(tenant_id, SecretType::AccessToken).await? {
                Some((token, secret)) => {
                    if secret.is_expired(self.clock.now()) {
                        tracing::info!(tenant_id, "access token expired, refreshing");
                        return self.refresh_access_token(tenant_id).await;
                    }
                    Ok(token)
                }
                None => Err(PaymentError::CredentialMissing(tenant_id.to_string())),
            }
        } else {
            match tenant.legacy_access_token {
                Some(token) => {
                    self.warn_plaintext(tenant_id);
                    Ok(token)
                }
                None => Err(PaymentError::CredentialMissing(tenant_id.to_string())),
            }
        }
    }

    async fn refresh_token_value(&self, tenant: &Tenant) -> Result<Option<String>> {
        if tenant.secrets_encrypted {
            Ok(self
                .decrypted(&tenant.id, SecretType::RefreshToken)
                .await?
                .map(|(token, _)| token))
        } else {
            Ok(tenant.legacy_refresh_token.clone())
        }
    }

    /// Exchanges the stored refresh token for a new grant and rotates the
    /// stored credentials. On any failure the existing tokens are left
    /// untouched: a stale-but-working token beats no token at all.
    pub async fn refresh_access_token(&self, tenant_id: &str) -> Result<String> {
        let tenant = self.tenant(tenant_id).await?;
        let refresh = self
            .refresh_token_value(&tenant)
            .await?
            .ok_or_else(|| PaymentError::CredentialMissing(tenant_id.to_string()))?;

        let grant = self.gateway.refresh_token(&refresh).await.map_err(|e| {
            tracing::warn!(tenant_id, error = %e, "provider token refresh failed");
            match e {
                // A gateway outage is transient; only a rejected refresh
                // token means the tenant must reconnect.
                PaymentError::UpstreamUnavailable(_) => e,
                _ => PaymentError::CredentialMissing(tenant_id.to_string()),
            }
        })?;

        let ttl = grant.expires_in_secs.map(|secs| Duration::seconds(secs as i64));
        self.store_tokens(
            tenant_id,
            &grant.access_token,
            grant.refresh_token.as_deref(),
            ttl,
        )
        .await?;

        Ok(grant.access_token)
    }

    /// Encrypts and persists the given tokens. `secrets_encrypted` flips
    /// true only after both writes succeeded.
    pub async fn store_tokens(
        &self,
        tenant_id: &str,
        access_token: &str,
        refresh_token: Option<&str>,
        ttl: Option<Duration>,
    ) -> Result<()> {
        // Ensure the tenant exists before writing secrets against it.
        self.tenant(tenant_id).await?;

        self.put_encrypted(tenant_id, SecretType::AccessToken, access_token, ttl)
            .await?;
        if let Some(refresh) = refresh_token {
            self.put_encrypted(tenant_id, SecretType::RefreshToken, refresh, None)
                .await?;
        }

        self.tenants.set_secrets_encrypted(tenant_id, true).await?;
        tracing::info!(tenant_id, "stored encrypted provider tokens");
        Ok(())
    }

    async fn put_encrypted(
        &self,
        tenant_id: &str,
        secret_type: SecretType,
        plaintext: &str,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let now = self.clock.now();
        let (ciphertext, nonce) = encrypt(&self.key, plaintext.as_bytes())?;
        let version = match self.secrets.get(tenant_id, secret_type).await? {
            Some(previous) => previous.version + 1,
            None => 1,
        };
        self.secrets
            .put(EncryptedSecret {
                tenant_id: tenant_id.to_string(),
                secret_type,
                ciphertext,
                nonce,
                expires_at: secret_type.expiry_from(now, ttl),
                version,
            })
            .await
    }
}
