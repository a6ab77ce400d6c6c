use thiserror::Error;

/// Crate-wide error taxonomy.
///
/// Variants map to how callers are expected to react: validation and
/// not-found errors are fatal for the request, upstream errors are retried
/// through the poll path or the next notification batch, conflicts are
/// resolved by re-reading state.
#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("validation error: {0}")]
    ValidationError(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("no provider credentials for tenant {0}")]
    CredentialMissing(String),
    #[error("internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl From<serde_json::Error> for PaymentError {
    fn from(err: serde_json::Error) -> Self {
        PaymentError::InternalError(Box::new(err))
    }
}

impl From<std::io::Error> for PaymentError {
    fn from(err: std::io::Error) -> Self {
        PaymentError::InternalError(Box::new(err))
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for PaymentError {
    fn from(err: rocksdb::Error) -> Self {
        PaymentError::InternalError(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, PaymentError>;
