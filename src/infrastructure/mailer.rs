use crate::domain::ports::{EmailMessage, MailSender};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::RwLock;

/// Mail sink that records every delivered message.
///
/// `fail_times(n)` makes the next n sends fail, which is how the
/// dispatcher's backoff path is exercised without a real SMTP collaborator.
#[derive(Default, Clone)]
pub struct RecordingMailer {
    sent: Arc<RwLock<Vec<EmailMessage>>>,
    failures_remaining: Arc<AtomicU32>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_times(&self, n: u32) {
        self.failures_remaining.store(n, Ordering::SeqCst);
    }

    pub async fn sent(&self) -> Vec<EmailMessage> {
        self.sent.read().await.clone()
    }
}

#[async_trait]
impl MailSender for RecordingMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(PaymentError::UpstreamUnavailable(
                "mail delivery failed".to_string(),
            ));
        }
        let mut sent = self.sent.write().await;
        sent.push(message.clone());
        Ok(())
    }
}
