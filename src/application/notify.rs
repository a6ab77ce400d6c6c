use crate::domain::notification::{NotificationTask, TaskStatus};
use crate::domain::order::Order;
use crate::domain::ports::{
    ClockRef, EmailMessage, MailSenderRef, NotificationStoreRef, OrderStoreRef, TenantStoreRef,
};
use crate::error::Result;
use uuid::Uuid;

/// Default bound for one processing pass.
pub const DEFAULT_BATCH: usize = 10;

/// Tally of one `process_batch` pass.
#[derive(Debug, Default, PartialEq, Clone)]
pub struct BatchReport {
    pub sent: usize,
    pub retried: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl BatchReport {
    pub fn processed(&self) -> usize {
        self.sent + self.retried + self.failed + self.cancelled
    }
}

/// Durable retry queue for order-confirmation messages.
///
/// The dispatcher is the one component with internal retry/backoff: nothing
/// external re-triggers a failed send, so due tasks are re-attempted on the
/// schedule in [`crate::domain::notification::BACKOFF_MINUTES`].
pub struct NotificationDispatcher {
    orders: OrderStoreRef,
    tasks: NotificationStoreRef,
    tenants: TenantStoreRef,
    mailer: MailSenderRef,
    clock: ClockRef,
}

impl NotificationDispatcher {
    pub fn new(
        orders: OrderStoreRef,
        tasks: NotificationStoreRef,
        tenants: TenantStoreRef,
        mailer: MailSenderRef,
        clock: ClockRef,
    ) -> Self {
        Self {
            orders,
            tasks,
            tenants,
            mailer,
            clock,
        }
    }

    /// Renders the confirmation message for a freshly paid order and queues
    /// it for delivery. Called once per confirmed order.
    pub async fn enqueue(&self, order: &Order, recipient: &str) -> Result<Uuid> {
        let tenant_name = match self.tenants.get(&order.tenant_id).await? {
            Some(tenant) => tenant.name,
            None => order.tenant_id.clone(),
        };
        let (subject, html) = render_payment_approved(&tenant_name, order);

        let task = NotificationTask::new(&order.id, recipient, subject, html, self.clock.now());
        let task_id = task.id;
        self.tasks.enqueue(task).await?;
        tracing::info!(order_id = %order.id, %task_id, "queued confirmation notification");
        Ok(task_id)
    }

    /// Processes up to `limit` due tasks: re-validates the order, attempts
    /// delivery, and applies the backoff schedule on failure.
    pub async fn process_batch(&self, limit: usize) -> Result<BatchReport> {
        let now = self.clock.now();
        let due = self.tasks.due(now, limit).await?;
        let mut report = BatchReport::default();

        for mut task in due {
            let still_paid = self
                .orders
                .get(&task.order_id)
                .await?
                .is_some_and(|order| order.is_paid);

            if !still_paid {
                // A refund or void between enqueue and delivery must not
                // produce a stale confirmation.
                tracing::warn!(task_id = %task.id, order_id = %task.order_id, "cancelling notification, order no longer paid");
                task.cancel("order no longer paid");
                report.cancelled += 1;
                self.tasks.update(task).await?;
                continue;
            }

            let message = EmailMessage {
                to: task.recipient.clone(),
                subject: task.subject.clone(),
                html: task.payload.clone(),
            };
            match self.mailer.send(&message).await {
                Ok(()) => {
                    task.record_sent();
                    report.sent += 1;
                }
                Err(e) => {
                    task.record_failure(e.to_string(), now);
                    if task.status == TaskStatus::Failed {
                        tracing::error!(task_id = %task.id, attempts = task.attempts, "notification permanently failed");
                        report.failed += 1;
                    } else {
                        tracing::warn!(task_id = %task.id, attempts = task.attempts, "notification failed, will retry");
                        report.retried += 1;
                    }
                }
            }
            self.tasks.update(task).await?;
        }

        Ok(report)
    }

    /// Resolves the recipient for an order's confirmation, if any.
    pub fn recipient_for(order: &Order) -> Option<&str> {
        order.customer_email.as_deref()
    }
}

/// Subject and HTML body for the payment-approved message.
fn render_payment_approved(tenant_name: &str, order: &Order) -> (String, String) {
    let subject = format!("Pedido #{} confirmado", order.order_number);

    let items: String = order
        .lines
        .iter()
        .map(|line| {
            format!(
                "<tr><td>{} x{}</td><td>${}</td></tr>",
                line.name,
                line.quantity,
                line.unit_price * rust_decimal::Decimal::from(line.quantity)
            )
        })
        .collect();

    let html = format!(
        "<h1>Pedido #{} confirmado</h1>\
         <p>Gracias por tu compra en {}.</p>\
         <table>{}</table>\
         <p>Total: ${}</p>",
        order.order_number, tenant_name, items, order.total_amount
    );
    (subject, html)
}
