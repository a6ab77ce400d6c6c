use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Retry delays after the 1st, 2nd, 3rd and 4th failed attempt. A task
/// failing a 4th time is marked failed permanently.
pub const BACKOFF_MINUTES: [i64; 4] = [1, 5, 30, 120];

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Sent,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Pending)
    }
}

/// A queued confirmation message for a paid order.
///
/// Holds a lookup-only reference to its order; the dispatcher re-validates
/// the order's paid state before every delivery attempt.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct NotificationTask {
    pub id: Uuid,
    pub order_id: String,
    pub recipient: String,
    pub subject: String,
    pub payload: String,
    pub status: TaskStatus,
    pub attempts: u32,
    pub next_attempt_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NotificationTask {
    pub fn new(
        order_id: impl Into<String>,
        recipient: impl Into<String>,
        subject: impl Into<String>,
        payload: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id: order_id.into(),
            recipient: recipient.into(),
            subject: subject.into(),
            payload: payload.into(),
            status: TaskStatus::Pending,
            attempts: 0,
            next_attempt_at: now,
            last_error: None,
            created_at: now,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == TaskStatus::Pending && self.next_attempt_at <= now
    }

    /// Records a failed delivery attempt: schedules the next retry per the
    /// backoff schedule, or transitions to `Failed` once the schedule is
    /// exhausted.
    pub fn record_failure(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        self.attempts += 1;
        self.last_error = Some(error.into());
        if (self.attempts as usize) < BACKOFF_MINUTES.len() {
            self.next_attempt_at = now + Duration::minutes(BACKOFF_MINUTES[self.attempts as usize - 1]);
        } else {
            self.status = TaskStatus::Failed;
        }
    }

    pub fn record_sent(&mut self) {
        self.attempts += 1;
        self.status = TaskStatus::Sent;
        self.last_error = None;
    }

    pub fn cancel(&mut self, reason: impl Into<String>) {
        self.status = TaskStatus::Cancelled;
        self.last_error = Some(reason.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn task(now: DateTime<Utc>) -> NotificationTask {
        NotificationTask::new("o-1", "client@example.com", "Order confirmed", "<p>hi</p>", now)
    }

    #[test]
    fn test_backoff_schedule() {
        let t0 = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();
        let mut t = task(t0);

        t.record_failure("timeout", t0);
        assert_eq!(t.status, TaskStatus::Pending);
        assert_eq!(t.next_attempt_at, t0 + Duration::minutes(1));

        t.record_failure("timeout", t0);
        assert_eq!(t.next_attempt_at, t0 + Duration::minutes(5));

        t.record_failure("timeout", t0);
        assert_eq!(t.next_attempt_at, t0 + Duration::minutes(30));

        // Fourth failure exhausts the schedule.
        t.record_failure("timeout", t0);
        assert_eq!(t.status, TaskStatus::Failed);
        assert_eq!(t.attempts, 4);
    }

    #[test]
    fn test_due_selection() {
        let t0 = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();
        let mut t = task(t0);
        assert!(t.is_due(t0));

        t.record_failure("boom", t0);
        assert!(!t.is_due(t0));
        assert!(t.is_due(t0 + Duration::minutes(1)));

        t.record_sent();
        assert!(!t.is_due(t0 + Duration::hours(1)));
    }

    #[test]
    fn test_cancel_is_terminal() {
        let t0 = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();
        let mut t = task(t0);
        t.cancel("order no longer paid");
        assert_eq!(t.status, TaskStatus::Cancelled);
        assert!(t.status.is_terminal());
        assert!(!t.is_due(t0 + Duration::days(1)));
    }
}
