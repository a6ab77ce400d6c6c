use crate::error::PaymentError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A positive monetary amount.
///
/// Wrapper around `rust_decimal::Decimal` that rejects zero and negative
/// values at construction, so every amount flowing through checkout and
/// reconciliation is known-valid.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, PaymentError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(PaymentError::ValidationError(
                "amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = PaymentError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle status of an order. Payment state is tracked separately in
/// [`PaymentState`]; an order keeps moving (delivered, cancelled) after it
/// is paid.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Delivered,
    Cancelled,
}

/// Payment status of an order: `Pending -> Approved | Rejected | Expired`.
/// `Approved` is terminal for payment purposes.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum PaymentState {
    Pending,
    Approved,
    Rejected,
    Expired,
}

/// One sellable line of an order.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct OrderLine {
    pub item_id: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
}

/// Payment metadata copied onto the order when it is finalized.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct PaymentMeta {
    pub provider_payment_id: String,
    pub method: Option<String>,
    pub payer_email: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
}

/// An order within a tenant.
///
/// Invariants:
/// - `is_paid == true` exactly when an approved payment record exists for
///   this order.
/// - `stock_deducted` flips false -> true at most once.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Order {
    pub id: String,
    pub tenant_id: String,
    pub order_number: u32,
    pub status: OrderStatus,
    pub payment_status: PaymentState,
    pub total_amount: Amount,
    pub is_paid: bool,
    pub stock_deducted: bool,
    pub customer_email: Option<String>,
    pub lines: Vec<OrderLine>,
    pub payment: Option<PaymentMeta>,
}

impl Order {
    pub fn new(id: impl Into<String>, tenant_id: impl Into<String>, total_amount: Amount) -> Self {
        Self {
            id: id.into(),
            tenant_id: tenant_id.into(),
            order_number: 0,
            status: OrderStatus::Pending,
            payment_status: PaymentState::Pending,
            total_amount,
            is_paid: false,
            stock_deducted: false,
            customer_email: None,
            lines: Vec::new(),
            payment: None,
        }
    }

    /// Records an approved payment on the order. The caller is responsible
    /// for the compare-and-set on `is_paid`; this only writes the terminal
    /// payment state.
    pub fn apply_approval(&mut self, meta: PaymentMeta) {
        self.is_paid = true;
        self.payment_status = PaymentState::Approved;
        self.status = OrderStatus::Paid;
        self.payment = Some(meta);
    }

    /// Records a non-approved provider verdict without touching `is_paid`.
    /// Approved state is terminal and never downgraded.
    pub fn record_verdict(&mut self, state: PaymentState) {
        if self.payment_status != PaymentState::Approved {
            self.payment_status = state;
        }
    }
}
