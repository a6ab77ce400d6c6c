use crate::application::checkout::IntentTracker;
use crate::application::rate_limit::{self, RateLimiter, client_identifier};
use crate::application::reconcile::{FinalizeOutcome, ReconciliationEngine};
use crate::domain::ports::CheckoutItem;
use crate::error::PaymentError;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

/// Transport-agnostic response: an HTTP-shaped status plus a JSON body.
/// The core is invoked exclusively through request handlers; whatever
/// server fronts it maps this 1:1.
#[derive(Debug, PartialEq, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
    /// Seconds the caller should wait, set only on 429 responses.
    pub retry_after: Option<u64>,
}

impl ApiResponse {
    fn ok(body: Value) -> Self {
        Self {
            status: 200,
            body,
            retry_after: None,
        }
    }

    fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "success": false, "error": message.into() }),
            retry_after: None,
        }
    }

    fn rate_limited(retry_after_secs: u64) -> Self {
        Self {
            status: 429,
            body: json!({
                "success": false,
                "error": "rate limit exceeded",
                "retry_after": retry_after_secs,
            }),
            retry_after: Some(retry_after_secs),
        }
    }
}

/// Webhook delivery as pushed by the provider, plus routing context.
#[derive(Debug, Deserialize, Clone)]
pub struct WebhookRequest {
    pub tenant_id: String,
    pub caller_ip: String,
    /// Raw provider payload; the payment id sits at `data.id` (or `id` on
    /// older deliveries).
    pub payload: Value,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollRequest {
    pub order_id: String,
    pub caller_ip: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CreateCheckoutRequest {
    pub order_id: String,
    #[serde(default)]
    pub items: Vec<CheckoutItem>,
    pub caller_ip: String,
}

/// Request handlers for the three inbound endpoints. The rate-limit gate
/// runs before any credential lookup or gateway call.
pub struct PaymentApi {
    engine: Arc<ReconciliationEngine>,
    tracker: Arc<IntentTracker>,
    limiter: Arc<RateLimiter>,
}

impl PaymentApi {
    pub fn new(
        engine: Arc<ReconciliationEngine>,
        tracker: Arc<IntentTracker>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            engine,
            tracker,
            limiter,
        }
    }

    /// Webhook endpoint. Failures here are invisible to the customer: the
    /// provider redelivers on anything but a 2xx.
    pub async fn handle_webhook(&self, request: WebhookRequest) -> ApiResponse {
        let identifier = client_identifier(&request.caller_ip, Some(&request.tenant_id));
        let decision = self.limiter.check(&identifier, rate_limit::WEBHOOK);
        if decision.limited {
            return ApiResponse::rate_limited(decision.retry_after_secs);
        }

        let Some(payment_id) = extract_payment_id(&request.payload) else {
            return ApiResponse::error(400, "missing payment id in payload");
        };

        match self
            .engine
            .process_webhook(&request.tenant_id, &payment_id)
            .await
        {
            Ok(outcome) => ApiResponse::ok(json!({
                "success": true,
                "status": outcome.status_label(),
            })),
            Err(PaymentError::NotFound(what)) => ApiResponse::error(404, what + " not found"),
            Err(PaymentError::ValidationError(message)) => ApiResponse::error(400, message),
            Err(e) => ApiResponse::error(500, e.to_string()),
        }
    }

    /// Poll endpoint. Idempotent; a transient gateway failure surfaces as
    /// "still pending" so clients simply poll again.
    pub async fn handle_poll(&self, request: PollRequest) -> ApiResponse {
        let identifier = client_identifier(&request.caller_ip, None);
        let decision = self.limiter.check(&identifier, rate_limit::PAYMENT);
        if decision.limited {
            return ApiResponse::rate_limited(decision.retry_after_secs);
        }

        match self.engine.poll_order(&request.order_id).await {
            Ok(outcome @ FinalizeOutcome::NotApproved { .. }) => ApiResponse::ok(json!({
                "success": false,
                "status": outcome.status_label(),
            })),
            Ok(outcome) => ApiResponse::ok(json!({
                "success": true,
                "status": outcome.status_label(),
            })),
            Err(PaymentError::UpstreamUnavailable(_)) => ApiResponse::ok(json!({
                "success": false,
                "status": "pending",
            })),
            Err(PaymentError::NotFound(what)) => ApiResponse::error(404, what + " not found"),
            Err(e) => ApiResponse::error(500, e.to_string()),
        }
    }

    /// Checkout-creation endpoint. Failures surface immediately and
    /// actionably.
    pub async fn handle_create_checkout(&self, request: CreateCheckoutRequest) -> ApiResponse {
        let identifier = client_identifier(&request.caller_ip, None);
        let decision = self.limiter.check(&identifier, rate_limit::PAYMENT);
        if decision.limited {
            return ApiResponse::rate_limited(decision.retry_after_secs);
        }

        match self
            .tracker
            .create_intent(&request.order_id, request.items)
            .await
        {
            Ok(handle) => ApiResponse::ok(json!({
                "success": true,
                "checkout_url": handle.checkout_url,
                "external_reference": handle.external_reference,
            })),
            Err(PaymentError::CredentialMissing(_)) => {
                ApiResponse::error(400, "payment provider not connected for this store")
            }
            Err(PaymentError::NotFound(what)) => ApiResponse::error(404, what + " not found"),
            Err(PaymentError::ValidationError(message)) => ApiResponse::error(400, message),
            Err(e) => ApiResponse::error(500, e.to_string()),
        }
    }
}

/// The payment id lives at `data.id` on current deliveries and at `id` on
/// older ones; both may be numbers or strings.
fn extract_payment_id(payload: &Value) -> Option<String> {
    let candidate = payload
        .get("data")
        .and_then(|data| data.get("id"))
        .or_else(|| payload.get("id"))?;
    match candidate {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
