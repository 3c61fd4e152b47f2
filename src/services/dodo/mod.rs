use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub mod signature;

mod live;
#[cfg(test)]
mod mock;

pub use live::LiveDodoService;
#[cfg(test)]
pub use mock::MockDodoService;
pub use signature::{WebhookHeaders, WebhookVerifier};

pub const EVENT_PAYMENT_SUCCEEDED: &str = "payment.succeeded";
pub const EVENT_PAYMENT_FAILED: &str = "payment.failed";

#[derive(Debug, thiserror::Error)]
pub enum DodoServiceError {
    #[error("config error: {0}")]
    Config(String),
    #[error("Dodo Payments responded with status {status}: {message}")]
    Api { status: StatusCode, message: String },
    #[error("Dodo Payments request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("webhook verification failed: {0}")]
    Signature(String),
    #[error("serialization error: {0}")]
    Serde(String),
}

impl From<signature::SignatureError> for DodoServiceError {
    fn from(err: signature::SignatureError) -> Self {
        DodoServiceError::Signature(err.to_string())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateCheckoutSessionRequest {
    pub product_id: String,
    pub user_id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckoutSession {
    pub session_id: String,
    pub checkout_url: String,
}

/// Payment fields carried by `payment.*` webhooks. Anything the provider
/// omitted (or sent blank) is `None`; amounts are in minor units.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PaymentDetails {
    pub payment_id: Option<String>,
    pub total_amount: i64,
    pub user_id: Option<String>,
    pub product_id: Option<String>,
    pub billing_country: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PaymentEvent {
    PaymentSucceeded(PaymentDetails),
    PaymentFailed(PaymentDetails),
    Other { event_type: String },
}

impl PaymentEvent {
    pub fn event_type(&self) -> &str {
        match self {
            PaymentEvent::PaymentSucceeded(_) => EVENT_PAYMENT_SUCCEEDED,
            PaymentEvent::PaymentFailed(_) => EVENT_PAYMENT_FAILED,
            PaymentEvent::Other { event_type } => event_type,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
struct PaymentData {
    #[serde(default)]
    payment_id: Option<String>,
    #[serde(default)]
    total_amount: Option<i64>,
    #[serde(default)]
    metadata: Option<PaymentMetadata>,
    #[serde(default)]
    product_cart: Option<Vec<CartItem>>,
    #[serde(default)]
    billing: Option<Billing>,
}

#[derive(Debug, Default, Deserialize)]
struct PaymentMetadata {
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CartItem {
    product_id: String,
}

#[derive(Debug, Default, Deserialize)]
struct Billing {
    #[serde(default)]
    country: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Decodes a verified webhook body into a typed event. Only the envelope is
/// required; payment fields that fail to decode surface as missing data.
pub fn parse_event(payload: &[u8]) -> Result<PaymentEvent, DodoServiceError> {
    let envelope: WebhookEnvelope =
        serde_json::from_slice(payload).map_err(|e| DodoServiceError::Serde(e.to_string()))?;

    let is_success = match envelope.event_type.as_str() {
        EVENT_PAYMENT_SUCCEEDED => true,
        EVENT_PAYMENT_FAILED => false,
        _ => {
            return Ok(PaymentEvent::Other {
                event_type: envelope.event_type,
            })
        }
    };

    let data = match serde_json::from_value::<PaymentData>(envelope.data) {
        Ok(data) => data,
        Err(err) => {
            warn!(%err, event_type = %envelope.event_type, "payment webhook data did not decode");
            PaymentData::default()
        }
    };

    let details = PaymentDetails {
        payment_id: non_blank(data.payment_id),
        total_amount: data.total_amount.unwrap_or(0),
        user_id: non_blank(data.metadata.and_then(|m| m.user_id)),
        product_id: non_blank(
            data.product_cart
                .and_then(|cart| cart.into_iter().next())
                .map(|item| item.product_id),
        ),
        billing_country: non_blank(data.billing.and_then(|b| b.country)),
    };

    Ok(if is_success {
        PaymentEvent::PaymentSucceeded(details)
    } else {
        PaymentEvent::PaymentFailed(details)
    })
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(
        &self,
        req: CreateCheckoutSessionRequest,
    ) -> Result<CheckoutSession, DodoServiceError>;

    fn verify_webhook(
        &self,
        payload: &[u8],
        headers: &WebhookHeaders,
    ) -> Result<PaymentEvent, DodoServiceError>;
}
