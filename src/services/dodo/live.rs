use super::{
    parse_event, CheckoutSession, CreateCheckoutSessionRequest, DodoServiceError, PaymentEvent,
    PaymentGateway, WebhookHeaders, WebhookVerifier,
};
use crate::config::DodoSettings;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

pub struct LiveDodoService {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    return_url: String,
    verifier: Option<WebhookVerifier>,
}

#[derive(Debug, Deserialize)]
struct DodoErrorBody {
    message: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CheckoutResponse {
    session_id: String,
    checkout_url: String,
}

impl LiveDodoService {
    pub fn from_settings(settings: &DodoSettings, app_url: &str) -> Result<Self, DodoServiceError> {
        let verifier = match settings.webhook_secret.as_deref() {
            Some(secret) => Some(
                WebhookVerifier::new(secret, settings.webhook_tolerance_seconds)
                    .map_err(|e| DodoServiceError::Config(e.to_string()))?,
            ),
            None => None,
        };
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            api_key: settings.api_key.clone(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            return_url: format!("{}/payment-success", app_url.trim_end_matches('/')),
            verifier,
        })
    }
}

#[async_trait]
impl PaymentGateway for LiveDodoService {
    async fn create_checkout_session(
        &self,
        req: CreateCheckoutSessionRequest,
    ) -> Result<CheckoutSession, DodoServiceError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| DodoServiceError::Config("DODO_PAYMENTS_API_KEY is not set".into()))?;

        let body = json!({
            "product_cart": [{ "product_id": req.product_id, "quantity": 1 }],
            "metadata": { "user_id": req.user_id },
            "return_url": self.return_url,
        });

        let response = self
            .client
            .post(format!("{}/checkouts", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let parsed = serde_json::from_str::<DodoErrorBody>(&text).ok();
            let message = parsed
                .and_then(|b| b.message.or(b.error))
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| {
                    if text.trim().is_empty() {
                        status
                            .canonical_reason()
                            .unwrap_or("Unknown error")
                            .to_string()
                    } else {
                        text.clone()
                    }
                });
            return Err(DodoServiceError::Api { status, message });
        }

        let session: CheckoutResponse =
            serde_json::from_str(&text).map_err(|e| DodoServiceError::Serde(e.to_string()))?;
        Ok(CheckoutSession {
            session_id: session.session_id,
            checkout_url: session.checkout_url,
        })
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        headers: &WebhookHeaders,
    ) -> Result<PaymentEvent, DodoServiceError> {
        let verifier = self.verifier.as_ref().ok_or_else(|| {
            DodoServiceError::Config("DODO_PAYMENTS_WEBHOOK_SECRET is not set".into())
        })?;
        verifier.verify(headers, payload)?;
        parse_event(payload)
    }
}
