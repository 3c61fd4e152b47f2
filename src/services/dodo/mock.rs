use super::{
    parse_event, CheckoutSession, CreateCheckoutSessionRequest, DodoServiceError, PaymentEvent,
    PaymentGateway, WebhookHeaders, WebhookVerifier,
};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const MOCK_WEBHOOK_SECRET: &str = "whsec_MfKQ9r8GKYqrTwjUPD8ILPZIo2LaLaSw";

#[derive(Clone, Default)]
pub struct MockDodoService {
    pub last_create_requests: Arc<Mutex<Vec<CreateCheckoutSessionRequest>>>,
    pub api_failure: Arc<Mutex<Option<(StatusCode, String)>>>,
    pub missing_api_key: bool,
    verifier: Option<WebhookVerifier>,
    sessions: Arc<AtomicUsize>,
}

impl MockDodoService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Webhooks are verified for real against [`MOCK_WEBHOOK_SECRET`].
    pub fn with_webhook_secret() -> Self {
        Self {
            verifier: WebhookVerifier::new(MOCK_WEBHOOK_SECRET, 300).ok(),
            ..Self::default()
        }
    }

    pub fn failing_with(self, status: StatusCode, message: &str) -> Self {
        *self.api_failure.lock().unwrap() = Some((status, message.to_string()));
        self
    }

    pub fn unconfigured() -> Self {
        Self {
            missing_api_key: true,
            ..Self::default()
        }
    }

    pub fn signer(&self) -> WebhookVerifier {
        WebhookVerifier::new(MOCK_WEBHOOK_SECRET, 300).unwrap()
    }
}

#[async_trait]
impl PaymentGateway for MockDodoService {
    async fn create_checkout_session(
        &self,
        req: CreateCheckoutSessionRequest,
    ) -> Result<CheckoutSession, DodoServiceError> {
        if self.missing_api_key {
            return Err(DodoServiceError::Config("DODO_PAYMENTS_API_KEY is not set".into()));
        }
        self.last_create_requests.lock().unwrap().push(req);
        if let Some((status, message)) = self.api_failure.lock().unwrap().clone() {
            return Err(DodoServiceError::Api { status, message });
        }

        let n = self.sessions.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(CheckoutSession {
            session_id: format!("cks_test_{n}"),
            checkout_url: format!("https://checkout.example.test/session/cks_test_{n}"),
        })
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        headers: &WebhookHeaders,
    ) -> Result<PaymentEvent, DodoServiceError> {
        if let Some(verifier) = &self.verifier {
            verifier.verify(headers, payload)?;
        }
        parse_event(payload)
    }
}
