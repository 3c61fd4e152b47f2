use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{error, info, warn};

use crate::responses::JsonResponse;
use crate::services::dodo::{DodoServiceError, WebhookHeaders};
use crate::services::ledger::{ApplyOutcome, LedgerError};
use crate::state::AppState;

fn header_value(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

pub fn webhook_headers(headers: &HeaderMap) -> WebhookHeaders {
    WebhookHeaders {
        id: header_value(headers, "webhook-id"),
        timestamp: header_value(headers, "webhook-timestamp"),
        signature: header_value(headers, "webhook-signature"),
    }
}

fn outcome_label(outcome: &ApplyOutcome) -> &'static str {
    match outcome {
        ApplyOutcome::Ignored { .. } => "ignored",
        ApplyOutcome::Rejected(_) => "rejected",
        ApplyOutcome::Duplicate { .. } => "duplicate",
        ApplyOutcome::RecordedFailure { .. } => "recorded_failure",
        ApplyOutcome::Granted { .. } => "granted",
    }
}

/// Dodo Payments webhook receiver. Anything other than a 2xx makes the
/// provider redeliver, so only signature failures and storage errors are
/// reported as failures.
pub async fn dodo_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let wh = webhook_headers(&headers);
    let event = match state.payments.verify_webhook(&body, &wh) {
        Ok(event) => event,
        Err(DodoServiceError::Signature(reason)) => {
            warn!(webhook_id = %wh.id, %reason, "webhook signature rejected");
            return JsonResponse::unauthorized("Invalid signature").into_response();
        }
        Err(DodoServiceError::Serde(reason)) => {
            warn!(webhook_id = %wh.id, %reason, "verified webhook body is not a valid event");
            return JsonResponse::bad_request("Malformed webhook payload").into_response();
        }
        Err(err) => {
            error!(?err, webhook_id = %wh.id, "webhook verification unavailable");
            return JsonResponse::server_error("Webhook verification unavailable").into_response();
        }
    };
    info!(webhook_id = %wh.id, event_type = event.event_type(), "webhook verified");

    match state.ledger.apply_payment_event(&event).await {
        Ok(outcome) => {
            let mut body = json!({ "received": true, "outcome": outcome_label(&outcome) });
            if let ApplyOutcome::Rejected(reason) = &outcome {
                body["reason"] = json!(reason.code());
            }
            Json(body).into_response()
        }
        Err(LedgerError::GrantPending { payment_id, .. }) => {
            // Already logged by the ledger; the provider will redeliver and
            // the duplicate path retries the grant.
            warn!(%payment_id, "acknowledging with failure so the grant is retried");
            JsonResponse::server_error("Credit grant pending").into_response()
        }
        Err(err) => {
            error!(?err, webhook_id = %wh.id, "failed to apply payment event");
            JsonResponse::server_error("Failed to process webhook").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        routing::post,
        Router,
    };
    use serde_json::{json, Value};
    use std::sync::atomic::Ordering;
    use time::OffsetDateTime;
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::db::mock_db::MockDb;
    use crate::models::plan::PlanTier;
    use crate::models::transaction::TransactionStatus;
    use crate::services::dodo::MockDodoService;
    use crate::state::test_support::test_state;

    const PROFESSIONAL: &str = "pdt_UQVM7C1CCtMCSP1MFCx9m";

    fn app(db: &MockDb) -> (Router, MockDodoService) {
        let payments = MockDodoService::with_webhook_secret();
        let router = Router::new()
            .route("/webhooks/dodo", post(dodo_webhook))
            .with_state(test_state(db, payments.clone()));
        (router, payments)
    }

    fn payment_body(event_type: &str, payment_id: &str, user_id: Uuid, product_id: &str) -> String {
        json!({
            "business_id": "bus_test",
            "type": event_type,
            "timestamp": "2025-01-01T00:00:00Z",
            "data": {
                "payment_id": payment_id,
                "total_amount": 1500,
                "metadata": { "user_id": user_id.to_string() },
                "product_cart": [{ "product_id": product_id, "quantity": 1 }],
                "billing": { "country": "US" }
            }
        })
        .to_string()
    }

    fn signed(payments: &MockDodoService, body: &str) -> Request<Body> {
        let ts = OffsetDateTime::now_utc().unix_timestamp();
        let signature = payments.signer().sign("msg_test", ts, body.as_bytes());
        Request::post("/webhooks/dodo")
            .header("content-type", "application/json")
            .header("webhook-id", "msg_test")
            .header("webhook-timestamp", ts.to_string())
            .header("webhook-signature", signature)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(res: axum::response::Response) -> Value {
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn successful_payment_is_granted_and_acknowledged() {
        let id = Uuid::new_v4();
        let db = MockDb::new().with_account(id, 5, 0);
        let (router, payments) = app(&db);

        let body = payment_body("payment.succeeded", "tx_1", id, PROFESSIONAL);
        let res = router.oneshot(signed(&payments, &body)).await.unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        let json = body_json(res).await;
        assert_eq!(json["received"], true);
        assert_eq!(json["outcome"], "granted");
        let account = db.account(id).unwrap();
        assert_eq!(account.credits_allocated, 65);
        assert_eq!(account.plan, PlanTier::Professional);
    }

    #[tokio::test]
    async fn redelivered_webhook_is_acknowledged_without_regrant() {
        let id = Uuid::new_v4();
        let db = MockDb::new().with_account(id, 5, 0);
        let (router, payments) = app(&db);
        let body = payment_body("payment.succeeded", "tx_1", id, PROFESSIONAL);

        router.clone().oneshot(signed(&payments, &body)).await.unwrap();
        let res = router.oneshot(signed(&payments, &body)).await.unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await["outcome"], "duplicate");
        assert_eq!(db.account(id).unwrap().credits_allocated, 65);
        assert_eq!(db.transaction_count(), 1);
    }

    #[tokio::test]
    async fn bad_signature_is_rejected_before_any_mutation() {
        let id = Uuid::new_v4();
        let db = MockDb::new().with_account(id, 5, 0);
        let (router, _) = app(&db);
        let body = payment_body("payment.succeeded", "tx_1", id, PROFESSIONAL);

        let forged = Request::post("/webhooks/dodo")
            .header("webhook-id", "msg_test")
            .header(
                "webhook-timestamp",
                OffsetDateTime::now_utc().unix_timestamp().to_string(),
            )
            .header("webhook-signature", "v1,bm90IGEgcmVhbCBzaWduYXR1cmU=")
            .body(Body::from(body))
            .unwrap();
        let res = router.clone().oneshot(forged).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let unsigned = Request::post("/webhooks/dodo")
            .body(Body::from("{}"))
            .unwrap();
        let res = router.oneshot(unsigned).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        assert_eq!(db.insert_calls.load(Ordering::SeqCst), 0);
        assert_eq!(db.account(id).unwrap().credits_allocated, 5);
        assert!(db.rejections().is_empty());
    }

    #[tokio::test]
    async fn failed_payment_is_recorded() {
        let id = Uuid::new_v4();
        let db = MockDb::new().with_account(id, 5, 0);
        let (router, payments) = app(&db);

        let body = payment_body("payment.failed", "tx_2", id, PROFESSIONAL);
        let res = router.oneshot(signed(&payments, &body)).await.unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await["outcome"], "recorded_failure");
        assert_eq!(db.transaction("tx_2").unwrap().status, TransactionStatus::Failed);
        assert_eq!(db.account(id).unwrap().credits_allocated, 5);
    }

    #[tokio::test]
    async fn unknown_product_is_acknowledged_and_recorded_as_rejected() {
        let id = Uuid::new_v4();
        let db = MockDb::new().with_account(id, 5, 0);
        let (router, payments) = app(&db);

        let body = payment_body("payment.succeeded", "tx_3", id, "pdt_retired");
        let res = router.oneshot(signed(&payments, &body)).await.unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        let json = body_json(res).await;
        assert_eq!(json["outcome"], "rejected");
        assert_eq!(json["reason"], "unknown_product");
        assert_eq!(db.transaction_count(), 0);
        assert_eq!(db.rejections().len(), 1);
        assert_eq!(db.account(id).unwrap().credits_allocated, 5);
    }

    #[tokio::test]
    async fn missing_data_is_acknowledged() {
        let db = MockDb::new();
        let (router, payments) = app(&db);

        let body = json!({ "type": "payment.succeeded", "data": { "payment_id": "tx_4" } }).to_string();
        let res = router.oneshot(signed(&payments, &body)).await.unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await["reason"], "missing_data");
    }

    #[tokio::test]
    async fn other_event_types_are_ignored() {
        let db = MockDb::new();
        let (router, payments) = app(&db);

        let body = json!({ "type": "subscription.renewed", "data": {} }).to_string();
        let res = router.oneshot(signed(&payments, &body)).await.unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await["outcome"], "ignored");
    }

    #[tokio::test]
    async fn grant_failure_returns_error_and_redelivery_completes_it() {
        let id = Uuid::new_v4();
        let db = MockDb::new().with_account(id, 5, 0);
        let (router, payments) = app(&db);
        let body = payment_body("payment.succeeded", "tx_5", id, PROFESSIONAL);

        db.fail_grants.store(true, Ordering::SeqCst);
        let res = router.clone().oneshot(signed(&payments, &body)).await.unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(db.transaction("tx_5").unwrap().grant_pending());

        db.fail_grants.store(false, Ordering::SeqCst);
        let res = router.oneshot(signed(&payments, &body)).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await["outcome"], "duplicate");
        assert_eq!(db.account(id).unwrap().credits_allocated, 65);
    }

    #[tokio::test]
    async fn storage_failure_asks_for_redelivery() {
        let id = Uuid::new_v4();
        let db = MockDb::new().with_account(id, 5, 0);
        db.fail_inserts.store(true, Ordering::SeqCst);
        let (router, payments) = app(&db);

        let body = payment_body("payment.succeeded", "tx_6", id, PROFESSIONAL);
        let res = router.oneshot(signed(&payments, &body)).await.unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
