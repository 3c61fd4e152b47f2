use axum::{
    extract::{Json, State},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::responses::JsonResponse;
use crate::services::dodo::{CreateCheckoutSessionRequest, DodoServiceError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CheckoutPayload {
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

pub async fn create_checkout(
    State(state): State<AppState>,
    Json(payload): Json<CheckoutPayload>,
) -> Response {
    let product_id = payload.product_id.filter(|v| !v.trim().is_empty());
    let user_id = payload.user_id.filter(|v| !v.trim().is_empty());
    let (Some(product_id), Some(user_id)) = (product_id, user_id) else {
        return JsonResponse::bad_request("Missing required fields: product_id and user_id")
            .into_response();
    };

    if !state.ledger.catalog().contains(&product_id) {
        return JsonResponse::bad_request("Unknown product").into_response();
    }

    let req = CreateCheckoutSessionRequest {
        product_id: product_id.clone(),
        user_id: user_id.clone(),
    };
    match state.payments.create_checkout_session(req).await {
        Ok(session) => {
            info!(%user_id, %product_id, session_id = %session.session_id, "checkout session created");
            Json(json!({
                "checkout_url": session.checkout_url,
                "session_id": session.session_id,
            }))
            .into_response()
        }
        Err(DodoServiceError::Config(msg)) => {
            error!(%msg, "payment provider misconfigured");
            JsonResponse::server_error("Server misconfigured: missing payment credentials")
                .into_response()
        }
        Err(DodoServiceError::Api { status, message }) => {
            warn!(%status, %message, %product_id, "payment provider rejected checkout");
            JsonResponse::bad_gateway(&message, Some(status.as_u16())).into_response()
        }
        Err(err) => {
            error!(?err, %product_id, "failed to create checkout session");
            JsonResponse::bad_gateway("Failed to create checkout session", None).into_response()
        }
    }
}

/// Pricing listing for the view layer.
pub async fn list_products(State(state): State<AppState>) -> Response {
    let products: Vec<_> = state
        .ledger
        .catalog()
        .entries()
        .into_iter()
        .map(|(id, product)| {
            json!({
                "product_id": id,
                "plan": product.plan,
                "credits": product.credits,
                "price": product.price,
            })
        })
        .collect();
    Json(json!({ "success": true, "products": products })).into_response()
}
