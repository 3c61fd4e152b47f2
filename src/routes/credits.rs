use axum::{
    body::Bytes,
    extract::{Json, Query, State},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, warn};

use crate::responses::JsonResponse;
use crate::routes::auth::session::AccountSession;
use crate::services::ledger::DebitError;
use crate::state::AppState;

const DEFAULT_HISTORY_LIMIT: i64 = 50;
const MAX_HISTORY_LIMIT: i64 = 200;

#[derive(Debug, Default, Deserialize)]
pub struct DebitPayload {
    #[serde(default)]
    pub amount: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

pub async fn get_balance(State(state): State<AppState>, session: AccountSession) -> Response {
    match state.ledger.get_balance(session.user_id).await {
        Ok(balance) => Json(balance).into_response(),
        Err(err) => {
            error!(?err, user_id = %session.user_id, "failed to load balance");
            JsonResponse::server_error("Database error").into_response()
        }
    }
}

/// Spends credits for a metered action. The amount defaults to one credit.
pub async fn debit_credits(
    State(state): State<AppState>,
    session: AccountSession,
    body: Bytes,
) -> Response {
    // An empty body is a plain one-credit debit.
    let payload = if body.is_empty() {
        DebitPayload::default()
    } else {
        match serde_json::from_slice::<DebitPayload>(&body) {
            Ok(payload) => payload,
            Err(_) => return JsonResponse::bad_request("Invalid request body").into_response(),
        }
    };
    let amount = payload.amount.unwrap_or(1);

    match state.ledger.debit(session.user_id, amount).await {
        Ok(balance) => Json(json!({ "success": true, "balance": balance })).into_response(),
        Err(DebitError::InsufficientBalance { available, requested }) => {
            warn!(user_id = %session.user_id, available, requested, "debit refused");
            JsonResponse::payment_required("Insufficient credits").into_response()
        }
        Err(DebitError::InvalidAmount) => {
            JsonResponse::bad_request("Amount must be a positive number of credits").into_response()
        }
        Err(DebitError::Storage(err)) => {
            error!(?err, user_id = %session.user_id, "debit failed");
            JsonResponse::server_error("Database error").into_response()
        }
    }
}

pub async fn list_my_transactions(
    State(state): State<AppState>,
    session: AccountSession,
    Query(query): Query<HistoryQuery>,
) -> Response {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);

    match state
        .transactions
        .list_transactions_for_user(session.user_id, limit)
        .await
    {
        Ok(transactions) => {
            Json(json!({ "success": true, "transactions": transactions })).into_response()
        }
        Err(err) => {
            error!(?err, user_id = %session.user_id, "failed to list transactions");
            JsonResponse::server_error("Database error").into_response()
        }
    }
}
