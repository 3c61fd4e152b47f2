use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use crate::models::account::{Account, Balance};
use crate::responses::JsonResponse;
use crate::routes::auth::session::AdminSession;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    page: Option<i64>,
    limit: Option<i64>,
}

#[derive(Debug, Serialize)]
struct PaginatedResponse<T> {
    data: Vec<T>,
    page: i64,
    limit: i64,
}

#[derive(Debug, Serialize)]
struct AdminAccountRow {
    #[serde(flatten)]
    account: Account,
    balance: Balance,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReconcileQuery {
    limit: Option<i64>,
}

fn pagination(query: &ListQuery) -> (i64, i64, i64) {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    (page, limit, (page - 1) * limit)
}

fn paginated<T: Serialize>(data: Vec<T>, page: i64, limit: i64) -> Response {
    Json(PaginatedResponse { data, page, limit }).into_response()
}

pub async fn admin_stats(State(state): State<AppState>, _admin: AdminSession) -> Response {
    match state.accounts.account_totals().await {
        Ok(totals) => Json(json!({ "success": true, "stats": totals })).into_response(),
        Err(err) => {
            error!(?err, "admin stats: query failed");
            JsonResponse::server_error("Failed to load stats").into_response()
        }
    }
}

pub async fn admin_list_accounts(
    State(state): State<AppState>,
    _admin: AdminSession,
    Query(query): Query<ListQuery>,
) -> Response {
    let (page, limit, offset) = pagination(&query);
    match state.accounts.list_accounts(limit, offset).await {
        Ok(accounts) => {
            let rows = accounts
                .into_iter()
                .map(|account| AdminAccountRow {
                    balance: account.balance(),
                    account,
                })
                .collect();
            paginated::<AdminAccountRow>(rows, page, limit)
        }
        Err(err) => {
            error!(?err, "admin accounts: query failed");
            JsonResponse::server_error("Failed to load users").into_response()
        }
    }
}

pub async fn admin_list_transactions(
    State(state): State<AppState>,
    _admin: AdminSession,
    Query(query): Query<ListQuery>,
) -> Response {
    let (page, limit, offset) = pagination(&query);
    match state.transactions.list_transactions(limit, offset).await {
        Ok(rows) => paginated(rows, page, limit),
        Err(err) => {
            error!(?err, "admin transactions: query failed");
            JsonResponse::server_error("Failed to load transactions").into_response()
        }
    }
}

pub async fn admin_list_rejections(
    State(state): State<AppState>,
    _admin: AdminSession,
    Query(query): Query<ListQuery>,
) -> Response {
    let (page, limit, offset) = pagination(&query);
    match state.transactions.list_rejections(limit, offset).await {
        Ok(rows) => paginated(rows, page, limit),
        Err(err) => {
            error!(?err, "admin rejections: query failed");
            JsonResponse::server_error("Failed to load rejections").into_response()
        }
    }
}

/// Succeeded payments whose credits have not reached the account yet.
pub async fn admin_pending_grants(
    State(state): State<AppState>,
    _admin: AdminSession,
    Query(query): Query<ReconcileQuery>,
) -> Response {
    let limit = query.limit.unwrap_or(100).clamp(1, 500);
    match state.transactions.list_pending_grants(limit).await {
        Ok(pending) => Json(json!({ "success": true, "pending": pending })).into_response(),
        Err(err) => {
            error!(?err, "admin reconciliation: query failed");
            JsonResponse::server_error("Failed to load pending grants").into_response()
        }
    }
}

pub async fn admin_reconcile(
    State(state): State<AppState>,
    AdminSession(claims): AdminSession,
    Query(query): Query<ReconcileQuery>,
) -> Response {
    let limit = query
        .limit
        .unwrap_or(state.config.worker.reconcile_batch_size)
        .clamp(1, 500);
    match state.ledger.reconcile_pending_grants(limit).await {
        Ok(report) => {
            info!(admin = %claims.sub, ?report, "manual reconciliation");
            Json(json!({ "success": true, "report": report })).into_response()
        }
        Err(err) => {
            error!(?err, "manual reconciliation failed");
            JsonResponse::server_error("Reconciliation failed").into_response()
        }
    }
}
