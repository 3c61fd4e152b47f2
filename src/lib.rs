pub mod access;
pub mod catalog;
pub mod config;
pub mod db;
pub mod models;
pub mod responses;
pub mod routes;
pub mod services;
pub mod state;
pub mod utils;
pub mod worker;

use axum::{
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use responses::JsonResponse;
use routes::{
    access::check_access,
    admin::{
        admin_list_accounts, admin_list_rejections, admin_list_transactions, admin_pending_grants,
        admin_reconcile, admin_stats,
    },
    auth::{admin_login, establish_session, handle_logout, handle_me},
    checkout::{create_checkout, list_products},
    credits::{debit_credits, get_balance, list_my_transactions},
    webhooks::dodo_webhook,
};

pub use state::AppState;

/// Builds the HTTP router. Rate limiting and CORS are layered on by the
/// binary, which owns the peer address.
pub fn app(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/session", post(establish_session))
        .route("/logout", post(handle_logout))
        .route("/me", get(handle_me));

    let credit_routes = Router::new()
        .route("/", get(get_balance))
        .route("/debit", post(debit_credits))
        .route("/transactions", get(list_my_transactions));

    // Only admin sessions get past the handlers' extractor.
    let admin_routes = Router::new()
        .route("/login", post(admin_login))
        .route("/stats", get(admin_stats))
        .route("/users", get(admin_list_accounts))
        .route("/transactions", get(admin_list_transactions))
        .route("/rejections", get(admin_list_rejections))
        .route("/reconciliation", get(admin_pending_grants))
        .route("/reconcile", post(admin_reconcile));

    Router::new()
        .route("/", get(root))
        .route("/api/checkout", post(create_checkout))
        .route("/api/products", get(list_products))
        .route("/api/webhooks/dodo", post(dodo_webhook))
        .route("/api/access", get(check_access))
        .nest("/api/auth", auth_routes)
        .nest("/api/credits", credit_routes)
        .nest("/api/admin", admin_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn root() -> Response {
    JsonResponse::success("Credit ledger is running").into_response()
}
