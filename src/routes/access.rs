use axum::{
    extract::{Json, Query, State},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use crate::access::{decide, resolve_role, Viewer};
use crate::responses::JsonResponse;
use crate::routes::auth::session::session_claims;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AccessQuery {
    pub path: String,
}

/// Tells the view layer whether the current viewer may open `path`, or where
/// to send them instead. A missing or invalid session is an anonymous viewer.
pub async fn check_access(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<AccessQuery>,
) -> Response {
    let viewer = match session_claims(&jar, &state) {
        None => Viewer::Anonymous,
        Some(claims) => match resolve_role(state.accounts.as_ref(), &claims).await {
            Ok(role) => Viewer::from(role),
            Err(err) => {
                error!(?err, "failed to resolve viewer role");
                return JsonResponse::server_error("Database error").into_response();
            }
        },
    };

    let decision = decide(&query.path, viewer);
    Json(json!({ "path": query.path, "gate": decision })).into_response()
}
