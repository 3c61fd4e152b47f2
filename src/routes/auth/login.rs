use axum::{
    extract::{Json, State},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use serde_json::json;
use subtle::ConstantTimeEq;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{error, info, warn};

use super::claims::{Claims, SessionKind};
use super::session::{session_cookie, AuthSession};
use crate::db::account_repository::ProvisionOutcome;
use crate::models::account::UserRole;
use crate::responses::JsonResponse;
use crate::services::identity::IdentityError;
use crate::state::AppState;
use crate::utils::jwt::{create_jwt, JwtKeyProvider};

const ACCOUNT_SESSION_TTL: TimeDuration = TimeDuration::days(7);
const ADMIN_SESSION_TTL: TimeDuration = TimeDuration::hours(8);

#[derive(Deserialize, Serialize)]
pub struct SessionPayload {
    pub access_token: String,
}

#[derive(Deserialize, Serialize)]
pub struct AdminLoginPayload {
    pub username: String,
    pub password: String,
}

fn issue_session(
    state: &AppState,
    jar: CookieJar,
    claims: Claims,
    ttl: TimeDuration,
) -> Result<CookieJar, Response> {
    match create_jwt(claims, state.jwt_keys(), state.jwt_issuer(), state.jwt_audience()) {
        Ok(token) => Ok(jar.add(session_cookie(
            token,
            state.config.auth_cookie_secure,
            ttl,
        ))),
        Err(err) => {
            error!(?err, "failed to sign session token");
            Err(JsonResponse::server_error("Token generation failed").into_response())
        }
    }
}

/// Exchanges an identity-provider access token for a session cookie,
/// provisioning the account on first sign-in.
pub async fn establish_session(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<SessionPayload>,
) -> Response {
    let profile = match state.identity.verify(&payload.access_token) {
        Ok(profile) => profile,
        Err(IdentityError::NotConfigured) => {
            error!("SUPABASE_JWT_SECRET is not configured");
            return JsonResponse::server_error("Sign-in is not configured").into_response();
        }
        Err(err) => {
            warn!(%err, "identity token rejected");
            return JsonResponse::unauthorized("Invalid identity token").into_response();
        }
    };

    let outcome = match state.ledger.provision_account(&profile).await {
        Ok(outcome) => outcome,
        Err(err) => {
            error!(?err, user_id = %profile.id, "account provisioning failed");
            return JsonResponse::server_error("Database error").into_response();
        }
    };
    let created = matches!(outcome, ProvisionOutcome::Created(_));
    let account = outcome.into_account();

    let claims = Claims {
        sub: account.id.to_string(),
        email: account.email.clone(),
        role: account.role,
        kind: SessionKind::Account,
        exp: (OffsetDateTime::now_utc() + ACCOUNT_SESSION_TTL).unix_timestamp(),
        iss: String::new(),
        aud: String::new(),
    };
    let jar = match issue_session(&state, jar, claims, ACCOUNT_SESSION_TTL) {
        Ok(jar) => jar,
        Err(resp) => return resp,
    };

    info!(user_id = %account.id, created, "session established");
    let balance = account.balance();
    (
        jar,
        Json(json!({
            "success": true,
            "created": created,
            "account": account,
            "balance": balance,
        })),
    )
        .into_response()
}

pub async fn admin_login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<AdminLoginPayload>,
) -> Response {
    let Some(admin) = state.config.admin.as_ref() else {
        return JsonResponse::forbidden("Admin login is disabled").into_response();
    };

    let user_ok: bool = payload
        .username
        .as_bytes()
        .ct_eq(admin.username.as_bytes())
        .into();
    let pass_ok: bool = payload
        .password
        .as_bytes()
        .ct_eq(admin.password.as_bytes())
        .into();
    if !(user_ok && pass_ok) {
        warn!(username = %payload.username, "admin login failed");
        return JsonResponse::unauthorized("Invalid credentials").into_response();
    }

    let claims = Claims {
        sub: format!("admin:{}", admin.username),
        email: String::new(),
        role: UserRole::Admin,
        kind: SessionKind::AdminLogin,
        exp: (OffsetDateTime::now_utc() + ADMIN_SESSION_TTL).unix_timestamp(),
        iss: String::new(),
        aud: String::new(),
    };
    match issue_session(&state, jar, claims, ADMIN_SESSION_TTL) {
        Ok(jar) => {
            info!(username = %admin.username, "admin logged in");
            (jar, JsonResponse::success("Logged in")).into_response()
        }
        Err(resp) => resp,
    }
}

pub async fn handle_logout(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    let expired = session_cookie(String::new(), state.config.auth_cookie_secure, TimeDuration::ZERO);
    (jar.add(expired), JsonResponse::success("Logged out"))
}

pub async fn handle_me(State(state): State<AppState>, AuthSession(claims): AuthSession) -> Response {
    if claims.kind == SessionKind::AdminLogin {
        return Json(json!({
            "success": true,
            "kind": claims.kind,
            "role": claims.role,
            "account": null,
        }))
        .into_response();
    }

    let Ok(user_id) = uuid::Uuid::parse_str(&claims.sub) else {
        return JsonResponse::unauthorized("Invalid user ID").into_response();
    };

    match state.accounts.find_account(user_id).await {
        Ok(Some(account)) => {
            let balance = account.balance();
            Json(json!({
                "success": true,
                "kind": claims.kind,
                "role": account.role,
                "account": account,
                "balance": balance,
            }))
            .into_response()
        }
        Ok(None) => JsonResponse::not_found("User not found").into_response(),
        Err(err) => {
            error!(?err, %user_id, "failed to load account");
            JsonResponse::server_error("Database error").into_response()
        }
    }
}
