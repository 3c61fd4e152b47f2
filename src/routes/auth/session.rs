use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use time::Duration as TimeDuration;
use tracing::error;
use uuid::Uuid;

use crate::access::resolve_role;
use crate::models::account::UserRole;
use crate::routes::auth::claims::{Claims, SessionKind};
use crate::state::AppState;
use crate::utils::jwt::{decode_jwt, JwtKeyProvider};

pub const AUTH_COOKIE: &str = "auth_token";

pub fn session_cookie(token: String, secure: bool, max_age: TimeDuration) -> Cookie<'static> {
    Cookie::build((AUTH_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(max_age)
        .build()
}

/// Any valid session cookie, account or back-office.
#[derive(Debug, PartialEq)]
pub struct AuthSession(pub Claims);

impl<S> FromRequestParts<S> for AuthSession
where
    S: JwtKeyProvider + Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        session_claims(&jar, state)
            .map(AuthSession)
            .ok_or(StatusCode::UNAUTHORIZED)
    }
}

/// Claims of the session cookie in `jar`, if it carries a valid token.
pub fn session_claims<S: JwtKeyProvider>(jar: &CookieJar, state: &S) -> Option<Claims> {
    let token = jar.get(AUTH_COOKIE)?;
    decode_jwt(
        token.value(),
        state.jwt_keys(),
        state.jwt_issuer(),
        state.jwt_audience(),
    )
    .ok()
    .map(|data| data.claims)
}

/// A session that belongs to a provisioned account.
#[derive(Debug, PartialEq)]
pub struct AccountSession {
    pub user_id: Uuid,
    pub claims: Claims,
}

impl<S> FromRequestParts<S> for AccountSession
where
    S: JwtKeyProvider + Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthSession(claims) = AuthSession::from_request_parts(parts, state).await?;
        if claims.kind != SessionKind::Account {
            return Err(StatusCode::FORBIDDEN);
        }
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| StatusCode::UNAUTHORIZED)?;
        Ok(AccountSession { user_id, claims })
    }
}

/// A session whose effective role is admin.
#[derive(Debug, PartialEq)]
pub struct AdminSession(pub Claims);

impl FromRequestParts<AppState> for AdminSession {
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let AuthSession(claims) = AuthSession::from_request_parts(parts, state).await?;
        match resolve_role(state.accounts.as_ref(), &claims).await {
            Ok(Some(UserRole::Admin)) => Ok(AdminSession(claims)),
            Ok(_) => Err(StatusCode::FORBIDDEN),
            Err(err) => {
                error!(?err, "failed to resolve session role");
                Err(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}
