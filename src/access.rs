//! Role gate for the page routes served by the frontend.

use serde::Serialize;
use uuid::Uuid;

use crate::db::account_repository::AccountRepository;
use crate::models::account::UserRole;
use crate::routes::auth::claims::{Claims, SessionKind};

const USER_ROUTES: &[&str] = &[
    "/dashboard",
    "/add-startup",
    "/view-startup",
    "/pricing",
    "/payment-success",
    "/startup-details",
];
const ADMIN_ROUTES: &[&str] = &[
    "/admin/dashboard",
    "/admin/user-list",
    "/admin/startup-list",
    "/admin/investor-list",
];
pub const ADMIN_LOGIN_PAGE: &str = "/admin";
pub const HOME_PAGE: &str = "/";
pub const USER_HOME: &str = "/dashboard";
pub const ADMIN_HOME: &str = "/admin/dashboard";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    Public,
    UserArea,
    AdminArea,
    AdminLogin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Viewer {
    Anonymous,
    User,
    Admin,
}

impl From<Option<UserRole>> for Viewer {
    fn from(role: Option<UserRole>) -> Self {
        match role {
            None => Viewer::Anonymous,
            Some(UserRole::User) => Viewer::User,
            Some(UserRole::Admin) => Viewer::Admin,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "location", rename_all = "snake_case")]
pub enum GateDecision {
    Allow,
    Redirect(&'static str),
}

fn matches_prefix(path: &str, route: &str) -> bool {
    path.strip_prefix(route)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'))
}

pub fn classify(path: &str) -> RouteClass {
    let path = match path.len() {
        1 => path,
        _ => path.trim_end_matches('/'),
    };
    if path == ADMIN_LOGIN_PAGE {
        RouteClass::AdminLogin
    } else if ADMIN_ROUTES.iter().any(|r| matches_prefix(path, r)) {
        RouteClass::AdminArea
    } else if USER_ROUTES.iter().any(|r| matches_prefix(path, r)) {
        RouteClass::UserArea
    } else {
        RouteClass::Public
    }
}

pub fn decide(path: &str, viewer: Viewer) -> GateDecision {
    match (classify(path), viewer) {
        (RouteClass::UserArea, Viewer::Anonymous) => GateDecision::Redirect(HOME_PAGE),
        (RouteClass::UserArea, Viewer::Admin) => GateDecision::Redirect(ADMIN_HOME),
        (RouteClass::AdminArea, Viewer::Anonymous) => GateDecision::Redirect(ADMIN_LOGIN_PAGE),
        (RouteClass::AdminArea, Viewer::User) => GateDecision::Redirect(USER_HOME),
        (RouteClass::AdminLogin, Viewer::Admin) => GateDecision::Redirect(ADMIN_HOME),
        _ => GateDecision::Allow,
    }
}

/// Resolves the effective role of a session. Back-office logins carry their
/// role in the token; account sessions are re-read from storage so a role
/// change takes effect without a new login.
pub async fn resolve_role(
    accounts: &dyn AccountRepository,
    claims: &Claims,
) -> Result<Option<UserRole>, sqlx::Error> {
    match claims.kind {
        SessionKind::AdminLogin => Ok((claims.role == UserRole::Admin).then_some(UserRole::Admin)),
        SessionKind::Account => match Uuid::parse_str(&claims.sub) {
            Ok(id) => accounts.find_role(id).await,
            Err(_) => Ok(None),
        },
    }
}
