use serde::{Deserialize, Serialize};

use crate::models::account::UserRole;

/// `Account` sessions belong to a provisioned account and resolve their role
/// from storage; `AdminLogin` sessions come from the back-office login and
/// carry no account.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Account,
    AdminLogin,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub role: UserRole,
    pub kind: SessionKind,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}
