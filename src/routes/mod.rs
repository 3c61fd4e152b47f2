pub mod access;
pub mod admin;
pub mod auth;
pub mod checkout;
pub mod credits;
pub mod webhooks;
