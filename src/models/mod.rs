pub mod account;
pub mod plan;
pub mod transaction;
