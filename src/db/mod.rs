pub mod account_repository;
#[cfg(test)]
pub mod mock_db;
pub mod postgres_account_repository;
pub mod postgres_transaction_repository;
pub mod transaction_repository;
