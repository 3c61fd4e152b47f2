use crate::config::Config;
use crate::db::{account_repository::AccountRepository, transaction_repository::TransactionRepository};
use crate::services::dodo::PaymentGateway;
use crate::services::identity::IdentityVerifier;
use crate::services::ledger::CreditLedger;
use crate::utils::jwt::{JwtKeyProvider, JwtKeys};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<dyn AccountRepository>,
    pub transactions: Arc<dyn TransactionRepository>,
    pub payments: Arc<dyn PaymentGateway>,
    pub ledger: Arc<CreditLedger>,
    pub identity: Arc<IdentityVerifier>,
    pub config: Arc<Config>,
    pub jwt_keys: Arc<JwtKeys>,
}

impl JwtKeyProvider for AppState {
    fn jwt_keys(&self) -> &JwtKeys {
        &self.jwt_keys
    }

    fn jwt_issuer(&self) -> &str {
        &self.config.jwt_issuer
    }

    fn jwt_audience(&self) -> &str {
        &self.config.jwt_audience
    }
}
