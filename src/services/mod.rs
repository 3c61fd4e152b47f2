pub mod dodo;
pub mod identity;
pub mod ledger;
