pub mod audit;
pub mod error;
pub mod money;
pub mod payment;
pub mod provider;
pub mod reference;
pub mod status;
pub mod store;
pub mod verification;
