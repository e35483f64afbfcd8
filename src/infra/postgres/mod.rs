mod history_repo;
mod payment_repo;

pub use payment_repo::PgPaymentStore;
