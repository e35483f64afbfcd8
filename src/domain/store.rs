use {
    super::error::PaymentError,
    super::payment::{NewPayment, Payment, RequestType, StatusUpdate, TransitionOutcome},
    super::reference::Reference,
    std::{future::Future, pin::Pin},
};

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, PaymentError>> + Send + 'a>>;

/// Persistence for payment records. Implementations must enforce reference
/// uniqueness and apply `record_verification` atomically per reference.
pub trait PaymentStore: Send + Sync {
    fn insert<'a>(&'a self, payment: &'a NewPayment) -> StoreFuture<'a, Payment>;

    fn find_by_reference<'a>(
        &'a self,
        reference: &'a Reference,
    ) -> StoreFuture<'a, Option<Payment>>;

    /// Newest first.
    fn find_for_request<'a>(
        &'a self,
        request_id: &'a str,
        request_type: RequestType,
    ) -> StoreFuture<'a, Vec<Payment>>;

    /// The only mutator of payment status.
    fn record_verification<'a>(
        &'a self,
        reference: &'a Reference,
        update: &'a StatusUpdate,
        actor: &'a str,
    ) -> StoreFuture<'a, TransitionOutcome>;
}
