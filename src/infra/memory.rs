//! Process-local payment store, used by tests and single-node development.

use {
    crate::domain::{
        audit::StatusHistoryEntry,
        error::PaymentError,
        payment::{NewPayment, Payment, RequestType, StatusUpdate, TransitionOutcome},
        reference::Reference,
        store::{PaymentStore, StoreFuture},
    },
    chrono::Utc,
    std::collections::HashMap,
    tokio::sync::RwLock,
};

#[derive(Default)]
struct Tables {
    payments: HashMap<Reference, Payment>,
    history: Vec<StatusHistoryEntry>,
}

#[derive(Default)]
pub struct InMemoryPaymentStore {
    tables: RwLock<Tables>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applied transitions for `reference`, oldest first.
    pub async fn history(&self, reference: &Reference) -> Vec<StatusHistoryEntry> {
        self.tables
            .read()
            .await
            .history
            .iter()
            .filter(|h| h.reference == reference.as_str())
            .cloned()
            .collect()
    }
}

impl PaymentStore for InMemoryPaymentStore {
    fn insert<'a>(&'a self, payment: &'a NewPayment) -> StoreFuture<'a, Payment> {
        Box::pin(async move {
            let mut tables = self.tables.write().await;
            if tables.payments.contains_key(&payment.reference) {
                return Err(PaymentError::Validation(format!(
                    "reference {} already exists",
                    payment.reference
                )));
            }
            let stored = payment.clone().into_payment(Utc::now());
            tables
                .payments
                .insert(stored.reference.clone(), stored.clone());
            Ok(stored)
        })
    }

    fn find_by_reference<'a>(
        &'a self,
        reference: &'a Reference,
    ) -> StoreFuture<'a, Option<Payment>> {
        Box::pin(async move { Ok(self.tables.read().await.payments.get(reference).cloned()) })
    }

    fn find_for_request<'a>(
        &'a self,
        request_id: &'a str,
        request_type: RequestType,
    ) -> StoreFuture<'a, Vec<Payment>> {
        Box::pin(async move {
            let tables = self.tables.read().await;
            let mut found: Vec<Payment> = tables
                .payments
                .values()
                .filter(|p| {
                    p.link
                        .as_ref()
                        .is_some_and(|l| {
                            l.request_id == request_id && l.request_type == request_type
                        })
                })
                .cloned()
                .collect();
            found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
            Ok(found)
        })
    }

    fn record_verification<'a>(
        &'a self,
        reference: &'a Reference,
        update: &'a StatusUpdate,
        actor: &'a str,
    ) -> StoreFuture<'a, TransitionOutcome> {
        Box::pin(async move {
            // The write lock serializes verifications the way the advisory
            // lock does in Postgres.
            let mut tables = self.tables.write().await;
            let payment = tables
                .payments
                .get_mut(reference)
                .ok_or_else(|| PaymentError::NotFound(format!("payment {reference}")))?;
            let outcome = payment.apply(update, Utc::now());
            let entry = payment.history_entry(&outcome, actor);
            if let Some(entry) = entry {
                tables.history.push(entry);
            }
            Ok(outcome)
        })
    }
}
