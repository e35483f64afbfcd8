use {
    crate::domain::{
        payment::{Payment, RequestType},
        status::StatusCategory,
        store::PaymentStore,
    },
    serde::Serialize,
    std::sync::Arc,
};

/// Result of looking for an earlier payment on the same request. A failed
/// lookup is its own variant so it is never mistaken for `Clear`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ExistingPaymentCheck {
    Clear,
    Paid { payment: Box<Payment> },
    Pending { payment: Box<Payment> },
    /// The lookup itself failed. Availability wins: the caller may proceed.
    Unavailable { reason: String },
}

impl ExistingPaymentCheck {
    pub fn has_paid(&self) -> bool {
        matches!(self, Self::Paid { .. })
    }

    pub fn has_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }

    pub fn payment(&self) -> Option<&Payment> {
        match self {
            Self::Paid { payment } | Self::Pending { payment } => Some(payment),
            Self::Clear | Self::Unavailable { .. } => None,
        }
    }

    pub fn check_failed(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    /// Paid or in-flight requests block a new attempt; a failed check does not.
    pub fn allows_new_attempt(&self) -> bool {
        matches!(self, Self::Clear | Self::Unavailable { .. })
    }
}

pub struct DuplicatePaymentGuard {
    store: Arc<dyn PaymentStore>,
}

impl DuplicatePaymentGuard {
    pub fn new(store: Arc<dyn PaymentStore>) -> Self {
        Self { store }
    }

    #[tracing::instrument(name = "duplicate_guard", skip(self))]
    pub async fn check_existing(
        &self,
        request_id: &str,
        request_type: RequestType,
    ) -> ExistingPaymentCheck {
        let payments = match self.store.find_for_request(request_id, request_type).await {
            Ok(payments) => payments,
            Err(e) => {
                tracing::error!(
                    guard_unavailable = true,
                    error = %e,
                    "existing-payment check failed, not blocking"
                );
                return ExistingPaymentCheck::Unavailable {
                    reason: e.to_string(),
                };
            }
        };

        if let Some(paid) = payments
            .iter()
            .find(|p| p.status.is_in(StatusCategory::Success))
        {
            tracing::info!(reference = %paid.reference, "request already paid");
            return ExistingPaymentCheck::Paid {
                payment: Box::new(paid.clone()),
            };
        }

        if let Some(pending) = payments
            .iter()
            .find(|p| p.status.is_in(StatusCategory::InProgress))
        {
            tracing::info!(
                reference = %pending.reference,
                status = %pending.status,
                "request has a payment in flight"
            );
            return ExistingPaymentCheck::Pending {
                payment: Box::new(pending.clone()),
            };
        }

        ExistingPaymentCheck::Clear
    }
}
