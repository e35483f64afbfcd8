use {
    super::money::{CurrencyCode, Money, within_tolerance},
    super::payment::StatusUpdate,
    super::reference::Reference,
    super::status::CanonicalStatus,
    chrono::{DateTime, Utc},
    rust_decimal::Decimal,
    rust_decimal_macros::dec,
    serde::Serialize,
    std::fmt,
};

/// Tolerances applied by the amount checks. Product policy, so it comes
/// from configuration rather than constants at the call site.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VerificationPolicy {
    /// Allowed relative difference between expected and reported price.
    pub amount_tolerance: Decimal,
    /// Minimum `actually_paid / pay_amount` for crypto payments.
    pub min_received_ratio: Decimal,
}

impl Default for VerificationPolicy {
    fn default() -> Self {
        Self {
            amount_tolerance: dec!(0.01),
            min_received_ratio: dec!(0.95),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum VerificationFailure {
    ReferenceMismatch {
        expected: String,
        actual: String,
    },
    StatusNotCompleted {
        status: CanonicalStatus,
    },
    AmountMismatch {
        expected: Decimal,
        actual: Decimal,
    },
    CurrencyMismatch {
        expected: String,
        actual: String,
    },
    InsufficientReceived {
        pay_amount: Decimal,
        actually_paid: Decimal,
    },
}

impl fmt::Display for VerificationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReferenceMismatch { expected, actual } => {
                write!(f, "provider transaction belongs to {actual}, not {expected}")
            }
            Self::StatusNotCompleted { status } => {
                write!(f, "status is {status}, not completed")
            }
            Self::AmountMismatch { expected, actual } => {
                write!(f, "amount mismatch: expected {expected}, provider reported {actual}")
            }
            Self::CurrencyMismatch { expected, actual } => {
                write!(f, "currency mismatch: expected {expected}, provider reported {actual}")
            }
            Self::InsufficientReceived {
                pay_amount,
                actually_paid,
            } => write!(
                f,
                "received {actually_paid} of requested {pay_amount}, below the accepted minimum"
            ),
        }
    }
}

/// Provider-reported facts the checks run against, already converted out
/// of provider field names.
#[derive(Debug, Clone)]
pub struct ObservedPayment {
    pub status: CanonicalStatus,
    pub raw_status: String,
    pub provider_transaction_id: Option<String>,
    /// Our reference as echoed back by the provider, when it reports one.
    pub order_reference: Option<String>,
    pub price_amount: Decimal,
    pub price_currency: String,
    /// Crypto only: `(pay_amount, actually_paid)`.
    pub received: Option<(Decimal, Decimal)>,
    pub paid_at: Option<DateTime<Utc>>,
    pub channel: Option<String>,
    pub failure_reason: Option<String>,
    pub raw: serde_json::Value,
}

/// Outcome of one verification. Ephemeral; never persisted as-is.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationResult {
    pub verified: bool,
    pub status: CanonicalStatus,
    pub raw_status: String,
    pub reference_valid: bool,
    pub status_valid: bool,
    pub amount_valid: bool,
    pub currency_valid: bool,
    pub received_valid: bool,
    pub failures: Vec<VerificationFailure>,
    pub message: String,
    pub provider_transaction_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub channel: Option<String>,
    #[serde(skip)]
    pub failure_reason: Option<String>,
    pub raw: serde_json::Value,
    /// Set when the provider was never asked, so nothing was decided.
    #[serde(skip)]
    pub inconclusive: bool,
}

impl VerificationResult {
    /// Run the status, amount and received-amount checks independently and
    /// report each.
    pub fn evaluate(
        reference: &Reference,
        expected: &Money,
        observed: ObservedPayment,
        policy: &VerificationPolicy,
    ) -> Self {
        let mut failures = Vec::new();

        let reference_valid = match &observed.order_reference {
            Some(actual) if actual != reference.as_str() => {
                failures.push(VerificationFailure::ReferenceMismatch {
                    expected: reference.to_string(),
                    actual: actual.clone(),
                });
                false
            }
            _ => true,
        };

        let status_valid = observed.status == CanonicalStatus::Completed;
        if !status_valid {
            failures.push(VerificationFailure::StatusNotCompleted {
                status: observed.status,
            });
        }

        let currency_valid = CurrencyCode::new(observed.price_currency.clone())
            .map(|c| &c == expected.currency())
            .unwrap_or(false);
        if !currency_valid {
            failures.push(VerificationFailure::CurrencyMismatch {
                expected: expected.currency().to_string(),
                actual: observed.price_currency.clone(),
            });
        }

        let price_valid = within_tolerance(
            expected.amount(),
            observed.price_amount,
            policy.amount_tolerance,
        );
        if !price_valid {
            failures.push(VerificationFailure::AmountMismatch {
                expected: expected.amount(),
                actual: observed.price_amount,
            });
        }
        let amount_valid = price_valid && currency_valid;

        let received_valid = match observed.received {
            None => true,
            Some((pay_amount, actually_paid)) => {
                let ok = actually_paid >= pay_amount * policy.min_received_ratio;
                if !ok {
                    failures.push(VerificationFailure::InsufficientReceived {
                        pay_amount,
                        actually_paid,
                    });
                }
                ok
            }
        };

        let verified = reference_valid && status_valid && amount_valid && received_valid;
        let message = if verified {
            "payment verified".to_string()
        } else {
            failures
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ")
        };

        Self {
            verified,
            status: observed.status,
            raw_status: observed.raw_status,
            reference_valid,
            status_valid,
            amount_valid,
            currency_valid,
            received_valid,
            failures,
            message,
            provider_transaction_id: observed.provider_transaction_id,
            paid_at: observed.paid_at,
            channel: observed.channel,
            failure_reason: observed.failure_reason,
            raw: observed.raw,
            inconclusive: false,
        }
    }

    /// Nothing could be confirmed yet. The payment stays where it is.
    pub fn inconclusive(status: CanonicalStatus, message: impl Into<String>) -> Self {
        Self {
            verified: false,
            status,
            raw_status: status.as_str().to_string(),
            reference_valid: true,
            status_valid: false,
            amount_valid: false,
            currency_valid: false,
            received_valid: false,
            failures: vec![VerificationFailure::StatusNotCompleted { status }],
            message: message.into(),
            provider_transaction_id: None,
            paid_at: None,
            channel: None,
            failure_reason: None,
            raw: serde_json::Value::Null,
            inconclusive: true,
        }
    }

    pub fn is_inconclusive(&self) -> bool {
        self.inconclusive
    }

    /// Status to persist, or `None` when the provider record does not
    /// belong to this payment. A completed payment whose amounts do not
    /// check out is recorded as failed, never as completed.
    pub fn status_update(&self) -> Option<StatusUpdate> {
        if !self.reference_valid {
            return None;
        }
        let (status, failure_reason) = if self.status.is_success() && !self.verified {
            (CanonicalStatus::Failed, Some(self.message.clone()))
        } else if self.status.is_success() {
            (self.status, None)
        } else {
            (self.status, self.failure_reason.clone())
        };
        Some(StatusUpdate {
            status,
            raw_status: self.raw_status.clone(),
            provider_transaction_id: self.provider_transaction_id.clone(),
            paid_at: self.paid_at,
            channel: self.channel.clone(),
            failure_reason,
        })
    }
}
