use {
    super::audit::StatusHistoryEntry,
    super::error::PaymentError,
    super::money::Money,
    super::reference::Reference,
    super::status::{CanonicalStatus, ProviderKind},
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::{fmt, str::FromStr},
    uuid::Uuid,
};

/// Marketplace domain a payment pays for. Picks the reference prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    Logistics,
    Security,
    Hospitality,
    Event,
    Generic,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Logistics => "logistics",
            Self::Security => "security",
            Self::Hospitality => "hospitality",
            Self::Event => "event",
            Self::Generic => "generic",
        }
    }

    pub fn reference_prefix(&self) -> &'static str {
        match self {
            Self::Logistics => "LGS",
            Self::Security => "SEC",
            Self::Hospitality => "HSP",
            Self::Event => "EVT",
            Self::Generic => "PAY",
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestType {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "logistics" => Ok(Self::Logistics),
            "security" => Ok(Self::Security),
            "hospitality" => Ok(Self::Hospitality),
            "event" => Ok(Self::Event),
            "generic" => Ok(Self::Generic),
            other => Err(PaymentError::Validation(format!(
                "unknown request type: {other}"
            ))),
        }
    }
}

/// The booking or quote request a payment settles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestLink {
    pub request_id: String,
    pub request_type: RequestType,
}

/// Durable record of one payment attempt.
#[derive(Debug, Clone, Serialize)]
pub struct Payment {
    pub id: Uuid,
    pub reference: Reference,
    pub provider: ProviderKind,
    /// Provider-native transaction id. Write-once.
    pub provider_transaction_id: Option<String>,
    /// Hosted-page or checkout id returned at initialization.
    pub checkout_id: Option<String>,
    pub money: Money,
    /// Crypto only: the coin the customer pays in.
    pub pay_currency: Option<String>,
    pub status: CanonicalStatus,
    pub raw_status: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub channel: Option<String>,
    pub failure_reason: Option<String>,
    pub link: Option<RequestLink>,
    pub customer_email: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// For INSERT at initialization time. Always starts in `pending`.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub id: Uuid,
    pub reference: Reference,
    pub provider: ProviderKind,
    pub checkout_id: Option<String>,
    pub money: Money,
    pub pay_currency: Option<String>,
    pub raw_status: Option<String>,
    pub link: Option<RequestLink>,
    pub customer_email: String,
    pub metadata: serde_json::Value,
}

impl NewPayment {
    pub fn status(&self) -> CanonicalStatus {
        CanonicalStatus::Pending
    }

    pub fn into_payment(self, now: DateTime<Utc>) -> Payment {
        Payment {
            id: self.id,
            reference: self.reference,
            provider: self.provider,
            provider_transaction_id: None,
            checkout_id: self.checkout_id,
            money: self.money,
            pay_currency: self.pay_currency,
            status: CanonicalStatus::Pending,
            raw_status: self.raw_status,
            paid_at: None,
            channel: None,
            failure_reason: None,
            link: self.link,
            customer_email: self.customer_email,
            metadata: self.metadata,
            created_at: now,
            updated_at: now,
        }
    }
}

/// What a verification wants persisted. Produced only by the
/// verification pipeline.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub status: CanonicalStatus,
    pub raw_status: String,
    pub provider_transaction_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub channel: Option<String>,
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// Status advanced.
    Updated {
        from: CanonicalStatus,
        to: CanonicalStatus,
    },
    /// Same status already recorded. Nothing changed.
    Unchanged(CanonicalStatus),
    /// Transition not allowed by the state machine. Logged, not applied.
    Anomaly {
        current: CanonicalStatus,
        incoming: CanonicalStatus,
    },
}

impl Payment {
    /// Decide what `update` does to this record without mutating it.
    pub fn decide(&self, update: &StatusUpdate) -> TransitionOutcome {
        if self.status == update.status {
            TransitionOutcome::Unchanged(self.status)
        } else if self.status.can_transition_to(&update.status) {
            TransitionOutcome::Updated {
                from: self.status,
                to: update.status,
            }
        } else {
            TransitionOutcome::Anomaly {
                current: self.status,
                incoming: update.status,
            }
        }
    }

    /// Apply `update` in place. The provider transaction id is only ever
    /// set once; nullable details are filled but never cleared.
    pub fn apply(&mut self, update: &StatusUpdate, now: DateTime<Utc>) -> TransitionOutcome {
        let outcome = self.decide(update);
        if let TransitionOutcome::Updated { .. } = outcome {
            self.status = update.status;
            self.raw_status = Some(update.raw_status.clone());
            if self.paid_at.is_none() {
                self.paid_at = update.paid_at;
            }
            if update.channel.is_some() {
                self.channel = update.channel.clone();
            }
            self.failure_reason = update.failure_reason.clone();
            self.updated_at = now;
        }
        if self.provider_transaction_id.is_none() {
            self.provider_transaction_id = update.provider_transaction_id.clone();
        }
        outcome
    }

    pub fn history_entry(
        &self,
        outcome: &TransitionOutcome,
        actor: &str,
    ) -> Option<StatusHistoryEntry> {
        let TransitionOutcome::Updated { from, to } = outcome else {
            return None;
        };
        Some(StatusHistoryEntry {
            id: Uuid::now_v7(),
            payment_id: self.id,
            reference: self.reference.as_str().to_string(),
            from_status: *from,
            to_status: *to,
            actor: actor.to_string(),
            detail: serde_json::json!({
                "provider": self.provider.as_str(),
                "raw_status": self.raw_status,
                "provider_transaction_id": self.provider_transaction_id,
            }),
        })
    }
}
