//! Provider status vocabularies and their mapping onto one canonical status.
//!
//! Category membership is derived from [`CanonicalStatus`] only, so nothing
//! after normalization branches on which provider reported the status.

use {
    super::error::PaymentError,
    serde::{Deserialize, Serialize},
    std::{fmt, str::FromStr},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    CardBank,
    Crypto,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CardBank => "card_bank",
            Self::Crypto => "crypto",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "card_bank" => Ok(Self::CardBank),
            "crypto" => Ok(Self::Crypto),
            other => Err(PaymentError::UnsupportedProvider(other.to_string())),
        }
    }
}

/// Raw statuses reported by the card/bank gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardBankStatus {
    Success,
    Failed,
    Abandoned,
    Reversed,
    Ongoing,
    Pending,
    Queued,
}

impl CardBankStatus {
    pub const ALL: [Self; 7] = [
        Self::Success,
        Self::Failed,
        Self::Abandoned,
        Self::Reversed,
        Self::Ongoing,
        Self::Pending,
        Self::Queued,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Abandoned => "abandoned",
            Self::Reversed => "reversed",
            Self::Ongoing => "ongoing",
            Self::Pending => "pending",
            Self::Queued => "queued",
        }
    }

    pub fn canonical(&self) -> CanonicalStatus {
        match self {
            Self::Success => CanonicalStatus::Completed,
            Self::Failed | Self::Abandoned => CanonicalStatus::Failed,
            Self::Reversed => CanonicalStatus::Reversed,
            Self::Ongoing | Self::Pending | Self::Queued => CanonicalStatus::Pending,
        }
    }
}

impl FromStr for CardBankStatus {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| PaymentError::UnknownStatus {
                provider: ProviderKind::CardBank.as_str(),
                status: s.to_string(),
            })
    }
}

/// Raw statuses reported by the crypto gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoStatus {
    Waiting,
    Confirming,
    Confirmed,
    Sending,
    Finished,
    PartiallyPaid,
    Failed,
    Expired,
    Refunded,
}

impl CryptoStatus {
    pub const ALL: [Self; 9] = [
        Self::Waiting,
        Self::Confirming,
        Self::Confirmed,
        Self::Sending,
        Self::Finished,
        Self::PartiallyPaid,
        Self::Failed,
        Self::Expired,
        Self::Refunded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Confirming => "confirming",
            Self::Confirmed => "confirmed",
            Self::Sending => "sending",
            Self::Finished => "finished",
            Self::PartiallyPaid => "partially_paid",
            Self::Failed => "failed",
            Self::Expired => "expired",
            Self::Refunded => "refunded",
        }
    }

    pub fn canonical(&self) -> CanonicalStatus {
        match self {
            Self::Waiting => CanonicalStatus::Waiting,
            Self::Confirming => CanonicalStatus::Confirming,
            Self::Confirmed => CanonicalStatus::Confirmed,
            Self::Sending => CanonicalStatus::Sending,
            Self::Finished => CanonicalStatus::Completed,
            Self::PartiallyPaid => CanonicalStatus::PartiallyPaid,
            Self::Failed => CanonicalStatus::Failed,
            Self::Expired => CanonicalStatus::Expired,
            Self::Refunded => CanonicalStatus::Refunded,
        }
    }
}

impl FromStr for CryptoStatus {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| PaymentError::UnknownStatus {
                provider: ProviderKind::Crypto.as_str(),
                status: s.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalStatus {
    Pending,
    Completed,
    Failed,
    Expired,
    Waiting,
    Confirming,
    Confirmed,
    Sending,
    PartiallyPaid,
    Refunded,
    Reversed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCategory {
    Success,
    InProgress,
    Failed,
    Final,
    PendingBlockchain,
}

impl CanonicalStatus {
    pub const ALL: [Self; 11] = [
        Self::Pending,
        Self::Completed,
        Self::Failed,
        Self::Expired,
        Self::Waiting,
        Self::Confirming,
        Self::Confirmed,
        Self::Sending,
        Self::PartiallyPaid,
        Self::Refunded,
        Self::Reversed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Expired => "expired",
            Self::Waiting => "waiting",
            Self::Confirming => "confirming",
            Self::Confirmed => "confirmed",
            Self::Sending => "sending",
            Self::PartiallyPaid => "partially_paid",
            Self::Refunded => "refunded",
            Self::Reversed => "reversed",
        }
    }

    pub fn is_in(&self, category: StatusCategory) -> bool {
        use CanonicalStatus::*;
        match category {
            StatusCategory::Success => matches!(self, Completed),
            StatusCategory::InProgress => matches!(
                self,
                Pending | Waiting | Confirming | Confirmed | Sending | PartiallyPaid
            ),
            StatusCategory::Failed => matches!(self, Failed | Expired | Refunded | Reversed),
            StatusCategory::Final => {
                matches!(self, Completed | Failed | Expired | Refunded | Reversed)
            }
            StatusCategory::PendingBlockchain => {
                matches!(self, Waiting | Confirming | Confirmed | Sending)
            }
        }
    }

    pub fn is_success(&self) -> bool {
        self.is_in(StatusCategory::Success)
    }

    pub fn is_in_progress(&self) -> bool {
        self.is_in(StatusCategory::InProgress)
    }

    pub fn is_final(&self) -> bool {
        self.is_in(StatusCategory::Final)
    }

    /// Final statuses are sticky. The only exit from one is a completed
    /// payment later being refunded or reversed.
    pub fn can_transition_to(&self, next: &CanonicalStatus) -> bool {
        if self == next {
            return false;
        }
        if !self.is_final() {
            return true;
        }
        matches!(
            (self, next),
            (Self::Completed, Self::Refunded) | (Self::Completed, Self::Reversed)
        )
    }
}

impl fmt::Display for CanonicalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for CanonicalStatus {
    type Error = PaymentError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| PaymentError::Validation(format!("unknown payment status: {s}")))
    }
}

/// Map a provider-native status onto the canonical model. Unknown strings
/// are an error, never a silent default.
pub fn normalize(raw: &str, provider: ProviderKind) -> Result<CanonicalStatus, PaymentError> {
    let raw = raw.trim().to_ascii_lowercase();
    match provider {
        ProviderKind::CardBank => raw.parse::<CardBankStatus>().map(|s| s.canonical()),
        ProviderKind::Crypto => raw.parse::<CryptoStatus>().map(|s| s.canonical()),
    }
}
