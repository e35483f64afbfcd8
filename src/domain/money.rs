use {
    super::error::PaymentError,
    derive_more::Display,
    rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive},
    serde::{Deserialize, Serialize},
};

/// Minor units per major unit for every currency the card/bank gateway
/// settles in (NGN, GHS, ZAR, KES, USD).
const MINOR_PER_MAJOR: i64 = 100;

/// ISO 4217 or crypto ticker (`usd`, `NGN`, `usdttrc20`). Compared
/// case-insensitively.
#[derive(Debug, Clone, Eq, Display, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    pub fn new(code: impl Into<String>) -> Result<Self, PaymentError> {
        let code = code.into();
        let valid =
            (2..=12).contains(&code.len()) && code.chars().all(|c| c.is_ascii_alphanumeric());
        if !valid {
            return Err(PaymentError::Validation(format!(
                "currency code must be 2-12 alphanumerics, got: {code}"
            )));
        }
        Ok(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_upper(&self) -> String {
        self.0.to_ascii_uppercase()
    }

    pub fn to_lower(&self) -> String {
        self.0.to_ascii_lowercase()
    }
}

impl PartialEq for CurrencyCode {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = PaymentError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<CurrencyCode> for String {
    fn from(c: CurrencyCode) -> Self {
        c.0
    }
}

/// Major-unit amount and currency, as the caller expects to be charged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Money {
    amount: Decimal,
    currency: CurrencyCode,
}

impl Money {
    pub fn new(amount: Decimal, currency: CurrencyCode) -> Result<Self, PaymentError> {
        if amount <= Decimal::ZERO {
            return Err(PaymentError::Validation(format!(
                "amount must be positive, got: {amount}"
            )));
        }
        Ok(Self { amount, currency })
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> &CurrencyCode {
        &self.currency
    }
}

/// Major → minor units, rounding half away from zero. Never truncates.
pub fn to_minor_units(amount: Decimal) -> Result<i64, PaymentError> {
    if amount.is_sign_negative() {
        return Err(PaymentError::Validation(format!(
            "amount cannot be negative, got: {amount}"
        )));
    }
    amount
        .checked_mul(Decimal::from(MINOR_PER_MAJOR))
        .map(|minor| minor.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|minor| minor.to_i64())
        .ok_or_else(|| PaymentError::Validation(format!("amount out of range: {amount}")))
}

pub fn from_minor_units(minor: i64) -> Decimal {
    Decimal::new(minor, 2)
}

/// `|actual - expected| <= expected * tolerance`.
pub fn within_tolerance(expected: Decimal, actual: Decimal, tolerance: Decimal) -> bool {
    (actual - expected).abs() <= expected.abs() * tolerance
}
