//! Correlation identifiers linking an internal payment attempt to a
//! provider transaction: `<prefix>_<unix millis>_<random>`.
//!
//! The generator only makes collisions unlikely. Uniqueness is enforced by
//! the payment store.

use {
    super::error::PaymentError,
    chrono::{DateTime, TimeZone, Utc},
    derive_more::Display,
    rand::{Rng, distributions::Alphanumeric},
    serde::{Deserialize, Serialize},
};

const RANDOM_LEN: usize = 9;

/// A validated reference. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Reference(String);

impl Reference {
    pub fn new(id: impl Into<String>) -> Result<Self, PaymentError> {
        let id = id.into();
        if !validate(&id) {
            return Err(PaymentError::InvalidReference(id));
        }
        Ok(Self(id))
    }

    pub fn generate(prefix: &str) -> Result<Self, PaymentError> {
        generate(prefix).map(Self)
    }

    pub fn parse(&self) -> ParsedReference {
        parse(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl TryFrom<String> for Reference {
    type Error = PaymentError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Reference> for String {
    fn from(r: Reference) -> Self {
        r.0
    }
}

/// Fields recovered from a reference. Every field is `None` when the input
/// is malformed; parsing is for diagnostics and never fails.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedReference {
    pub prefix: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub random: Option<String>,
}

pub fn generate(prefix: &str) -> Result<String, PaymentError> {
    if !is_valid_segment(prefix) {
        return Err(PaymentError::InvalidReference(format!(
            "prefix must be non-empty and use [A-Za-z0-9.=-], got: {prefix}"
        )));
    }
    let random: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(RANDOM_LEN)
        .map(char::from)
        .collect();
    Ok(format!("{prefix}_{}_{random}", Utc::now().timestamp_millis()))
}

pub fn parse(id: &str) -> ParsedReference {
    let parts: Vec<&str> = id.split('_').collect();
    let [prefix, millis, random] = parts.as_slice() else {
        return ParsedReference::default();
    };
    let timestamp = millis
        .parse::<i64>()
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single());
    let Some(timestamp) = timestamp else {
        return ParsedReference::default();
    };
    ParsedReference {
        prefix: Some((*prefix).to_string()),
        timestamp: Some(timestamp),
        random: Some((*random).to_string()),
    }
}

/// Exactly three non-empty `_`-delimited segments drawn from the
/// characters providers accept in a reference.
pub fn validate(id: &str) -> bool {
    let segments: Vec<&str> = id.split('_').collect();
    segments.len() == 3 && segments.iter().all(|s| is_valid_segment(s))
}

fn is_valid_segment(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '='))
}
