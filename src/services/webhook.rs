//! Webhook authentication and handling.
//!
//! The two providers canonicalize differently before signing: the card/bank
//! gateway signs the raw request body, the crypto gateway signs its JSON
//! payload re-serialized with keys sorted recursively. Both use
//! HMAC-SHA512, hex encoded.
//!
//! An authenticated notification never updates a payment by itself. It
//! names the transaction to re-verify and the gateway's verification
//! decides what is persisted.

use {
    super::gateway::{Confirmation, PaymentGateway},
    crate::{
        adapters::{http::string_or_number, nowpayments::parse_timestamp},
        domain::{
            error::PaymentError,
            money::from_minor_units,
            payment::TransitionOutcome,
            reference::Reference,
            status::{CanonicalStatus, ProviderKind, normalize},
        },
    },
    chrono::{DateTime, Utc},
    hmac::{Hmac, Mac},
    rust_decimal::Decimal,
    serde::Deserialize,
    serde_json::Value,
    sha2::Sha512,
    std::{net::IpAddr, sync::Arc},
};

pub const CARD_BANK_SIGNATURE_HEADER: &str = "x-paystack-signature";
pub const CRYPTO_SIGNATURE_HEADER: &str = "x-nowpayments-sig";

/// Published source addresses of card/bank webhook deliveries.
pub const CARD_BANK_WEBHOOK_IPS: [&str; 3] = ["52.31.139.75", "52.49.173.169", "52.214.14.220"];

type HmacSha512 = Hmac<Sha512>;

/// Hex-encoded HMAC-SHA512 of `message`.
pub fn sign(secret: &[u8], message: &[u8]) -> Result<String, PaymentError> {
    let mut mac = HmacSha512::new_from_slice(secret)
        .map_err(|_| PaymentError::Configuration("unusable webhook secret".into()))?;
    mac.update(message);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a hex signature over `message`.
pub fn verify_signature(
    secret: &[u8],
    message: &[u8],
    signature: &str,
) -> Result<(), PaymentError> {
    let provided = hex::decode(signature.trim())
        .map_err(|_| PaymentError::SignatureMismatch("signature is not valid hex".into()))?;
    let mut mac = HmacSha512::new_from_slice(secret)
        .map_err(|_| PaymentError::SignatureMismatch("unusable secret".into()))?;
    mac.update(message);
    mac.verify_slice(&provided)
        .map_err(|_| PaymentError::SignatureMismatch("digest mismatch".into()))
}

/// Recursively sort object keys. Integral floats are written without a
/// fractional part, matching how the crypto provider serializes numbers.
const MAX_EXACT_F64_INT: f64 = 9_007_199_254_740_992.0;

pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = serde_json::Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        Value::Number(n) => match n.as_f64() {
            Some(f) if !n.is_i64() && !n.is_u64() && is_integral(f) => Value::from(f as i64),
            _ => value.clone(),
        },
        other => other.clone(),
    }
}

/// Whole floats inside the range where `f64` still represents every integer.
fn is_integral(f: f64) -> bool {
    f.fract() == 0.0 && f.abs() < MAX_EXACT_F64_INT
}

pub fn canonical_json(body: &[u8]) -> Result<String, PaymentError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|_| PaymentError::SignatureMismatch("body is not JSON".into()))?;
    Ok(serde_json::to_string(&canonicalize(&value))?)
}

/// Notification fields both providers share, in internal terms.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    pub provider: ProviderKind,
    pub event_type: String,
    pub payment_id: Option<String>,
    pub order_id: Option<String>,
    pub raw_status: Option<String>,
    pub status: Option<CanonicalStatus>,
    pub price_amount: Option<Decimal>,
    pub price_currency: Option<String>,
    pub actually_paid: Option<Decimal>,
    pub pay_currency: Option<String>,
    pub occurred_at: Option<DateTime<Utc>>,
}

impl WebhookEvent {
    /// Events that can change a payment's state.
    pub fn is_actionable(&self) -> bool {
        match self.provider {
            ProviderKind::CardBank => {
                matches!(self.event_type.as_str(), "charge.success" | "charge.failed")
            }
            ProviderKind::Crypto => true,
        }
    }
}

fn normalize_reported(raw: Option<&str>, provider: ProviderKind) -> Option<CanonicalStatus> {
    let raw = raw?;
    match normalize(raw, provider) {
        Ok(status) => Some(status),
        Err(e) => {
            tracing::warn!(%provider, error = %e, "notification carries an unknown status");
            None
        }
    }
}

pub struct CardBankWebhookAuthenticator {
    secret: String,
    allowed_ips: Option<Vec<IpAddr>>,
}

impl CardBankWebhookAuthenticator {
    pub fn new(secret: impl Into<String>) -> Result<Self, PaymentError> {
        let secret = secret.into();
        if secret.trim().is_empty() {
            return Err(PaymentError::Configuration(
                "card/bank webhook secret is not set".into(),
            ));
        }
        Ok(Self {
            secret,
            allowed_ips: None,
        })
    }

    /// Also require deliveries to come from one of `ips`. This is in
    /// addition to the signature check, never instead of it.
    pub fn with_ip_allowlist(mut self, ips: Vec<IpAddr>) -> Self {
        self.allowed_ips = Some(ips);
        self
    }

    pub fn verify_signature(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<(), PaymentError> {
        let signature = signature.ok_or_else(|| {
            PaymentError::SignatureMismatch(format!("missing {CARD_BANK_SIGNATURE_HEADER} header"))
        })?;
        verify_signature(self.secret.as_bytes(), body, signature)
    }

    pub fn source_allowed(&self, source: Option<IpAddr>) -> bool {
        match (&self.allowed_ips, source) {
            (None, _) => true,
            (Some(ips), Some(ip)) => ips.contains(&ip),
            (Some(_), None) => false,
        }
    }

    /// Authenticate before touching the body as JSON, then parse it.
    pub fn authenticate(
        &self,
        body: &[u8],
        signature: Option<&str>,
        source: Option<IpAddr>,
    ) -> Result<WebhookEvent, PaymentError> {
        if !self.source_allowed(source) {
            return Err(PaymentError::SignatureMismatch(format!(
                "source address {source:?} not in allowlist"
            )));
        }
        self.verify_signature(body, signature)?;

        let envelope: CardBankEnvelope = serde_json::from_slice(body)?;
        let data = envelope.data;
        Ok(WebhookEvent {
            provider: ProviderKind::CardBank,
            status: normalize_reported(data.status.as_deref(), ProviderKind::CardBank),
            event_type: envelope.event,
            payment_id: data.id,
            order_id: data.reference,
            raw_status: data.status,
            price_amount: data.amount.map(from_minor_units),
            price_currency: data.currency.clone(),
            actually_paid: None,
            pay_currency: data.currency,
            occurred_at: data.paid_at,
        })
    }
}

pub struct CryptoIpnAuthenticator {
    secret: String,
}

impl CryptoIpnAuthenticator {
    pub fn new(secret: impl Into<String>) -> Result<Self, PaymentError> {
        let secret = secret.into();
        if secret.trim().is_empty() {
            return Err(PaymentError::Configuration(
                "NOWPAYMENTS_IPN_SECRET is not set".into(),
            ));
        }
        Ok(Self { secret })
    }

    pub fn verify_signature(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<(), PaymentError> {
        let signature = signature.ok_or_else(|| {
            PaymentError::SignatureMismatch(format!("missing {CRYPTO_SIGNATURE_HEADER} header"))
        })?;
        let canonical = canonical_json(body)?;
        verify_signature(self.secret.as_bytes(), canonical.as_bytes(), signature)
    }

    pub fn authenticate(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookEvent, PaymentError> {
        self.verify_signature(body, signature)?;

        let ipn: CryptoIpn = serde_json::from_slice(body)?;
        Ok(WebhookEvent {
            provider: ProviderKind::Crypto,
            status: normalize_reported(Some(&ipn.payment_status), ProviderKind::Crypto),
            event_type: format!("payment.{}", ipn.payment_status),
            payment_id: Some(ipn.payment_id),
            order_id: ipn.order_id,
            raw_status: Some(ipn.payment_status),
            price_amount: ipn.price_amount,
            price_currency: ipn.price_currency,
            actually_paid: ipn.actually_paid,
            pay_currency: ipn.pay_currency,
            occurred_at: ipn.updated_at.as_deref().and_then(parse_timestamp),
        })
    }
}

#[derive(Debug, Clone)]
pub enum WebhookOutcome {
    Ignored { reason: &'static str },
    Confirmed {
        reference: Reference,
        confirmation: Confirmation,
    },
}

impl WebhookOutcome {
    /// Short label for responses and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ignored { .. } => "ignored",
            Self::Confirmed { confirmation, .. } => match &confirmation.transition {
                Some(TransitionOutcome::Updated { .. }) => "updated",
                Some(TransitionOutcome::Unchanged(_)) => "unchanged",
                Some(TransitionOutcome::Anomaly { .. }) => "anomaly",
                None => "pending_verification",
            },
        }
    }
}

/// Turns authenticated notifications into verifications. Safe to run twice
/// for the same event: state is re-derived from the provider each time.
pub struct WebhookProcessor {
    gateway: Arc<PaymentGateway>,
}

impl WebhookProcessor {
    pub fn new(gateway: Arc<PaymentGateway>) -> Self {
        Self { gateway }
    }

    pub async fn process(&self, event: &WebhookEvent) -> Result<WebhookOutcome, PaymentError> {
        if !event.is_actionable() {
            tracing::info!(event_type = %event.event_type, "event type not handled");
            return Ok(WebhookOutcome::Ignored { reason: "event type not handled" });
        }
        let Some(reference) = event.order_id.as_deref().and_then(|o| Reference::new(o).ok()) else {
            tracing::warn!(order_id = ?event.order_id, "notification without a usable reference");
            return Ok(WebhookOutcome::Ignored { reason: "no usable reference" });
        };
        let Some(payment) = self.gateway.find_payment(&reference).await? else {
            tracing::warn!(%reference, "notification for unknown payment");
            return Ok(WebhookOutcome::Ignored { reason: "unknown reference" });
        };
        if payment.provider != event.provider {
            tracing::warn!(
                %reference,
                expected = %payment.provider,
                got = %event.provider,
                "notification from the wrong provider"
            );
            return Ok(WebhookOutcome::Ignored { reason: "provider mismatch" });
        }

        let actor = match event.provider {
            ProviderKind::CardBank => "webhook:card_bank",
            ProviderKind::Crypto => "webhook:crypto",
        };
        let confirmation = self
            .gateway
            .confirm(&payment, event.payment_id.as_deref(), actor)
            .await?;
        Ok(WebhookOutcome::Confirmed {
            reference,
            confirmation,
        })
    }
}

// ── Wire types ──────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct CardBankEnvelope {
    event: String,
    data: CardBankEventData,
}

#[derive(Deserialize)]
struct CardBankEventData {
    #[serde(default, deserialize_with = "string_or_number::option::deserialize")]
    id: Option<String>,
    #[serde(default)]
    reference: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    amount: Option<i64>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    paid_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct CryptoIpn {
    #[serde(deserialize_with = "string_or_number::deserialize")]
    payment_id: String,
    payment_status: String,
    #[serde(default, deserialize_with = "string_or_number::option::deserialize")]
    order_id: Option<String>,
    #[serde(default)]
    price_amount: Option<Decimal>,
    #[serde(default)]
    price_currency: Option<String>,
    #[serde(default)]
    actually_paid: Option<Decimal>,
    #[serde(default)]
    pay_currency: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
}
