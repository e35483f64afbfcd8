//! Card/bank gateway adapter (Paystack).
//!
//! Amounts go over the wire in minor units (kobo, cents) as integers.

use {
    super::http::{self, DEFAULT_TIMEOUT},
    crate::domain::{
        error::PaymentError,
        money::to_minor_units,
        provider::{
            CardBankApi, CardBankTransaction, InitRequest, InitializedTransaction, ProviderFuture,
        },
    },
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::time::Duration,
};

pub const PROVIDER: &str = "paystack";
const LIVE_BASE_URL: &str = "https://api.paystack.co";

#[derive(Debug, Clone)]
pub struct PaystackConfig {
    pub secret_key: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl PaystackConfig {
    /// Paystack uses the same host for test and live; the key decides.
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
            base_url: LIVE_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

pub struct PaystackAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl PaystackAdapter {
    pub fn new(config: PaystackConfig) -> Result<Self, PaymentError> {
        if config.secret_key.trim().is_empty() {
            return Err(PaymentError::Configuration(
                "PAYSTACK_SECRET_KEY is not set".into(),
            ));
        }
        let bearer = format!("Bearer {}", config.secret_key);
        let client = http::build_client(
            PROVIDER,
            (reqwest::header::AUTHORIZATION, &bearer),
            config.timeout,
        )?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn initialize_inner(
        &self,
        req: &InitRequest,
    ) -> Result<InitializedTransaction, PaymentError> {
        let body = InitializeBody {
            email: &req.customer_email,
            amount: to_minor_units(req.amount)?,
            currency: req.currency.to_upper(),
            reference: req.reference.as_str(),
            callback_url: &req.callback_url,
            metadata: &req.metadata,
        };
        let url = format!("{}/transaction/initialize", self.base_url);
        let envelope: Envelope<InitializeData> =
            http::send_json(PROVIDER, "initialize", self.client.post(url).json(&body)).await?;
        let data = envelope.into_data("initialize")?;

        tracing::info!(
            reference = %req.reference,
            access_code = %data.access_code,
            "paystack transaction initialized"
        );
        Ok(InitializedTransaction {
            external_id: data.access_code,
            redirect_url: Some(data.authorization_url),
            raw_status: None,
        })
    }

    async fn status_inner(&self, reference: &str) -> Result<CardBankTransaction, PaymentError> {
        let url = format!("{}/transaction/verify/{reference}", self.base_url);
        let raw: serde_json::Value =
            http::send_json(PROVIDER, "verify", self.client.get(url)).await?;
        let envelope: Envelope<VerifyData> = serde_json::from_value(raw.clone()).map_err(|e| {
            PaymentError::provider_request(
                PROVIDER,
                Some(200),
                format!("verify: unexpected payload: {e}"),
            )
        })?;
        let data = envelope.into_data("verify")?;

        Ok(CardBankTransaction {
            id: data.id,
            reference: data.reference,
            raw_status: data.status,
            amount_minor: data.amount,
            currency: data.currency,
            paid_at: data.paid_at,
            channel: data.channel,
            gateway_response: data.gateway_response,
            raw,
        })
    }
}

impl CardBankApi for PaystackAdapter {
    fn initialize_transaction<'a>(
        &'a self,
        request: &'a InitRequest,
    ) -> ProviderFuture<'a, InitializedTransaction> {
        Box::pin(self.initialize_inner(request))
    }

    fn transaction_status<'a>(
        &'a self,
        reference: &'a str,
    ) -> ProviderFuture<'a, CardBankTransaction> {
        Box::pin(self.status_inner(reference))
    }
}

// ── Wire types ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct InitializeBody<'a> {
    email: &'a str,
    amount: i64,
    currency: String,
    reference: &'a str,
    callback_url: &'a str,
    metadata: &'a serde_json::Value,
}

#[derive(Deserialize)]
struct Envelope<T> {
    status: bool,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

impl<T> Envelope<T> {
    fn into_data(self, operation: &str) -> Result<T, PaymentError> {
        match (self.status, self.data) {
            (true, Some(data)) => Ok(data),
            _ => Err(PaymentError::provider_request(
                PROVIDER,
                Some(200),
                format!("{operation}: {}", self.message),
            )),
        }
    }
}

#[derive(Deserialize)]
struct InitializeData {
    authorization_url: String,
    access_code: String,
}

#[derive(Deserialize)]
struct VerifyData {
    #[serde(default, deserialize_with = "http::string_or_number::option::deserialize")]
    id: Option<String>,
    status: String,
    reference: String,
    amount: i64,
    currency: String,
    #[serde(default)]
    paid_at: Option<DateTime<Utc>>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    gateway_response: Option<String>,
}
