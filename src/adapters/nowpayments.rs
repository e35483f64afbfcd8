//! Crypto gateway adapter (NOWPayments).
//!
//! Amounts are sent in the fiat major unit; the provider converts to the
//! pay currency itself.

use {
    super::http::{self, DEFAULT_TIMEOUT},
    crate::domain::{
        error::PaymentError,
        provider::{
            CryptoApi, CryptoPayment, HostedInvoice, InitRequest, InitializedTransaction,
            InvoiceRequest, ProviderFuture,
        },
    },
    chrono::{DateTime, Utc},
    reqwest::header::HeaderName,
    rust_decimal::Decimal,
    serde::{Deserialize, Serialize},
    std::time::Duration,
};

pub const PROVIDER: &str = "nowpayments";
const LIVE_BASE_URL: &str = "https://api.nowpayments.io/v1";
const SANDBOX_BASE_URL: &str = "https://api-sandbox.nowpayments.io/v1";

#[derive(Debug, Clone)]
pub struct NowPaymentsConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl NowPaymentsConfig {
    pub fn new(api_key: impl Into<String>, sandbox: bool) -> Self {
        let base_url = if sandbox { SANDBOX_BASE_URL } else { LIVE_BASE_URL };
        Self {
            api_key: api_key.into(),
            base_url: base_url.to_string(),
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

pub struct NowPaymentsAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl NowPaymentsAdapter {
    pub fn new(config: NowPaymentsConfig) -> Result<Self, PaymentError> {
        if config.api_key.trim().is_empty() {
            return Err(PaymentError::Configuration(
                "NOWPAYMENTS_API_KEY is not set".into(),
            ));
        }
        let client = http::build_client(
            PROVIDER,
            (HeaderName::from_static("x-api-key"), &config.api_key),
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
        pay_currency: &str,
    ) -> Result<InitializedTransaction, PaymentError> {
        let body = PaymentBody {
            price_amount: req.amount,
            price_currency: req.currency.to_lower(),
            pay_currency: pay_currency.to_ascii_lowercase(),
            ipn_callback_url: &req.callback_url,
            order_id: req.reference.as_str(),
            order_description: req
                .metadata
                .get("description")
                .and_then(|d| d.as_str())
                .unwrap_or("Marketplace payment"),
        };
        let url = format!("{}/payment", self.base_url);
        let created: CreatedPayment =
            http::send_json(PROVIDER, "create_payment", self.client.post(url).json(&body)).await?;

        tracing::info!(
            reference = %req.reference,
            payment_id = %created.payment_id,
            "crypto payment created"
        );
        Ok(InitializedTransaction {
            external_id: created.payment_id,
            redirect_url: None,
            raw_status: Some(created.payment_status),
        })
    }

    async fn status_inner(&self, payment_id: &str) -> Result<CryptoPayment, PaymentError> {
        let url = format!("{}/payment/{payment_id}", self.base_url);
        let raw: serde_json::Value =
            http::send_json(PROVIDER, "payment_status", self.client.get(url)).await?;
        let data: PaymentStatusData = serde_json::from_value(raw.clone()).map_err(|e| {
            PaymentError::provider_request(
                PROVIDER,
                Some(200),
                format!("payment_status: unexpected payload: {e}"),
            )
        })?;

        Ok(CryptoPayment {
            payment_id: data.payment_id,
            order_id: data.order_id,
            raw_status: data.payment_status,
            price_amount: data.price_amount,
            price_currency: data.price_currency,
            pay_amount: data.pay_amount,
            actually_paid: data.actually_paid,
            pay_currency: data.pay_currency,
            updated_at: data.updated_at.as_deref().and_then(parse_timestamp),
            raw,
        })
    }

    async fn invoice_inner(&self, req: &InvoiceRequest) -> Result<HostedInvoice, PaymentError> {
        let body = InvoiceBody {
            price_amount: req.price_amount,
            price_currency: req.price_currency.to_lower(),
            pay_currency: req.pay_currency.as_deref().map(str::to_ascii_lowercase),
            order_id: req.order_id.as_str(),
            order_description: &req.order_description,
            ipn_callback_url: &req.ipn_callback_url,
            success_url: &req.success_url,
            cancel_url: &req.cancel_url,
            is_fixed_rate: req.is_fixed_rate,
            is_fee_paid_by_user: req.is_fee_paid_by_user,
        };
        let url = format!("{}/invoice", self.base_url);
        let invoice: InvoiceData =
            http::send_json(PROVIDER, "create_invoice", self.client.post(url).json(&body)).await?;

        tracing::info!(
            order_id = %req.order_id,
            invoice_id = %invoice.id,
            "crypto invoice created"
        );
        Ok(HostedInvoice {
            id: invoice.id,
            invoice_url: invoice.invoice_url,
        })
    }
}

impl CryptoApi for NowPaymentsAdapter {
    fn initialize_transaction<'a>(
        &'a self,
        request: &'a InitRequest,
        pay_currency: &'a str,
    ) -> ProviderFuture<'a, InitializedTransaction> {
        Box::pin(self.initialize_inner(request, pay_currency))
    }

    fn payment_status<'a>(&'a self, payment_id: &'a str) -> ProviderFuture<'a, CryptoPayment> {
        Box::pin(self.status_inner(payment_id))
    }

    fn create_hosted_invoice<'a>(
        &'a self,
        request: &'a InvoiceRequest,
    ) -> ProviderFuture<'a, HostedInvoice> {
        Box::pin(self.invoice_inner(request))
    }
}

/// Provider timestamps are RFC 3339 with millisecond precision.
pub(crate) fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

// ── Wire types ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct PaymentBody<'a> {
    #[serde(with = "rust_decimal::serde::float")]
    price_amount: Decimal,
    price_currency: String,
    pay_currency: String,
    ipn_callback_url: &'a str,
    order_id: &'a str,
    order_description: &'a str,
}

#[derive(Deserialize)]
struct CreatedPayment {
    #[serde(deserialize_with = "http::string_or_number::deserialize")]
    payment_id: String,
    payment_status: String,
}

#[derive(Serialize)]
struct InvoiceBody<'a> {
    #[serde(with = "rust_decimal::serde::float")]
    price_amount: Decimal,
    price_currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pay_currency: Option<String>,
    order_id: &'a str,
    order_description: &'a str,
    ipn_callback_url: &'a str,
    success_url: &'a str,
    cancel_url: &'a str,
    is_fixed_rate: bool,
    is_fee_paid_by_user: bool,
}

#[derive(Deserialize)]
struct InvoiceData {
    #[serde(deserialize_with = "http::string_or_number::deserialize")]
    id: String,
    invoice_url: String,
}

#[derive(Deserialize)]
struct PaymentStatusData {
    #[serde(deserialize_with = "http::string_or_number::deserialize")]
    payment_id: String,
    payment_status: String,
    #[serde(default, deserialize_with = "http::string_or_number::option::deserialize")]
    order_id: Option<String>,
    price_amount: Decimal,
    price_currency: String,
    #[serde(default)]
    pay_amount: Option<Decimal>,
    #[serde(default)]
    actually_paid: Option<Decimal>,
    #[serde(default)]
    pay_currency: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
}
