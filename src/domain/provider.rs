use {
    super::error::PaymentError,
    super::money::CurrencyCode,
    super::reference::Reference,
    chrono::{DateTime, Utc},
    rust_decimal::Decimal,
    std::{future::Future, pin::Pin},
};

pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, PaymentError>> + Send + 'a>>;

/// Input shared by both adapters' `initialize_transaction`.
#[derive(Debug, Clone)]
pub struct InitRequest {
    /// Major units. Each adapter converts to its provider's representation.
    pub amount: Decimal,
    pub currency: CurrencyCode,
    pub reference: Reference,
    pub customer_email: String,
    pub callback_url: String,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitializedTransaction {
    pub external_id: String,
    pub redirect_url: Option<String>,
    pub raw_status: Option<String>,
}

/// Card/bank transaction as reported by the provider's verify endpoint.
#[derive(Debug, Clone)]
pub struct CardBankTransaction {
    pub id: Option<String>,
    pub reference: String,
    pub raw_status: String,
    /// Minor units (e.g. kobo, cents).
    pub amount_minor: i64,
    pub currency: String,
    pub paid_at: Option<DateTime<Utc>>,
    pub channel: Option<String>,
    pub gateway_response: Option<String>,
    pub raw: serde_json::Value,
}

/// Crypto payment as reported by the provider's status endpoint.
#[derive(Debug, Clone)]
pub struct CryptoPayment {
    pub payment_id: String,
    pub order_id: Option<String>,
    pub raw_status: String,
    pub price_amount: Decimal,
    pub price_currency: String,
    pub pay_amount: Option<Decimal>,
    pub actually_paid: Option<Decimal>,
    pub pay_currency: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct InvoiceRequest {
    pub price_amount: Decimal,
    pub price_currency: CurrencyCode,
    pub pay_currency: Option<String>,
    pub order_id: Reference,
    pub order_description: String,
    pub ipn_callback_url: String,
    pub success_url: String,
    pub cancel_url: String,
    pub is_fixed_rate: bool,
    pub is_fee_paid_by_user: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedInvoice {
    pub id: String,
    pub invoice_url: String,
}

pub trait CardBankApi: Send + Sync {
    fn initialize_transaction<'a>(
        &'a self,
        request: &'a InitRequest,
    ) -> ProviderFuture<'a, InitializedTransaction>;

    /// Read-only; safe to call repeatedly.
    fn transaction_status<'a>(
        &'a self,
        reference: &'a str,
    ) -> ProviderFuture<'a, CardBankTransaction>;
}

pub trait CryptoApi: Send + Sync {
    /// Direct payment (deposit address). `pay_currency` is required.
    fn initialize_transaction<'a>(
        &'a self,
        request: &'a InitRequest,
        pay_currency: &'a str,
    ) -> ProviderFuture<'a, InitializedTransaction>;

    /// Read-only; safe to call repeatedly.
    fn payment_status<'a>(&'a self, payment_id: &'a str) -> ProviderFuture<'a, CryptoPayment>;

    fn create_hosted_invoice<'a>(
        &'a self,
        request: &'a InvoiceRequest,
    ) -> ProviderFuture<'a, HostedInvoice>;
}
