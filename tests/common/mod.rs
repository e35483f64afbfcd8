#![allow(dead_code)]

use marketpay::domain::error::PaymentError;
use marketpay::domain::money::{CurrencyCode, Money};
use marketpay::domain::payment::{NewPayment, Payment, RequestLink, RequestType, StatusUpdate, TransitionOutcome};
use marketpay::domain::provider::{
    CardBankApi, CardBankTransaction, CryptoApi, CryptoPayment, HostedInvoice, InitRequest,
    InitializedTransaction, InvoiceRequest, ProviderFuture,
};
use marketpay::domain::reference::Reference;
use marketpay::domain::status::ProviderKind;
use marketpay::domain::store::{PaymentStore, StoreFuture};
use marketpay::domain::verification::VerificationPolicy;
use marketpay::infra::memory::InMemoryPaymentStore;
use marketpay::services::gateway::{CallbackUrls, GatewaySettings, PaymentGateway};
use marketpay::services::verification::{CacheConfig, RetryPolicy};
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const PUBLIC_BASE_URL: &str = "https://market.example.com";

pub fn reference(s: &str) -> Reference {
    Reference::new(s).expect("valid test reference")
}

pub fn money(amount: Decimal, currency: &str) -> Money {
    Money::new(amount, CurrencyCode::new(currency).unwrap()).unwrap()
}

/// A 503 from the provider: retried by verification.
pub fn transient() -> PaymentError {
    PaymentError::provider_request("test", Some(503), "service unavailable")
}

/// A 404 from the provider: never retried.
pub fn permanent() -> PaymentError {
    PaymentError::provider_request("test", Some(404), "transaction not found")
}

pub fn card_tx(reference: &str, status: &str, amount_minor: i64, currency: &str) -> CardBankTransaction {
    CardBankTransaction {
        id: Some("4099260516".to_string()),
        reference: reference.to_string(),
        raw_status: status.to_string(),
        amount_minor,
        currency: currency.to_string(),
        paid_at: None,
        channel: Some("card".to_string()),
        gateway_response: Some(if status == "success" { "Approved" } else { "Declined" }.to_string()),
        raw: serde_json::json!({"status": status}),
    }
}

pub fn crypto_payment(
    payment_id: &str,
    order_id: &str,
    status: &str,
    price: Decimal,
    currency: &str,
    pay_amount: Option<Decimal>,
    actually_paid: Option<Decimal>,
) -> CryptoPayment {
    CryptoPayment {
        payment_id: payment_id.to_string(),
        order_id: Some(order_id.to_string()),
        raw_status: status.to_string(),
        price_amount: price,
        price_currency: currency.to_string(),
        pay_amount,
        actually_paid,
        pay_currency: Some("btc".to_string()),
        updated_at: None,
        raw: serde_json::json!({"payment_status": status}),
    }
}

// ── Scripted provider mocks ─────────────────────────────────────────────────

/// Card/bank provider that replays queued status responses, then repeats
/// `fallback` once the queue is empty.
#[derive(Default)]
pub struct MockCardBank {
    statuses: Mutex<VecDeque<Result<CardBankTransaction, PaymentError>>>,
    fallback: Mutex<Option<CardBankTransaction>>,
    pub status_calls: AtomicUsize,
    pub init_calls: AtomicUsize,
    pub last_init: Mutex<Option<InitRequest>>,
    init_error: Mutex<Option<PaymentError>>,
    status_delay: Mutex<Option<Duration>>,
}

impl MockCardBank {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_status(&self, response: Result<CardBankTransaction, PaymentError>) {
        self.statuses.lock().unwrap().push_back(response);
    }

    pub fn always(&self, tx: CardBankTransaction) {
        *self.fallback.lock().unwrap() = Some(tx);
    }

    /// Next initialize call fails with `err`.
    pub fn fail_init(&self, err: PaymentError) {
        *self.init_error.lock().unwrap() = Some(err);
    }

    /// Every status call waits this long before answering.
    pub fn delay_status(&self, delay: Duration) {
        *self.status_delay.lock().unwrap() = Some(delay);
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }
}

impl CardBankApi for MockCardBank {
    fn initialize_transaction<'a>(
        &'a self,
        request: &'a InitRequest,
    ) -> ProviderFuture<'a, InitializedTransaction> {
        Box::pin(async move {
            self.init_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_init.lock().unwrap() = Some(request.clone());
            if let Some(err) = self.init_error.lock().unwrap().take() {
                return Err(err);
            }
            Ok(InitializedTransaction {
                external_id: "ac_test_123".to_string(),
                redirect_url: Some(format!("https://checkout.example.com/{}", request.reference)),
                raw_status: None,
            })
        })
    }

    fn transaction_status<'a>(&'a self, _reference: &'a str) -> ProviderFuture<'a, CardBankTransaction> {
        Box::pin(async move {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            let delay = *self.status_delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(next) = self.statuses.lock().unwrap().pop_front() {
                return next;
            }
            self.fallback
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(permanent)
        })
    }
}

#[derive(Default)]
pub struct MockCrypto {
    statuses: Mutex<VecDeque<Result<CryptoPayment, PaymentError>>>,
    fallback: Mutex<Option<CryptoPayment>>,
    pub status_calls: AtomicUsize,
    pub init_calls: AtomicUsize,
    pub invoice_calls: AtomicUsize,
    pub last_invoice: Mutex<Option<InvoiceRequest>>,
    pub looked_up: Mutex<Vec<String>>,
}

impl MockCrypto {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_status(&self, response: Result<CryptoPayment, PaymentError>) {
        self.statuses.lock().unwrap().push_back(response);
    }

    pub fn always(&self, payment: CryptoPayment) {
        *self.fallback.lock().unwrap() = Some(payment);
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    /// Calls of any kind, initialization included.
    pub fn total_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
            + self.init_calls.load(Ordering::SeqCst)
            + self.invoice_calls.load(Ordering::SeqCst)
    }
}

impl CryptoApi for MockCrypto {
    fn initialize_transaction<'a>(
        &'a self,
        _request: &'a InitRequest,
        _pay_currency: &'a str,
    ) -> ProviderFuture<'a, InitializedTransaction> {
        Box::pin(async move {
            self.init_calls.fetch_add(1, Ordering::SeqCst);
            Ok(InitializedTransaction {
                external_id: "5077125051".to_string(),
                redirect_url: None,
                raw_status: Some("waiting".to_string()),
            })
        })
    }

    fn payment_status<'a>(&'a self, payment_id: &'a str) -> ProviderFuture<'a, CryptoPayment> {
        Box::pin(async move {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            self.looked_up.lock().unwrap().push(payment_id.to_string());
            if let Some(next) = self.statuses.lock().unwrap().pop_front() {
                return next;
            }
            self.fallback
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(permanent)
        })
    }

    fn create_hosted_invoice<'a>(&'a self, request: &'a InvoiceRequest) -> ProviderFuture<'a, HostedInvoice> {
        Box::pin(async move {
            self.invoice_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_invoice.lock().unwrap() = Some(request.clone());
            Ok(HostedInvoice {
                id: "4522625843".to_string(),
                invoice_url: "https://nowpayments.io/payment/?iid=4522625843".to_string(),
            })
        })
    }
}

// ── Stores ──────────────────────────────────────────────────────────────────

/// Every call fails as if the database were down.
pub struct FailingStore;

impl PaymentStore for FailingStore {
    fn insert<'a>(&'a self, _payment: &'a NewPayment) -> StoreFuture<'a, Payment> {
        Box::pin(async { Err(PaymentError::Database(sqlx::Error::PoolTimedOut)) })
    }

    fn find_by_reference<'a>(&'a self, _reference: &'a Reference) -> StoreFuture<'a, Option<Payment>> {
        Box::pin(async { Err(PaymentError::Database(sqlx::Error::PoolTimedOut)) })
    }

    fn find_for_request<'a>(
        &'a self,
        _request_id: &'a str,
        _request_type: RequestType,
    ) -> StoreFuture<'a, Vec<Payment>> {
        Box::pin(async { Err(PaymentError::Database(sqlx::Error::PoolTimedOut)) })
    }

    fn record_verification<'a>(
        &'a self,
        _reference: &'a Reference,
        _update: &'a StatusUpdate,
        _actor: &'a str,
    ) -> StoreFuture<'a, TransitionOutcome> {
        Box::pin(async { Err(PaymentError::Database(sqlx::Error::PoolTimedOut)) })
    }
}

pub fn new_payment(
    reference: &str,
    provider: ProviderKind,
    amount: Decimal,
    currency: &str,
    link: Option<(&str, RequestType)>,
) -> NewPayment {
    NewPayment {
        id: uuid::Uuid::now_v7(),
        reference: Reference::new(reference).unwrap(),
        provider,
        checkout_id: Some("chk_1".to_string()),
        money: money(amount, currency),
        pay_currency: (provider == ProviderKind::Crypto).then(|| "btc".to_string()),
        raw_status: None,
        link: link.map(|(request_id, request_type)| RequestLink {
            request_id: request_id.to_string(),
            request_type,
        }),
        customer_email: "buyer@example.com".to_string(),
        metadata: serde_json::json!({}),
    }
}

/// Force a stored payment into `status` through the normal update path.
pub async fn set_status(store: &dyn PaymentStore, reference: &str, status: &str) {
    let update = StatusUpdate {
        status: marketpay::domain::status::CanonicalStatus::try_from(status).unwrap(),
        raw_status: status.to_string(),
        provider_transaction_id: None,
        paid_at: None,
        channel: None,
        failure_reason: None,
    };
    store
        .record_verification(&Reference::new(reference).unwrap(), &update, "test")
        .await
        .unwrap();
}

pub fn fast_settings() -> GatewaySettings {
    GatewaySettings {
        urls: CallbackUrls::new(PUBLIC_BASE_URL),
        cache: CacheConfig::default(),
        retry: RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(2000),
            deadline: Duration::from_secs(45),
        },
        policy: VerificationPolicy::default(),
    }
}

pub struct Harness {
    pub card: Arc<MockCardBank>,
    pub crypto: Arc<MockCrypto>,
    pub store: Arc<InMemoryPaymentStore>,
    pub gateway: Arc<PaymentGateway>,
}

pub fn harness() -> Harness {
    let card = MockCardBank::new();
    let crypto = MockCrypto::new();
    let store = Arc::new(InMemoryPaymentStore::new());
    let gateway = Arc::new(PaymentGateway::new(
        card.clone(),
        crypto.clone(),
        store.clone(),
        fast_settings(),
    ));
    Harness {
        card,
        crypto,
        store,
        gateway,
    }
}
