//! Single entry point for starting and confirming payments.
//!
//! Callers never see provider-specific fields; verification always runs
//! through the retry/cache/validation pipeline, never the adapter directly.

use {
    super::{
        duplicate_guard::{DuplicatePaymentGuard, ExistingPaymentCheck},
        verification::{
            CacheConfig, CardBankVerificationService, CryptoVerificationService, RetryPolicy,
        },
    },
    crate::domain::{
        error::PaymentError,
        money::{CurrencyCode, Money},
        payment::{NewPayment, Payment, RequestLink, RequestType, TransitionOutcome},
        provider::{CardBankApi, CryptoApi, InitRequest, InvoiceRequest},
        reference::Reference,
        status::ProviderKind,
        store::PaymentStore,
        verification::{VerificationPolicy, VerificationResult},
    },
    rust_decimal::Decimal,
    serde::{Deserialize, Serialize},
    std::sync::Arc,
    uuid::Uuid,
};

const CRYPTO_ID_UNKNOWN: &str =
    "crypto payment id not known yet; check again once the payment is detected";

/// URLs handed to providers, all rooted at the public base URL.
#[derive(Debug, Clone)]
pub struct CallbackUrls {
    base: String,
}

impl CallbackUrls {
    pub fn new(public_base_url: &str) -> Self {
        Self {
            base: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn card_bank_webhook(&self) -> String {
        format!("{}/webhooks/card-bank", self.base)
    }

    pub fn crypto_ipn(&self) -> String {
        format!("{}/webhooks/crypto", self.base)
    }

    pub fn payment_return(&self, reference: &Reference) -> String {
        format!("{}/payments/{reference}/return", self.base)
    }

    pub fn payment_cancelled(&self, reference: &Reference) -> String {
        format!("{}/payments/{reference}/return?cancelled=true", self.base)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InitializePaymentRequest {
    pub provider: String,
    pub amount: Decimal,
    pub currency: String,
    pub email: String,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub pay_currency: Option<String>,
    #[serde(default)]
    pub callback_url: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub request_type: Option<RequestType>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentInitResult {
    pub provider: ProviderKind,
    pub success: bool,
    pub reference: Reference,
    pub redirect_url: Option<String>,
    pub amount: Decimal,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub urls: CallbackUrls,
    pub cache: CacheConfig,
    pub retry: RetryPolicy,
    pub policy: VerificationPolicy,
}

/// A verification plus what it did to the stored payment, if anything.
#[derive(Debug, Clone)]
pub struct Confirmation {
    pub result: VerificationResult,
    pub transition: Option<TransitionOutcome>,
}

pub struct PaymentGateway {
    card_api: Arc<dyn CardBankApi>,
    crypto_api: Arc<dyn CryptoApi>,
    card_verifier: CardBankVerificationService,
    crypto_verifier: CryptoVerificationService,
    store: Arc<dyn PaymentStore>,
    guard: DuplicatePaymentGuard,
    urls: CallbackUrls,
}

impl PaymentGateway {
    pub fn new(
        card_api: Arc<dyn CardBankApi>,
        crypto_api: Arc<dyn CryptoApi>,
        store: Arc<dyn PaymentStore>,
        settings: GatewaySettings,
    ) -> Self {
        Self {
            card_verifier: CardBankVerificationService::new(
                card_api.clone(),
                settings.cache,
                settings.retry,
                settings.policy,
            ),
            crypto_verifier: CryptoVerificationService::new(
                crypto_api.clone(),
                settings.cache,
                settings.retry,
                settings.policy,
            ),
            guard: DuplicatePaymentGuard::new(store.clone()),
            card_api,
            crypto_api,
            store,
            urls: settings.urls,
        }
    }

    pub fn guard(&self) -> &DuplicatePaymentGuard {
        &self.guard
    }

    pub fn urls(&self) -> &CallbackUrls {
        &self.urls
    }

    pub async fn find_payment(
        &self,
        reference: &Reference,
    ) -> Result<Option<Payment>, PaymentError> {
        self.store.find_by_reference(reference).await
    }

    #[tracing::instrument(
        name = "initialize_payment",
        skip_all,
        fields(provider = %req.provider, reference = tracing::field::Empty)
    )]
    pub async fn initialize_payment(
        &self,
        req: InitializePaymentRequest,
    ) -> Result<PaymentInitResult, PaymentError> {
        let provider: ProviderKind = req.provider.parse()?;

        if req.email.trim().is_empty() {
            return Err(PaymentError::MissingParameter("email".into()));
        }
        let money = Money::new(req.amount, CurrencyCode::new(req.currency.clone())?)?;
        let pay_currency = match provider {
            ProviderKind::Crypto => Some(
                req.pay_currency
                    .as_deref()
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .ok_or_else(|| PaymentError::MissingParameter("pay_currency".into()))?
                    .to_ascii_lowercase(),
            ),
            ProviderKind::CardBank => None,
        };
        let link = match (req.request_id.as_deref(), req.request_type) {
            (Some(id), Some(request_type)) if !id.trim().is_empty() => Some(RequestLink {
                request_id: id.to_string(),
                request_type,
            }),
            (None, None) => None,
            (_, None) => return Err(PaymentError::MissingParameter("request_type".into())),
            _ => return Err(PaymentError::MissingParameter("request_id".into())),
        };

        if let Some(link) = &link {
            self.ensure_no_existing_payment(link).await?;
        }

        let reference = match req.reference.as_deref() {
            Some(r) => Reference::new(r)?,
            None => {
                let prefix = link
                    .as_ref()
                    .map_or(RequestType::Generic, |l| l.request_type)
                    .reference_prefix();
                Reference::generate(prefix)?
            }
        };
        tracing::Span::current().record("reference", tracing::field::display(&reference));

        let metadata = build_metadata(&req, &reference, link.as_ref());
        let return_url = req
            .callback_url
            .clone()
            .unwrap_or_else(|| self.urls.payment_return(&reference));

        let (checkout_id, redirect_url, raw_status) = match provider {
            ProviderKind::CardBank => {
                let init = self
                    .card_api
                    .initialize_transaction(&InitRequest {
                        amount: money.amount(),
                        currency: money.currency().clone(),
                        reference: reference.clone(),
                        customer_email: req.email.clone(),
                        callback_url: return_url,
                        metadata: metadata.clone(),
                    })
                    .await?;
                (init.external_id, init.redirect_url, init.raw_status)
            }
            ProviderKind::Crypto => {
                let invoice = self
                    .crypto_api
                    .create_hosted_invoice(&InvoiceRequest {
                        price_amount: money.amount(),
                        price_currency: money.currency().clone(),
                        pay_currency: pay_currency.clone(),
                        order_id: reference.clone(),
                        order_description: req
                            .description
                            .clone()
                            .unwrap_or_else(|| format!("Payment {reference}")),
                        ipn_callback_url: self.urls.crypto_ipn(),
                        success_url: return_url,
                        cancel_url: self.urls.payment_cancelled(&reference),
                        is_fixed_rate: true,
                        is_fee_paid_by_user: false,
                    })
                    .await?;
                (invoice.id, Some(invoice.invoice_url), None)
            }
        };

        let payment = self
            .store
            .insert(&NewPayment {
                id: Uuid::now_v7(),
                reference: reference.clone(),
                provider,
                checkout_id: Some(checkout_id),
                money: money.clone(),
                pay_currency,
                raw_status,
                link,
                customer_email: req.email,
                metadata,
            })
            .await?;

        tracing::info!(payment_id = %payment.id, "payment initialized");
        Ok(PaymentInitResult {
            provider,
            success: true,
            reference,
            redirect_url,
            amount: money.amount(),
            currency: money.currency().to_string(),
        })
    }

    /// Confirm a payment with its provider and persist the outcome.
    #[tracing::instrument(name = "verify_payment", skip(self))]
    pub async fn verify_payment(
        &self,
        reference: &str,
        provider: &str,
    ) -> Result<VerificationResult, PaymentError> {
        let provider: ProviderKind = provider.parse()?;
        let reference = Reference::new(reference)?;
        let payment = self
            .store
            .find_by_reference(&reference)
            .await?
            .ok_or_else(|| PaymentError::NotFound(format!("payment {reference}")))?;
        if payment.provider != provider {
            return Err(PaymentError::Validation(format!(
                "payment {reference} was made with {}, not {provider}",
                payment.provider
            )));
        }
        self.confirm(&payment, None, "api").await.map(|c| c.result)
    }

    /// Shared by the verify endpoint and webhook handling. `payment_id` is
    /// the provider id carried by a notification, when there is one.
    pub async fn confirm(
        &self,
        payment: &Payment,
        payment_id: Option<&str>,
        actor: &str,
    ) -> Result<Confirmation, PaymentError> {
        let result = match payment.provider {
            ProviderKind::CardBank => {
                self.card_verifier
                    .verify(&payment.reference, &payment.money)
                    .await?
            }
            ProviderKind::Crypto => {
                let known_id = payment_id.or(payment.provider_transaction_id.as_deref());
                let Some(lookup_id) = known_id else {
                    return Ok(Confirmation {
                        result: VerificationResult::inconclusive(payment.status, CRYPTO_ID_UNKNOWN),
                        transition: None,
                    });
                };
                self.crypto_verifier
                    .verify(lookup_id, &payment.reference, &payment.money)
                    .await?
            }
        };

        let Some(update) = result.status_update() else {
            tracing::warn!(
                reference = %payment.reference,
                reason = %result.message,
                "provider record does not match payment, nothing recorded"
            );
            return Ok(Confirmation {
                result,
                transition: None,
            });
        };

        let transition = self
            .store
            .record_verification(&payment.reference, &update, actor)
            .await?;
        let reference = &payment.reference;
        match &transition {
            TransitionOutcome::Updated { from, to } => {
                tracing::info!(%reference, %from, %to, "payment status changed");
            }
            TransitionOutcome::Unchanged(status) => {
                tracing::debug!(%reference, %status, "payment status unchanged");
            }
            TransitionOutcome::Anomaly { current, incoming } => {
                tracing::warn!(
                    %reference,
                    %current,
                    %incoming,
                    "invalid status transition, not applied"
                );
            }
        }
        Ok(Confirmation {
            result,
            transition: Some(transition),
        })
    }

    async fn ensure_no_existing_payment(&self, link: &RequestLink) -> Result<(), PaymentError> {
        let check = self
            .guard
            .check_existing(&link.request_id, link.request_type)
            .await;
        let state = match &check {
            ExistingPaymentCheck::Paid { .. } => "completed",
            ExistingPaymentCheck::Pending { .. } => "pending",
            ExistingPaymentCheck::Clear | ExistingPaymentCheck::Unavailable { .. } => return Ok(()),
        };
        let reference = check
            .payment()
            .map(|p| p.reference.to_string())
            .unwrap_or_default();
        Err(PaymentError::DuplicatePayment {
            request_id: link.request_id.clone(),
            reference,
            state,
        })
    }
}

fn build_metadata(
    req: &InitializePaymentRequest,
    reference: &Reference,
    link: Option<&RequestLink>,
) -> serde_json::Value {
    let mut metadata = match &req.metadata {
        serde_json::Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    };
    metadata.insert("reference".into(), reference.as_str().into());
    metadata.insert("customer_email".into(), req.email.clone().into());
    if let Some(link) = link {
        metadata.insert("request_id".into(), link.request_id.clone().into());
        metadata.insert("request_type".into(), link.request_type.as_str().into());
    }
    if let Some(description) = &req.description {
        metadata.insert("description".into(), description.clone().into());
    }
    serde_json::Value::Object(metadata)
}
