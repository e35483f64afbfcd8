//! Authoritative payment confirmation.
//!
//! Every verification queries the provider directly. Webhook payloads only
//! ever trigger a verification; they are never taken as the answer.

use {
    crate::domain::{
        error::PaymentError,
        money::{Money, from_minor_units},
        provider::{CardBankApi, CryptoApi},
        reference::Reference,
        status::{ProviderKind, StatusCategory, normalize},
        verification::{ObservedPayment, VerificationPolicy, VerificationResult},
    },
    std::{collections::HashMap, future::Future, sync::Arc, time::Duration},
    tokio::{sync::RwLock, time::Instant},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Wall-clock budget for all attempts and backoff together. Must stay
    /// under the HTTP request timeout.
    pub deadline: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            deadline: Duration::from_secs(45),
        }
    }
}

impl RetryPolicy {
    /// `base_delay * 2^attempt`, attempt counted from zero.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Run `op` until it succeeds, fails permanently, or the retry budget or
/// deadline is spent. Attempts are strictly sequential; an attempt still in
/// flight at the deadline is dropped.
pub async fn with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    provider: ProviderKind,
    key: &str,
    mut op: F,
) -> Result<T, PaymentError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PaymentError>>,
{
    let started = Instant::now();
    let mut attempt = 0u32;
    loop {
        let remaining = policy.deadline.saturating_sub(started.elapsed());
        let Ok(outcome) = tokio::time::timeout(remaining, op()).await else {
            let attempts = attempt + 1;
            tracing::error!(%provider, key, attempts, "verification deadline elapsed");
            return Err(PaymentError::VerificationExhausted {
                attempts,
                last_error: format!("no answer within {:?}", policy.deadline),
            });
        };
        match outcome {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() => {
                let delay = policy.delay_for(attempt);
                let out_of_time = started.elapsed() + delay >= policy.deadline;
                if attempt >= policy.max_retries || out_of_time {
                    tracing::error!(
                        %provider,
                        key,
                        attempts = attempt + 1,
                        error = %e,
                        "verification retries exhausted"
                    );
                    return Err(PaymentError::VerificationExhausted {
                        attempts: attempt + 1,
                        last_error: e.to_string(),
                    });
                }
                tracing::warn!(
                    %provider,
                    key,
                    attempt,
                    ?delay,
                    error = %e,
                    "transient provider failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub ttl: Duration,
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(90),
            capacity: 1024,
        }
    }
}

/// Process-local, best-effort de-duplication of verifications. Only
/// verified successes are stored, so a late success is never masked.
pub struct VerificationCache {
    config: CacheConfig,
    entries: RwLock<HashMap<String, (Instant, VerificationResult)>>,
}

impl VerificationCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, key: &str) -> Option<VerificationResult> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|(stored_at, _)| stored_at.elapsed() < self.config.ttl)
            .map(|(_, result)| result.clone())
    }

    pub async fn put(&self, key: &str, result: &VerificationResult) {
        if !(result.verified && result.status.is_success()) || self.config.capacity == 0 {
            return;
        }
        let mut entries = self.entries.write().await;
        let ttl = self.config.ttl;
        entries.retain(|_, (stored_at, _)| stored_at.elapsed() < ttl);
        if entries.len() >= self.config.capacity && !entries.contains_key(key) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, (stored_at, _))| *stored_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
            }
        }
        entries.insert(key.to_string(), (Instant::now(), result.clone()));
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

/// Shared plumbing for both providers' verification services.
struct Verifier {
    provider: ProviderKind,
    cache: VerificationCache,
    retry: RetryPolicy,
    policy: VerificationPolicy,
}

impl Verifier {
    fn new(
        provider: ProviderKind,
        cache: CacheConfig,
        retry: RetryPolicy,
        policy: VerificationPolicy,
    ) -> Self {
        Self {
            provider,
            cache: VerificationCache::new(cache),
            retry,
            policy,
        }
    }

    async fn finish(
        &self,
        key: &str,
        reference: &Reference,
        expected: &Money,
        observed: ObservedPayment,
    ) -> VerificationResult {
        let result = VerificationResult::evaluate(reference, expected, observed, &self.policy);
        if result.verified {
            self.cache.put(key, &result).await;
            tracing::info!(
                provider = %self.provider,
                %reference,
                status = %result.status,
                "payment verified"
            );
        } else {
            tracing::info!(
                provider = %self.provider,
                %reference,
                status = %result.status,
                reason = %result.message,
                "payment not verified"
            );
        }
        result
    }
}

pub struct CardBankVerificationService {
    api: Arc<dyn CardBankApi>,
    inner: Verifier,
}

impl CardBankVerificationService {
    pub fn new(
        api: Arc<dyn CardBankApi>,
        cache: CacheConfig,
        retry: RetryPolicy,
        policy: VerificationPolicy,
    ) -> Self {
        Self {
            api,
            inner: Verifier::new(ProviderKind::CardBank, cache, retry, policy),
        }
    }

    /// Card/bank transactions are looked up by our own reference.
    pub async fn verify(
        &self,
        reference: &Reference,
        expected: &Money,
    ) -> Result<VerificationResult, PaymentError> {
        let key = reference.as_str();
        if let Some(cached) = self.inner.cache.get(key).await {
            tracing::debug!(%reference, "verification cache hit");
            return Ok(cached);
        }

        let tx = with_backoff(&self.inner.retry, ProviderKind::CardBank, key, || {
            self.api.transaction_status(key)
        })
        .await?;

        let status = normalize(&tx.raw_status, ProviderKind::CardBank)?;
        let failure_reason = (!status.is_success())
            .then(|| tx.gateway_response.clone())
            .flatten();
        let observed = ObservedPayment {
            status,
            raw_status: tx.raw_status,
            provider_transaction_id: tx.id,
            order_reference: Some(tx.reference),
            price_amount: from_minor_units(tx.amount_minor),
            price_currency: tx.currency,
            received: None,
            paid_at: tx.paid_at,
            channel: tx.channel,
            failure_reason,
            raw: tx.raw,
        };
        Ok(self.inner.finish(key, reference, expected, observed).await)
    }

    pub fn cache(&self) -> &VerificationCache {
        &self.inner.cache
    }
}

pub struct CryptoVerificationService {
    api: Arc<dyn CryptoApi>,
    inner: Verifier,
}

impl CryptoVerificationService {
    pub fn new(
        api: Arc<dyn CryptoApi>,
        cache: CacheConfig,
        retry: RetryPolicy,
        policy: VerificationPolicy,
    ) -> Self {
        Self {
            api,
            inner: Verifier::new(ProviderKind::Crypto, cache, retry, policy),
        }
    }

    /// Crypto payments are looked up by the provider's payment id; the
    /// order id it reports must match `reference`. Cache entries are keyed
    /// by both, so a payment id verified for one order never answers for
    /// another.
    pub async fn verify(
        &self,
        payment_id: &str,
        reference: &Reference,
        expected: &Money,
    ) -> Result<VerificationResult, PaymentError> {
        let cache_key = format!("{payment_id}:{reference}");
        if let Some(cached) = self.inner.cache.get(&cache_key).await {
            tracing::debug!(payment_id, %reference, "verification cache hit");
            return Ok(cached);
        }

        let payment = with_backoff(&self.inner.retry, ProviderKind::Crypto, payment_id, || {
            self.api.payment_status(payment_id)
        })
        .await?;

        let status = normalize(&payment.raw_status, ProviderKind::Crypto)?;
        let received = payment
            .pay_amount
            .map(|pay| (pay, payment.actually_paid.unwrap_or_default()));
        let failure_reason = status
            .is_in(StatusCategory::Failed)
            .then(|| format!("provider reported {}", payment.raw_status));
        let observed = ObservedPayment {
            status,
            raw_status: payment.raw_status,
            provider_transaction_id: Some(payment.payment_id),
            order_reference: payment.order_id,
            price_amount: payment.price_amount,
            price_currency: payment.price_currency,
            received,
            paid_at: status.is_success().then_some(payment.updated_at).flatten(),
            channel: payment.pay_currency,
            failure_reason,
            raw: payment.raw,
        };
        Ok(self.inner.finish(&cache_key, reference, expected, observed).await)
    }

    pub fn cache(&self) -> &VerificationCache {
        &self.inner.cache
    }
}
