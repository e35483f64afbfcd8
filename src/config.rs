use {
    crate::{
        adapters::{nowpayments::NowPaymentsConfig, paystack::PaystackConfig},
        domain::{error::PaymentError, verification::VerificationPolicy},
        services::{
            gateway::{CallbackUrls, GatewaySettings},
            verification::{CacheConfig, RetryPolicy},
            webhook::CARD_BANK_WEBHOOK_IPS,
        },
        transport::http::REQUEST_TIMEOUT,
    },
    rust_decimal::Decimal,
    std::{net::IpAddr, str::FromStr, time::Duration},
};

/// Everything the service reads from its environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub paystack_secret_key: String,
    pub nowpayments_api_key: String,
    pub nowpayments_ipn_secret: String,
    pub sandbox: bool,
    pub public_base_url: String,
    pub database_url: Option<String>,
    pub bind_addr: String,
    pub provider_timeout: Duration,
    pub cache: CacheConfig,
    pub retry: RetryPolicy,
    pub policy: VerificationPolicy,
    /// `None` disables source-address filtering of card/bank webhooks.
    pub paystack_ip_allowlist: Option<Vec<IpAddr>>,
}

impl AppConfig {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self, PaymentError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, PaymentError> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &str| {
            var(key).ok_or_else(|| PaymentError::Configuration(format!("{key} must be set")))
        };

        let defaults = CacheConfig::default();
        let retry_defaults = RetryPolicy::default();
        let policy_defaults = VerificationPolicy::default();

        let verify_deadline = Duration::from_secs(parse_or(
            "VERIFY_DEADLINE_SECS",
            var("VERIFY_DEADLINE_SECS"),
            retry_defaults.deadline.as_secs(),
            u64::from_str,
        )?);
        if verify_deadline >= REQUEST_TIMEOUT {
            return Err(PaymentError::Configuration(format!(
                "VERIFY_DEADLINE_SECS must be below the {}s request timeout",
                REQUEST_TIMEOUT.as_secs()
            )));
        }

        Ok(Self {
            paystack_secret_key: required("PAYSTACK_SECRET_KEY")?,
            nowpayments_api_key: required("NOWPAYMENTS_API_KEY")?,
            nowpayments_ipn_secret: required("NOWPAYMENTS_IPN_SECRET")?,
            sandbox: parse_or("PAYMENTS_SANDBOX", var("PAYMENTS_SANDBOX"), true, parse_bool)?,
            public_base_url: required("PUBLIC_BASE_URL")?,
            database_url: var("DATABASE_URL"),
            bind_addr: var("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            provider_timeout: Duration::from_secs(parse_or(
                "PROVIDER_TIMEOUT_SECS",
                var("PROVIDER_TIMEOUT_SECS"),
                30,
                u64::from_str,
            )?),
            cache: CacheConfig {
                ttl: Duration::from_secs(parse_or(
                    "VERIFY_CACHE_TTL_SECS",
                    var("VERIFY_CACHE_TTL_SECS"),
                    defaults.ttl.as_secs(),
                    u64::from_str,
                )?),
                capacity: parse_or(
                    "VERIFY_CACHE_CAPACITY",
                    var("VERIFY_CACHE_CAPACITY"),
                    defaults.capacity,
                    usize::from_str,
                )?,
            },
            retry: RetryPolicy {
                max_retries: parse_or(
                    "VERIFY_MAX_RETRIES",
                    var("VERIFY_MAX_RETRIES"),
                    retry_defaults.max_retries,
                    u32::from_str,
                )?,
                base_delay: Duration::from_millis(parse_or(
                    "VERIFY_BASE_DELAY_MS",
                    var("VERIFY_BASE_DELAY_MS"),
                    retry_defaults.base_delay.as_millis() as u64,
                    u64::from_str,
                )?),
                deadline: verify_deadline,
            },
            policy: VerificationPolicy {
                amount_tolerance: parse_or(
                    "VERIFY_AMOUNT_TOLERANCE",
                    var("VERIFY_AMOUNT_TOLERANCE"),
                    policy_defaults.amount_tolerance,
                    Decimal::from_str,
                )?,
                min_received_ratio: parse_or(
                    "VERIFY_MIN_RECEIVED_RATIO",
                    var("VERIFY_MIN_RECEIVED_RATIO"),
                    policy_defaults.min_received_ratio,
                    Decimal::from_str,
                )?,
            },
            paystack_ip_allowlist: var("PAYSTACK_IP_ALLOWLIST")
                .map(|list| parse_allowlist(&list))
                .transpose()?,
        })
    }

    pub fn paystack(&self) -> PaystackConfig {
        PaystackConfig::new(self.paystack_secret_key.clone()).with_timeout(self.provider_timeout)
    }

    pub fn nowpayments(&self) -> NowPaymentsConfig {
        NowPaymentsConfig::new(self.nowpayments_api_key.clone(), self.sandbox)
            .with_timeout(self.provider_timeout)
    }

    pub fn gateway_settings(&self) -> GatewaySettings {
        GatewaySettings {
            urls: CallbackUrls::new(&self.public_base_url),
            cache: self.cache,
            retry: self.retry,
            policy: self.policy,
        }
    }
}

fn parse_or<T, E: std::fmt::Display>(
    key: &str,
    value: Option<String>,
    default: T,
    parse: impl Fn(&str) -> Result<T, E>,
) -> Result<T, PaymentError> {
    match value {
        None => Ok(default),
        Some(v) => parse(&v).map_err(|e| PaymentError::Configuration(format!("{key}={v}: {e}"))),
    }
}

fn parse_bool(v: &str) -> Result<bool, String> {
    match v.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(format!("not a boolean: {other}")),
    }
}

/// Comma-separated addresses. `default` expands to the provider's
/// published webhook addresses.
fn parse_allowlist(list: &str) -> Result<Vec<IpAddr>, PaymentError> {
    let mut ips = Vec::new();
    for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if item.eq_ignore_ascii_case("default") {
            for ip in CARD_BANK_WEBHOOK_IPS {
                ips.push(parse_ip(ip)?);
            }
        } else {
            ips.push(parse_ip(item)?);
        }
    }
    Ok(ips)
}

fn parse_ip(s: &str) -> Result<IpAddr, PaymentError> {
    s.parse()
        .map_err(|_| PaymentError::Configuration(format!("PAYSTACK_IP_ALLOWLIST: bad address {s}")))
}
