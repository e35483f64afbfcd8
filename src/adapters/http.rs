use {
    crate::domain::error::PaymentError,
    reqwest::header::{HeaderMap, HeaderName, HeaderValue},
    serde::de::DeserializeOwned,
    std::time::Duration,
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Build a client whose every request carries `auth` and runs under
/// `timeout`. Dropping the request future cancels the call.
pub fn build_client(
    provider: &'static str,
    auth: (HeaderName, &str),
    timeout: Duration,
) -> Result<reqwest::Client, PaymentError> {
    let (name, value) = auth;
    let mut value = HeaderValue::from_str(value).map_err(|_| {
        PaymentError::Configuration(format!("{provider}: credential contains invalid characters"))
    })?;
    value.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert(name, value);
    headers.insert(
        reqwest::header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );

    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .default_headers(headers)
        .build()
        .map_err(|e| {
            PaymentError::Configuration(format!("{provider}: failed to build HTTP client: {e}"))
        })
}

/// Send a request and decode a 2xx JSON body. Non-2xx responses become
/// `ProviderRequest` carrying whatever message the provider returned.
pub async fn send_json<T: DeserializeOwned>(
    provider: &'static str,
    operation: &str,
    request: reqwest::RequestBuilder,
) -> Result<T, PaymentError> {
    let resp = request.send().await.map_err(|e| {
        let kind = if e.is_timeout() { "timed out" } else { "transport error" };
        PaymentError::provider_request(provider, None, format!("{operation}: {kind}: {e}"))
    })?;

    let status = resp.status();
    let body = resp.bytes().await.map_err(|e| {
        PaymentError::provider_request(
            provider,
            Some(status.as_u16()),
            format!("{operation}: reading body: {e}"),
        )
    })?;

    if !status.is_success() {
        return Err(PaymentError::provider_request(
            provider,
            Some(status.as_u16()),
            format!("{operation}: HTTP {status}: {}", error_message(&body)),
        ));
    }

    serde_json::from_slice(&body).map_err(|e| {
        PaymentError::provider_request(
            provider,
            Some(status.as_u16()),
            format!("{operation}: unexpected response body: {e}"),
        )
    })
}

/// Pull `message` out of a JSON error body, falling back to the raw text.
fn error_message(body: &[u8]) -> String {
    serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| String::from_utf8_lossy(body).chars().take(512).collect())
}

/// Providers send ids as either JSON strings or numbers.
pub mod string_or_number {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Str(String),
        Int(i64),
        Uint(u64),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(match Repr::deserialize(d)? {
            Repr::Str(s) => s,
            Repr::Int(n) => n.to_string(),
            Repr::Uint(n) => n.to_string(),
        })
    }

    pub mod option {
        use super::Repr;
        use serde::{Deserialize, Deserializer};

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
            Ok(Option::<Repr>::deserialize(d)?.map(|r| match r {
                Repr::Str(s) => s,
                Repr::Int(n) => n.to_string(),
                Repr::Uint(n) => n.to_string(),
            }))
        }
    }
}
