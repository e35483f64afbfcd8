use thiserror::Error;

#[derive(Debug, Error)]
pub enum PaymentError {
    /// A required credential or setting is absent. Raised at construction.
    #[error("configuration: {0}")]
    Configuration(String),

    /// Caller input is insufficient. Raised before any network call.
    #[error("missing parameter: {0}")]
    MissingParameter(String),

    #[error("unsupported provider: {0}")]
    UnsupportedProvider(String),

    /// Non-2xx response or transport failure from a provider.
    /// `status` is `None` when no HTTP response was received.
    #[error("provider request failed ({provider}): {message}")]
    ProviderRequest {
        provider: &'static str,
        status: Option<u16>,
        message: String,
    },

    /// Webhook failed authentication. The reason is for logs only.
    #[error("webhook signature: {0}")]
    SignatureMismatch(String),

    #[error("verification inconclusive after {attempts} attempts: {last_error}")]
    VerificationExhausted { attempts: u32, last_error: String },

    #[error("unknown {provider} status: {status}")]
    UnknownStatus {
        provider: &'static str,
        status: String,
    },

    #[error("invalid reference: {0}")]
    InvalidReference(String),

    #[error("validation: {0}")]
    Validation(String),

    #[error("request {request_id} already has a {state} payment ({reference})")]
    DuplicatePayment {
        request_id: String,
        reference: String,
        state: &'static str,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PaymentError {
    pub fn provider_request(
        provider: &'static str,
        status: Option<u16>,
        message: impl Into<String>,
    ) -> Self {
        Self::ProviderRequest {
            provider,
            status,
            message: message.into(),
        }
    }

    /// Network failures, timeouts, 429 and 5xx responses. Only these are
    /// retried by the verification services.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ProviderRequest { status: None, .. } => true,
            Self::ProviderRequest {
                status: Some(code), ..
            } => *code == 429 || *code >= 500,
            _ => false,
        }
    }

    /// The payment may still complete; the caller should check again later
    /// rather than treat this as a failure.
    pub fn is_inconclusive(&self) -> bool {
        matches!(self, Self::VerificationExhausted { .. }) || self.is_transient()
    }
}
