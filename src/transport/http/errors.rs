use {
    crate::domain::error::PaymentError,
    axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    },
};

/// Newtype so the domain error can be returned straight from handlers.
pub struct ApiError(pub PaymentError);

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        Self(err)
    }
}

/// Body for "not decided yet". Clients poll the verify endpoint again.
pub fn pending_body() -> serde_json::Value {
    serde_json::json!({
        "status": "pending",
        "action": "check_again",
    })
}

fn masked(kind: &str, err: &PaymentError) -> (StatusCode, &'static str, String) {
    tracing::error!("{kind} error: {err}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        "internal error".to_string(),
    )
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self.0 {
            PaymentError::MissingParameter(name) => (
                StatusCode::BAD_REQUEST,
                "missing_parameter",
                format!("missing parameter: {name}"),
            ),
            PaymentError::UnsupportedProvider(p) => (
                StatusCode::BAD_REQUEST,
                "unsupported_provider",
                format!("unsupported provider: {p}"),
            ),
            PaymentError::InvalidReference(r) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "invalid_reference",
                format!("invalid reference: {r}"),
            ),
            PaymentError::Validation(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error",
                msg.clone(),
            ),
            PaymentError::SignatureMismatch(reason) => {
                tracing::warn!(reason = %reason, "webhook rejected");
                (
                    StatusCode::UNAUTHORIZED,
                    "webhook_error",
                    "invalid webhook signature".to_string(),
                )
            }
            PaymentError::DuplicatePayment { .. } => (
                StatusCode::CONFLICT,
                "duplicate_payment",
                self.0.to_string(),
            ),
            PaymentError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                "not_found",
                format!("{what} not found"),
            ),
            PaymentError::ProviderRequest { .. } | PaymentError::UnknownStatus { .. } => {
                tracing::error!(error = %self.0, "provider error");
                (
                    StatusCode::BAD_GATEWAY,
                    "provider_error",
                    self.0.to_string(),
                )
            }
            PaymentError::Configuration(_) => masked("configuration", &self.0),
            PaymentError::Database(_) => masked("database", &self.0),
            PaymentError::Serialization(err) => {
                tracing::warn!("unreadable payload: {err}");
                (
                    StatusCode::BAD_REQUEST,
                    "invalid_payload",
                    "payload could not be parsed".to_string(),
                )
            }
            PaymentError::VerificationExhausted { .. } => {
                tracing::warn!(error = %self.0, "verification inconclusive");
                return (StatusCode::ACCEPTED, Json(pending_body())).into_response();
            }
        };

        let body = serde_json::json!({
            "error_code": error_code,
            "message": message,
        });

        (status, Json(body)).into_response()
    }
}
