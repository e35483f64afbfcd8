pub mod errors;
pub mod handlers;

use {
    crate::AppState,
    axum::{
        Router,
        extract::DefaultBodyLimit,
        http::StatusCode,
        routing::{get, post},
    },
    std::time::Duration,
    tower::ServiceBuilder,
    tower_http::timeout::TimeoutLayer,
};

/// Upper bound for any request. Verification retries stop at their own
/// deadline, which config keeps below this.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/payments", post(handlers::initialize_payment))
        .route("/payments/existing", get(handlers::existing_payment))
        .route("/payments/{reference}/verify", get(handlers::verify_payment))
        .route("/payments/{reference}/return", get(handlers::payment_return))
        .route("/webhooks/card-bank", post(handlers::card_bank_webhook))
        .route("/webhooks/crypto", post(handlers::crypto_webhook))
        .layer(
            ServiceBuilder::new()
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    REQUEST_TIMEOUT,
                ))
                .layer(DefaultBodyLimit::max(handlers::WEBHOOK_BODY_LIMIT)),
        )
        .with_state(state)
}
