use {
    super::errors::{ApiError, pending_body},
    crate::{
        AppState,
        domain::{
            error::PaymentError,
            payment::RequestType,
            reference::Reference,
            verification::VerificationResult,
        },
        services::{
            duplicate_guard::ExistingPaymentCheck,
            gateway::{InitializePaymentRequest, PaymentInitResult},
            webhook::{
                CARD_BANK_SIGNATURE_HEADER, CRYPTO_SIGNATURE_HEADER, WebhookEvent, WebhookOutcome,
            },
        },
    },
    axum::{
        Json,
        body::Bytes,
        extract::{ConnectInfo, Path, Query, Request, State},
        http::{HeaderMap, StatusCode},
        response::{IntoResponse, Response},
    },
    serde::Deserialize,
    std::net::SocketAddr,
    tracing::{Span, field},
};

/// Webhook payloads are small; anything larger is rejected unread.
pub const WEBHOOK_BODY_LIMIT: usize = 64 * 1024;

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

pub async fn initialize_payment(
    State(state): State<AppState>,
    Json(req): Json<InitializePaymentRequest>,
) -> Result<(StatusCode, Json<PaymentInitResult>), ApiError> {
    let result = state.gateway.initialize_payment(req).await?;
    Ok((StatusCode::CREATED, Json(result)))
}

#[derive(Debug, Deserialize)]
pub struct VerifyParams {
    pub provider: Option<String>,
}

pub async fn verify_payment(
    State(state): State<AppState>,
    Path(reference): Path<String>,
    Query(params): Query<VerifyParams>,
) -> Result<Response, ApiError> {
    let provider = params
        .provider
        .ok_or_else(|| PaymentError::MissingParameter("provider".into()))?;
    let result = state.gateway.verify_payment(&reference, &provider).await?;
    Ok(verification_response(result))
}

/// Undecided results answer like an exhausted retry run: 202 and poll again.
fn verification_response(result: VerificationResult) -> Response {
    if result.is_inconclusive() {
        tracing::info!(reason = %result.message, "verification inconclusive");
        return (StatusCode::ACCEPTED, Json(pending_body())).into_response();
    }
    Json(result).into_response()
}

/// Landing target after the hosted checkout. Verifies against whichever
/// provider the payment was started with.
pub async fn payment_return(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Response, ApiError> {
    let parsed = Reference::new(reference.as_str())?;
    let payment = state
        .gateway
        .find_payment(&parsed)
        .await?
        .ok_or_else(|| PaymentError::NotFound(format!("payment {parsed}")))?;
    let result = state
        .gateway
        .verify_payment(&reference, payment.provider.as_str())
        .await?;
    Ok(verification_response(result))
}

#[derive(Debug, Deserialize)]
pub struct ExistingParams {
    pub request_id: Option<String>,
    pub request_type: Option<String>,
}

pub async fn existing_payment(
    State(state): State<AppState>,
    Query(params): Query<ExistingParams>,
) -> Result<Json<ExistingPaymentCheck>, ApiError> {
    let request_id = params
        .request_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| PaymentError::MissingParameter("request_id".into()))?;
    let request_type: RequestType = params
        .request_type
        .ok_or_else(|| PaymentError::MissingParameter("request_type".into()))?
        .parse()?;
    let check = state
        .gateway
        .guard()
        .check_existing(&request_id, request_type)
        .await;
    Ok(Json(check))
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

async fn read_body(request: Request) -> Result<(HeaderMap, Option<SocketAddr>, Bytes), Response> {
    let source = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, WEBHOOK_BODY_LIMIT)
        .await
        .map_err(|_| StatusCode::PAYLOAD_TOO_LARGE.into_response())?;
    Ok((parts.headers, source, bytes))
}

/// Verification and persistence for an authenticated event. Provider
/// outages answer 503 so the provider redelivers later.
async fn handle_event(state: &AppState, event: &WebhookEvent) -> Result<Response, ApiError> {
    let span = Span::current();
    span.record("event_type", event.event_type.as_str());
    if let Some(order_id) = &event.order_id {
        span.record("reference", order_id.as_str());
    }

    match state.webhooks.process(event).await {
        Ok(outcome) => {
            if let WebhookOutcome::Ignored { reason } = &outcome {
                tracing::info!(%reason, "webhook ignored");
            }
            Ok(Json(serde_json::json!({"status": outcome.label()})).into_response())
        }
        Err(e) if e.is_inconclusive() => {
            tracing::warn!(error = %e, "provider unavailable, asking for redelivery");
            Ok((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({"status": "retry_later"})),
            )
                .into_response())
        }
        Err(e) => Err(e.into()),
    }
}

#[tracing::instrument(
    name = "card_bank_webhook",
    skip_all,
    fields(event_type = field::Empty, reference = field::Empty)
)]
pub async fn card_bank_webhook(
    State(state): State<AppState>,
    request: Request,
) -> Result<Response, ApiError> {
    let (headers, source, body) = match read_body(request).await {
        Ok(parts) => parts,
        Err(rejection) => return Ok(rejection),
    };
    let event = state.card_bank_auth.authenticate(
        &body,
        header(&headers, CARD_BANK_SIGNATURE_HEADER),
        source.map(|addr| addr.ip()),
    )?;
    handle_event(&state, &event).await
}

#[tracing::instrument(
    name = "crypto_webhook",
    skip_all,
    fields(event_type = field::Empty, reference = field::Empty)
)]
pub async fn crypto_webhook(
    State(state): State<AppState>,
    request: Request,
) -> Result<Response, ApiError> {
    let (headers, _, body) = match read_body(request).await {
        Ok(parts) => parts,
        Err(rejection) => return Ok(rejection),
    };
    let event = state
        .crypto_auth
        .authenticate(&body, header(&headers, CRYPTO_SIGNATURE_HEADER))?;
    handle_event(&state, &event).await
}
