//! Processor webhook endpoint.
//!
//! - POST /v1/payments/webhooks/paystack
//!
//! The raw body is taken as bytes so the signature is checked over exactly
//! what the processor signed.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};

use crate::{
    app::AppState,
    error::AppError,
    services::webhook_service::{self, SIGNATURE_HEADER},
};

/// Receive a processor notification.
///
/// # Responses
///
/// - 200 `OK`: admitted (processed, ignored or absorbed)
/// - 400: signature header missing, or body is not an event
/// - 401: signature does not match
/// - 500: no webhook secret configured
pub async fn paystack_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, &'static str), AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    webhook_service::handle_notification(
        state.store.as_ref(),
        state.bank.as_ref(),
        &state.webhook,
        signature,
        &body,
    )
    .await?;

    Ok((StatusCode::OK, "OK"))
}
