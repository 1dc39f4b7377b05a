//! Payment HTTP handlers.
//!
//! This module implements payment-related API endpoints:
//! - POST /v1/payments - Authorize with the processor and create a payment
//! - GET /v1/payments - List payments with their operations
//! - GET /v1/payments/{id} - Get one payment with its operations
//! - POST /v1/payments/{id}/refund - Refund a captured payment
//! - POST /v1/payments/{id}/operations - Apply any lifecycle operation
//! - GET /v1/payments/callback/verify - Payer redirect after checkout

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Html,
};
use serde::Deserialize;

use crate::{
    app::AppState,
    error::AppError,
    middleware::auth::Claims,
    models::payment::{
        CreatePaymentRequest, CreatePaymentResponse, OperationRequest, OperationResponse,
        OperationType, PaymentDetails, RefundRequest,
    },
    services::payment_service::{self, ApplyOutcome, Reconciliation},
};

fn operation_response(outcome: ApplyOutcome) -> OperationResponse {
    OperationResponse {
        already_applied: outcome.is_already_applied(),
        payment: outcome.into_details(),
    }
}

/// Create a payment.
///
/// # Request Body
///
/// ```json
/// {
///   "id": "pay_12345",
///   "amount": 5000,
///   "email": "customer@example.com",
///   "order_id": "order_123"
/// }
/// ```
///
/// `user_id` defaults to the token subject when omitted.
///
/// # Response (201)
///
/// ```json
/// {
///   "authorization": { "reference": "pay_12345", "authorization_url": "https://checkout..." },
///   "payment": { "id": "pay_12345", "amount": 5000, "state": "initiated", "operations": [] }
/// }
/// ```
pub async fn create_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(mut request): Json<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<CreatePaymentResponse>), AppError> {
    if request.user_id.is_empty() {
        request.user_id = claims.sub;
    }

    let created = payment_service::create_payment(
        state.store.as_ref(),
        state.bank.as_ref(),
        &state.checkout,
        request,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn list_payments(
    State(state): State<AppState>,
) -> Result<Json<Vec<PaymentDetails>>, AppError> {
    let payments = payment_service::list_payments(state.store.as_ref()).await?;
    Ok(Json(payments))
}

pub async fn get_payment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PaymentDetails>, AppError> {
    let payment = payment_service::get_payment(state.store.as_ref(), &id).await?;
    Ok(Json(payment))
}

/// Refund a captured payment.
///
/// Replaying the same `operation_id` returns the current payment with
/// `already_applied: true` and does not contact the processor again.
pub async fn refund_payment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<RefundRequest>,
) -> Result<Json<OperationResponse>, AppError> {
    let outcome = payment_service::apply_operation(
        state.store.as_ref(),
        state.bank.as_ref(),
        &id,
        &request.operation_id,
        OperationType::Refund,
    )
    .await?;

    Ok(Json(operation_response(outcome)))
}

/// Apply any lifecycle operation through the transition engine.
///
/// ```json
/// { "operation": "void", "operation_id": "void-001" }
/// ```
pub async fn apply_operation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<OperationRequest>,
) -> Result<Json<OperationResponse>, AppError> {
    let outcome = payment_service::apply_operation(
        state.store.as_ref(),
        state.bank.as_ref(),
        &id,
        &request.operation_id,
        request.operation,
    )
    .await?;

    Ok(Json(operation_response(outcome)))
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub reference: Option<String>,
}

fn page(title: &str, message: &str) -> Html<String> {
    Html(format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>{title}</title></head>\
         <body><h1>{title}</h1><p>{message}</p></body></html>"
    ))
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Payer redirect after checkout.
///
/// Reconciles the payment with the processor under key `verify-{reference}`
/// and renders a small status page. An unknown reference is acknowledged
/// with a 200 page; other failures render with their error status.
pub async fn verify_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Result<(StatusCode, Html<String>), AppError> {
    let reference = query
        .reference
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .ok_or_else(|| AppError::InvalidRequest("reference is required".to_string()))?;

    let operation_id = payment_service::callback_operation_id(&reference);
    let shown = escape(&reference);

    let result = payment_service::reconcile(
        state.store.as_ref(),
        state.bank.as_ref(),
        &reference,
        &operation_id,
    )
    .await;

    let response = match result {
        Ok(Reconciliation::Settled {
            operation: OperationType::Capture,
            ..
        }) => (
            StatusCode::OK,
            page("Payment successful", &format!("Payment {shown} has been confirmed.")),
        ),
        Ok(Reconciliation::Settled { .. }) => (
            StatusCode::OK,
            page("Payment failed", &format!("Payment {shown} was not completed.")),
        ),
        Ok(Reconciliation::Pending { status }) => (
            StatusCode::OK,
            page(
                "Payment pending",
                &format!("Payment {shown} is still {}.", escape(&status)),
            ),
        ),
        Err(AppError::PaymentNotFound) => {
            tracing::info!(reference = %reference, "callback for unknown payment");
            (
                StatusCode::OK,
                page("Payment not found", &format!("No payment matches {shown}.")),
            )
        }
        Err(e) => {
            tracing::warn!(reference = %reference, error = %e, "callback verification failed");
            let status = match &e {
                AppError::Bank(_) => StatusCode::BAD_GATEWAY,
                AppError::InvalidTransition(_) | AppError::AmountMismatch { .. } => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (
                status,
                page(
                    "Verification failed",
                    &format!("We could not confirm payment {shown}. Please try again later."),
                ),
            )
        }
    };

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_escapes_reference() {
        let shown = escape("<script>\"x\"&");
        assert_eq!(shown, "&lt;script&gt;&quot;x&quot;&amp;");
        let Html(body) = page("Payment pending", &shown);
        assert!(!body.contains("<script>"));
    }
}
