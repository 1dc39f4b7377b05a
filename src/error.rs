//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::bank::BankError;
use crate::models::payment::TransitionError;
use crate::store::StoreError;

/// Application-wide error type.
///
/// # Error Categories
///
/// - **Authentication Errors**: missing or invalid bearer credential
/// - **Resource Errors**: payment not found or already exists
/// - **Lifecycle Errors**: operation not allowed from the current state
/// - **Processor Errors**: the bank call failed
/// - **Webhook Admission Errors**: missing or invalid signature
/// - **Storage Errors**: anything the store reports
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Storage operation failed.
    ///
    /// Returns HTTP 500; details are never sent to the client.
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Bearer credential missing, malformed, expired or signed by another key.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Unauthorized")]
    Unauthorized,

    /// Returns HTTP 404 Not Found.
    #[error("Payment not found")]
    PaymentNotFound,

    /// A payment with the requested id already exists.
    ///
    /// Returns HTTP 409 Conflict.
    #[error("Payment already exists")]
    PaymentExists,

    /// Operation not allowed from the payment's current state.
    ///
    /// Returns HTTP 422 Unprocessable Entity. Never retried automatically.
    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    /// The processor call failed or the processor refused the request.
    ///
    /// Returns HTTP 502 Bad Gateway with the processor's message.
    #[error(transparent)]
    Bank(#[from] BankError),

    /// The processor reports a different amount than the one on record.
    ///
    /// Returns HTTP 422 Unprocessable Entity.
    #[error("Processor amount {verified} does not match payment amount {expected}")]
    AmountMismatch { expected: i64, verified: i64 },

    /// Webhook arrived without a signature header.
    ///
    /// Returns HTTP 400 Bad Request.
    #[error("Missing signature")]
    MissingSignature,

    /// Webhook signature does not match the body.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Invalid signature")]
    InvalidSignature,

    /// No shared secret available to check webhook signatures.
    ///
    /// Returns HTTP 500 Internal Server Error.
    #[error("Webhook verification is not configured")]
    WebhookNotConfigured,

    /// Request body or parameters are invalid.
    ///
    /// Returns HTTP 400 Bad Request.
    /// The String contains details about what was invalid.
    #[error("Invalid request")]
    InvalidRequest(String),
}

impl AppError {
    /// Map each error variant to (HTTP status, error code).
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::PaymentNotFound => (StatusCode::NOT_FOUND, "payment_not_found"),
            AppError::PaymentExists => (StatusCode::CONFLICT, "payment_exists"),
            AppError::InvalidTransition(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "invalid_transition")
            }
            AppError::Bank(_) => (StatusCode::BAD_GATEWAY, "bank_error"),
            AppError::AmountMismatch { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "amount_mismatch"),
            AppError::MissingSignature => (StatusCode::BAD_REQUEST, "missing_signature"),
            AppError::InvalidSignature => (StatusCode::UNAUTHORIZED, "invalid_signature"),
            AppError::WebhookNotConfigured => {
                (StatusCode::INTERNAL_SERVER_ERROR, "webhook_not_configured")
            }
            AppError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            AppError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// All errors return JSON in this format:
/// ```json
/// {
///   "error": {
///     "code": "error_type",
///     "message": "Human-readable error message"
///   }
/// }
/// ```
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            AppError::InvalidRequest(msg) => msg.clone(),
            AppError::Store(err) => {
                tracing::error!(error = %err, "storage failure");
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
