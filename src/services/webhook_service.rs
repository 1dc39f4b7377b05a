//! Webhook admission and handling.
//!
//! Processor notifications are untrusted until their HMAC-SHA512 signature
//! checks out against the raw body. Even an admitted notification only
//! names a charge: the payment state is driven by asking the processor
//! directly (`payment_service::reconcile`), never by the body's own status.

use hmac::{Hmac, Mac};
use sha2::Sha512;

use crate::{
    bank::Bank,
    error::AppError,
    models::webhook::WebhookEvent,
    services::payment_service::{self, Reconciliation},
    store::PaymentStore,
};

type HmacSha512 = Hmac<Sha512>;

/// Header carrying the hex HMAC-SHA512 of the body.
pub const SIGNATURE_HEADER: &str = "x-paystack-signature";

/// Signature gate for processor notifications.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: Option<Vec<u8>>,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("configured", &self.secret.is_some())
            .finish()
    }
}

impl WebhookVerifier {
    /// An empty or absent secret leaves the gate closed to everything.
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret
                .filter(|s| !s.is_empty())
                .map(String::into_bytes),
        }
    }

    fn mac(secret: &[u8], body: &[u8]) -> Option<HmacSha512> {
        let mut mac = <HmacSha512 as Mac>::new_from_slice(secret).ok()?;
        mac.update(body);
        Some(mac)
    }

    /// Check `signature` (hex) against the body.
    ///
    /// The comparison runs in constant time.
    ///
    /// # Errors
    ///
    /// - `WebhookNotConfigured`: no secret
    /// - `MissingSignature`: header absent or empty
    /// - `InvalidSignature`: not hex, or does not match
    pub fn verify(&self, body: &[u8], signature: Option<&str>) -> Result<(), AppError> {
        let secret = self
            .secret
            .as_deref()
            .ok_or(AppError::WebhookNotConfigured)?;

        let signature = signature
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(AppError::MissingSignature)?;

        let provided = hex::decode(signature).map_err(|_| AppError::InvalidSignature)?;

        Self::mac(secret, body)
            .ok_or(AppError::WebhookNotConfigured)?
            .verify_slice(&provided)
            .map_err(|_| AppError::InvalidSignature)
    }

    /// Hex signature for `body`, as the processor would compute it.
    pub fn sign(&self, body: &[u8]) -> Option<String> {
        let secret = self.secret.as_deref()?;
        Some(hex::encode(Self::mac(secret, body)?.finalize().into_bytes()))
    }
}

/// What happened to an admitted notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookDisposition {
    /// Not a charge event, or no reference to act on.
    Ignored,

    /// Reconciled against the processor.
    Reconciled(Reconciliation),

    /// Processing failed after admission; the processor is still acknowledged.
    Absorbed(String),
}

/// Admit, parse and act on a processor notification.
///
/// # Process
///
/// 1. Verify the signature over the raw body
/// 2. Parse the event; ignore anything that is not `charge.*`
/// 3. Reconcile the referenced payment with key `webhook-{reference}`
///
/// Admission failures and unparseable bodies are returned as errors. Once
/// an event is accepted, every failure is logged and reported as `Absorbed`
/// so the processor does not keep redelivering it.
pub async fn handle_notification(
    store: &dyn PaymentStore,
    bank: &dyn Bank,
    verifier: &WebhookVerifier,
    signature: Option<&str>,
    body: &[u8],
) -> Result<WebhookDisposition, AppError> {
    verifier.verify(body, signature).inspect_err(|e| {
        tracing::warn!(reason = %e, body_len = body.len(), "webhook rejected");
    })?;

    let event: WebhookEvent = serde_json::from_slice(body).map_err(|e| {
        tracing::warn!(error = %e, "webhook body is not a valid event");
        AppError::InvalidRequest("Invalid webhook payload".to_string())
    })?;

    if !event.is_charge_event() || event.data.reference.trim().is_empty() {
        tracing::info!(event = %event.event, "webhook event ignored");
        return Ok(WebhookDisposition::Ignored);
    }

    let reference = event.data.reference.as_str();
    let operation_id = payment_service::webhook_operation_id(reference);

    match payment_service::reconcile(store, bank, reference, &operation_id).await {
        Ok(reconciliation) => {
            tracing::info!(event = %event.event, reference, "webhook processed");
            Ok(WebhookDisposition::Reconciled(reconciliation))
        }
        Err(AppError::PaymentNotFound) => {
            tracing::info!(reference, "webhook for unknown payment");
            Ok(WebhookDisposition::Absorbed(
                AppError::PaymentNotFound.to_string(),
            ))
        }
        Err(e) => {
            tracing::warn!(reference, error = %e, "webhook processing failed");
            Ok(WebhookDisposition::Absorbed(e.to_string()))
        }
    }
}
