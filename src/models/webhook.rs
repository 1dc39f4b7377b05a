//! Inbound processor notification models.
//!
//! The processor POSTs an event to `/v1/payments/webhooks/paystack` whenever
//! a charge changes state on its side. The body is signed with HMAC-SHA512
//! and only parsed into these types after the signature has been verified.
//!
//! # Example
//!
//! ```json
//! {
//!   "event": "charge.success",
//!   "data": {
//!     "reference": "pay_12345",
//!     "status": "success",
//!     "amount": 5000,
//!     "currency": "NGN"
//!   }
//! }
//! ```

use serde::Deserialize;

/// Notification envelope sent by the processor.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    /// Event name, e.g. `charge.success`
    pub event: String,

    #[serde(default)]
    pub data: WebhookEventData,
}

/// Event payload.
///
/// `status` and `amount` are informational only: the charge is always
/// re-verified with the processor before any state change.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookEventData {
    #[serde(default)]
    pub reference: String,

    #[serde(default)]
    pub status: Option<String>,

    #[serde(default)]
    pub amount: Option<i64>,

    #[serde(default)]
    pub currency: Option<String>,
}

impl WebhookEvent {
    /// Charge events are the only ones that can move a payment.
    pub fn is_charge_event(&self) -> bool {
        self.event.starts_with("charge.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_charge_event() {
        let event: WebhookEvent =
            serde_json::from_str(r#"{"event":"charge.success","data":{"reference":"p3"}}"#)
                .unwrap();

        assert!(event.is_charge_event());
        assert_eq!(event.data.reference, "p3");
        assert!(event.data.status.is_none());
    }

    #[test]
    fn non_charge_events_are_recognised() {
        let event: WebhookEvent =
            serde_json::from_str(r#"{"event":"transfer.success","data":{}}"#).unwrap();

        assert!(!event.is_charge_event());
        assert!(event.data.reference.is_empty());
    }
}
