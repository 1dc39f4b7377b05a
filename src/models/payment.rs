//! Payment data models, lifecycle state machine and API request/response types.
//!
//! This module defines:
//! - `Payment`: the transaction record and its current lifecycle stage
//! - `PaymentOperation`: one entry of a payment's append-only operation ledger
//! - `PaymentState::apply`: the pure transition function
//! - Request and response bodies for the payment endpoints
//!
//! # Lifecycle
//!
//! ```text
//! initiated ──authorize──▶ authorized ──capture──▶ captured ──refund──▶ refunded
//!     │                        │
//!     └───────capture──────────┼──────────────────▶ captured
//!                              └──void──▶ voided
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bank::AuthorizeResponse;

/// Lifecycle stage of a payment.
///
/// Stored as lowercase text in the `payments.state` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentState {
    Initiated,
    Authorized,
    Captured,
    Voided,
    Refunded,
}

/// An operation that moves a payment from one state to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Authorize,
    Capture,
    Void,
    Refund,
}

/// Outcome recorded on an operation ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationResult {
    Success,
    Failed,
}

/// Rejection produced by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("cannot {operation} a payment that is {from}")]
    InvalidTransition {
        from: PaymentState,
        operation: OperationType,
    },
}

/// A textual enum value that does not name any known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl PaymentState {
    pub const ALL: [PaymentState; 5] = [
        PaymentState::Initiated,
        PaymentState::Authorized,
        PaymentState::Captured,
        PaymentState::Voided,
        PaymentState::Refunded,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentState::Initiated => "initiated",
            PaymentState::Authorized => "authorized",
            PaymentState::Captured => "captured",
            PaymentState::Voided => "voided",
            PaymentState::Refunded => "refunded",
        }
    }

    /// Compute the state reached by applying `operation` to a payment in this state.
    ///
    /// Total over every `(state, operation)` pair: either the next state or an
    /// `InvalidTransition` naming both inputs. Direct capture from `Initiated`
    /// is allowed, the processor having already settled the charge by the time
    /// we learn about it.
    pub fn apply(self, operation: OperationType) -> Result<PaymentState, TransitionError> {
        use OperationType::*;
        use PaymentState::*;

        match (self, operation) {
            (Initiated, Authorize) => Ok(Authorized),
            (Initiated, Capture) | (Authorized, Capture) => Ok(Captured),
            (Authorized, Void) => Ok(Voided),
            (Captured, Refund) => Ok(Refunded),
            (from, operation) => Err(TransitionError::InvalidTransition { from, operation }),
        }
    }

    /// No operation is accepted from a terminal state.
    pub fn is_terminal(self) -> bool {
        OperationType::ALL
            .iter()
            .all(|operation| self.apply(*operation).is_err())
    }
}

impl OperationType {
    pub const ALL: [OperationType; 4] = [
        OperationType::Authorize,
        OperationType::Capture,
        OperationType::Void,
        OperationType::Refund,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OperationType::Authorize => "authorize",
            OperationType::Capture => "capture",
            OperationType::Void => "void",
            OperationType::Refund => "refund",
        }
    }
}

impl OperationResult {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationResult::Success => "success",
            OperationResult::Failed => "failed",
        }
    }
}

impl fmt::Display for PaymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentState {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| UnknownVariant {
                kind: "payment state",
                value: s.to_string(),
            })
    }
}

impl FromStr for OperationType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperationType::ALL
            .into_iter()
            .find(|operation| operation.as_str() == s)
            .ok_or_else(|| UnknownVariant {
                kind: "operation type",
                value: s.to_string(),
            })
    }
}

impl FromStr for OperationResult {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(OperationResult::Success),
            "failed" => Ok(OperationResult::Failed),
            other => Err(UnknownVariant {
                kind: "operation result",
                value: other.to_string(),
            }),
        }
    }
}

/// Represents a payment record.
///
/// # Database Table
///
/// Maps to the `payments` table. Each payment:
/// - Has a caller-supplied, globally unique `id` that doubles as the
///   processor reference
/// - Stores its amount in minor currency units (never floats!)
/// - Changes `state` only through the transition engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Payment {
    pub id: String,

    /// Amount in minor units (kobo, cents). Immutable after creation.
    pub amount: i64,

    pub state: PaymentState,

    /// Opaque correlation tag for the paying user
    pub user_id: String,

    /// Opaque correlation tag for the order being paid
    pub order_id: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// A freshly created payment, always in `Initiated`.
    pub fn new(id: String, amount: i64, user_id: String, order_id: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            amount,
            state: PaymentState::Initiated,
            user_id,
            order_id,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move this in-memory snapshot to the state reached by `operation`.
    ///
    /// On rejection the snapshot is left untouched.
    pub fn apply_operation(&mut self, operation: OperationType) -> Result<(), TransitionError> {
        self.state = self.state.apply(operation)?;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// One ledger entry: an operation applied to a payment under an idempotency key.
///
/// # Database Table
///
/// Maps to the `payment_operations` table. `(payment_id, operation_id)` is
/// unique, so a key can be recorded at most once per payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentOperation {
    pub id: Uuid,
    pub payment_id: String,

    /// Idempotency key supplied by the caller or derived by the system
    pub operation_id: String,

    pub operation_type: OperationType,
    pub amount: i64,
    pub result: OperationResult,

    /// Reference returned by the processor when the operation called it
    pub bank_reference: Option<String>,

    pub created_at: DateTime<Utc>,
}

/// Data required to append a ledger entry.
#[derive(Debug, Clone)]
pub struct NewPaymentOperation {
    pub payment_id: String,
    pub operation_id: String,
    pub operation_type: OperationType,
    pub amount: i64,
    pub result: OperationResult,
    pub bank_reference: Option<String>,
}

impl NewPaymentOperation {
    pub fn into_operation(self) -> PaymentOperation {
        PaymentOperation {
            id: Uuid::new_v4(),
            payment_id: self.payment_id,
            operation_id: self.operation_id,
            operation_type: self.operation_type,
            amount: self.amount,
            result: self.result,
            bank_reference: self.bank_reference,
            created_at: Utc::now(),
        }
    }
}

/// A payment together with its operations, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentDetails {
    #[serde(flatten)]
    pub payment: Payment,
    pub operations: Vec<PaymentOperation>,
}

/// Request to create a payment.
///
/// # JSON Example
///
/// ```json
/// {
///   "id": "pay_12345",
///   "amount": 5000,
///   "email": "customer@example.com",
///   "user_id": "user_123",
///   "order_id": "order_123"
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    pub id: String,

    /// Amount in minor units, must be positive
    pub amount: i64,

    /// Payer email forwarded to the processor
    pub email: String,

    #[serde(default)]
    pub user_id: String,

    #[serde(default)]
    pub order_id: String,
}

/// Response for a created payment: the processor authorization plus the stored record.
#[derive(Debug, Serialize)]
pub struct CreatePaymentResponse {
    pub authorization: AuthorizeResponse,
    pub payment: PaymentDetails,
}

/// Request to refund a payment.
///
/// ```json
/// { "operation_id": "refund-2025-001" }
/// ```
#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    pub operation_id: String,
}

/// Request to apply an arbitrary operation.
///
/// ```json
/// { "operation": "capture", "operation_id": "capture-001" }
/// ```
#[derive(Debug, Deserialize)]
pub struct OperationRequest {
    pub operation: OperationType,
    pub operation_id: String,
}

/// Response for an engine call: the payment after the call and whether the key was already used.
#[derive(Debug, Serialize)]
pub struct OperationResponse {
    pub already_applied: bool,

    #[serde(flatten)]
    pub payment: PaymentDetails,
}

#[cfg(test)]
mod tests {
    use super::*;
    use OperationType::*;
    use PaymentState::*;

    #[test]
    fn allowed_transitions_follow_the_table() {
        assert_eq!(Initiated.apply(Authorize), Ok(Authorized));
        assert_eq!(Initiated.apply(Capture), Ok(Captured));
        assert_eq!(Authorized.apply(Capture), Ok(Captured));
        assert_eq!(Authorized.apply(Void), Ok(Voided));
        assert_eq!(Captured.apply(Refund), Ok(Refunded));
    }

    #[test]
    fn every_other_pair_is_rejected_with_its_inputs() {
        let allowed = [
            (Initiated, Authorize),
            (Initiated, Capture),
            (Authorized, Capture),
            (Authorized, Void),
            (Captured, Refund),
        ];

        for state in PaymentState::ALL {
            for operation in OperationType::ALL {
                if allowed.contains(&(state, operation)) {
                    continue;
                }
                assert_eq!(
                    state.apply(operation),
                    Err(TransitionError::InvalidTransition {
                        from: state,
                        operation
                    }),
                    "{state} + {operation} should be rejected"
                );
            }
        }
    }

    #[test]
    fn terminal_states() {
        assert!(Voided.is_terminal());
        assert!(Refunded.is_terminal());
        assert!(!Initiated.is_terminal());
        assert!(!Authorized.is_terminal());
        // Captured still accepts a refund
        assert!(!Captured.is_terminal());
    }

    #[test]
    fn rejected_operation_leaves_snapshot_untouched() {
        let mut payment = Payment::new("p1".into(), 1000, "u".into(), "o".into());
        let before = payment.clone();

        let err = payment.apply_operation(Void).unwrap_err();

        assert_eq!(
            err,
            TransitionError::InvalidTransition {
                from: Initiated,
                operation: Void
            }
        );
        assert_eq!(payment, before);
    }

    #[test]
    fn authorize_only_from_initiated() {
        let mut payment = Payment::new("p2".into(), 2000, "u".into(), "o".into());
        payment.apply_operation(Authorize).unwrap();
        assert_eq!(payment.state, Authorized);

        assert!(payment.apply_operation(Authorize).is_err());
        assert_eq!(payment.state, Authorized);
    }

    #[test]
    fn text_round_trips_through_from_str() {
        for state in PaymentState::ALL {
            assert_eq!(state.as_str().parse::<PaymentState>(), Ok(state));
        }
        for operation in OperationType::ALL {
            assert_eq!(operation.as_str().parse::<OperationType>(), Ok(operation));
        }
        assert!("settled".parse::<PaymentState>().is_err());
        assert!("CAPTURE".parse::<OperationType>().is_err());
    }

    #[test]
    fn error_message_names_state_and_operation() {
        let err = Refunded.apply(Refund).unwrap_err();
        assert_eq!(err.to_string(), "cannot refund a payment that is refunded");
    }

    #[test]
    fn operation_request_uses_lowercase_names() {
        let request: OperationRequest =
            serde_json::from_str(r#"{"operation":"void","operation_id":"k1"}"#).unwrap();
        assert_eq!(request.operation, Void);
        assert_eq!(request.operation_id, "k1");
    }
}
