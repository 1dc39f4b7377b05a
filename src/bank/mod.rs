//! Bank capability: the payment processor as seen by the rest of the service.
//!
//! The concrete adapter is chosen once at wiring time (see `BankMode` in
//! `config`) and handed around as `Arc<dyn Bank>`:
//! - `paystack::PaystackClient` talks to the processor's REST API
//! - `simulator::SimulatedBank` answers locally with injected latency and failures

pub mod paystack;
pub mod simulator;

use async_trait::async_trait;
use serde::Serialize;

/// Request to start a charge with the processor.
#[derive(Debug, Clone)]
pub struct AuthorizeRequest {
    /// Our payment id, used as the processor reference
    pub payment_id: String,

    /// Idempotency key forwarded to the processor
    pub operation_id: String,

    pub amount: i64,
    pub currency: String,
    pub email: String,

    /// Where the processor redirects the payer once checkout finishes
    pub callback_url: String,
}

/// Processor answer to an authorize call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorizeResponse {
    pub reference: String,

    /// Hosted checkout page the payer must visit
    pub authorization_url: String,
}

/// Authoritative state of a charge as reported by the processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyResponse {
    pub reference: String,

    /// `success`, `failed`, `abandoned`, `pending`, ...
    pub status: String,

    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct RefundRequest {
    pub reference: String,
    pub amount: i64,

    /// Idempotency key forwarded to the processor; a retry with the same
    /// key gets the original refund back instead of a second one.
    pub operation_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundResponse {
    pub reference: String,
    pub status: String,
}

/// Failure talking to the processor.
#[derive(Debug, thiserror::Error)]
pub enum BankError {
    /// Request never produced a response (DNS, TLS, timeout, reset).
    #[error("processor request failed: {0}")]
    Transport(String),

    /// Non-2xx answer, with the processor's message when it sent one.
    #[error("processor returned status {status}: {message}")]
    Status { status: u16, message: String },

    /// 2xx answer whose envelope reported `status: false`.
    #[error("processor error: {0}")]
    Processor(String),

    #[error("invalid processor response: {0}")]
    Decode(String),

    /// Temporary failure injected by the simulator.
    #[error("temporary bank error")]
    Unavailable,
}

/// Operations the service needs from a payment processor.
///
/// Implementations must be safe to share across request handlers.
#[async_trait]
pub trait Bank: Send + Sync {
    async fn authorize(&self, request: AuthorizeRequest) -> Result<AuthorizeResponse, BankError>;

    async fn verify(&self, reference: &str) -> Result<VerifyResponse, BankError>;

    async fn refund(&self, request: RefundRequest) -> Result<RefundResponse, BankError>;
}
