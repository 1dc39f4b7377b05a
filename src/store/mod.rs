//! Persistence contract for payments and their operation ledger.
//!
//! The transition engine only needs a handful of primitives from storage:
//! a per-payment exclusive lock, a lookup by idempotency key, a guarded
//! insert, a bank-reference update and a state update, all inside one unit
//! of work. `PaymentTx` is
//! that unit of work: its writes become visible on `commit`, and dropping it
//! without committing discards them.
//!
//! Backends:
//! - `postgres::PgPaymentStore` (`SELECT ... FOR UPDATE`, unique constraint)
//! - `in_memory::InMemoryPaymentStore` (per-payment async mutex)

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;

use crate::models::payment::{
    NewPaymentOperation, Payment, PaymentDetails, PaymentOperation, UnknownVariant,
};

/// Storage failure.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("payment {0} already exists")]
    DuplicatePayment(String),

    /// The `(payment_id, operation_id)` uniqueness constraint fired.
    #[error("operation {operation_id} already recorded for payment {payment_id}")]
    DuplicateOperation {
        payment_id: String,
        operation_id: String,
    },

    #[error("payment {0} does not exist")]
    MissingPayment(String),

    #[error("operation {0} does not exist")]
    MissingOperation(uuid::Uuid),

    /// A stored row could not be mapped back to the domain.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl From<UnknownVariant> for StoreError {
    fn from(err: UnknownVariant) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

/// Payment repository.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Insert a new payment. Fails with `DuplicatePayment` if the id is taken.
    async fn create(&self, payment: Payment) -> Result<Payment, StoreError>;

    /// Payment with its operations, oldest operation first.
    async fn get(&self, id: &str) -> Result<Option<PaymentDetails>, StoreError>;

    /// All payments with their operations, newest payment first.
    async fn list(&self) -> Result<Vec<PaymentDetails>, StoreError>;

    /// Open a unit of work.
    async fn begin(&self) -> Result<Box<dyn PaymentTx>, StoreError>;

    /// Cheap connectivity check for the health endpoint.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// One atomic unit of work against the payment store.
#[async_trait]
pub trait PaymentTx: Send {
    /// Lock the payment row until commit or drop and return its current value.
    ///
    /// Blocks while another unit of work holds the same payment.
    async fn lock_payment(&mut self, id: &str) -> Result<Option<Payment>, StoreError>;

    async fn find_operation(
        &mut self,
        payment_id: &str,
        operation_id: &str,
    ) -> Result<Option<PaymentOperation>, StoreError>;

    /// Append a ledger entry. Fails with `DuplicateOperation` when the key is
    /// already recorded for the payment.
    async fn insert_operation(
        &mut self,
        operation: NewPaymentOperation,
    ) -> Result<PaymentOperation, StoreError>;

    /// Attach the processor's reference to an operation inserted by this
    /// unit of work.
    async fn record_bank_reference(
        &mut self,
        operation: &PaymentOperation,
        bank_reference: &str,
    ) -> Result<(), StoreError>;

    /// Persist the payment's new state.
    async fn update_state(&mut self, payment: &Payment) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

pub type PaymentStoreRef = Arc<dyn PaymentStore>;
