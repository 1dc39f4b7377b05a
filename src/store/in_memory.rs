//! In-memory payment store.
//!
//! Each payment lives behind its own `tokio::sync::Mutex`, which plays the
//! role of the row lock: a unit of work holds the owned guard from
//! `lock_payment` until it commits or is dropped. Writes are staged on the
//! unit of work and only reach the shared row on `commit`, so an abandoned
//! unit of work leaves nothing behind.
//!
//! Readers never touch the row mutexes. `get` and `list` serve a committed
//! snapshot that `commit` refreshes while it still holds the row guards, so
//! a slow unit of work (a refund waiting on the processor) does not stall
//! them.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use super::{PaymentStore, PaymentTx, StoreError};
use crate::models::payment::{NewPaymentOperation, Payment, PaymentDetails, PaymentOperation};

#[derive(Debug)]
struct Row {
    payment: Payment,
    operations: Vec<PaymentOperation>,
}

impl Row {
    fn details(&self) -> PaymentDetails {
        PaymentDetails {
            payment: self.payment.clone(),
            operations: self.operations.clone(),
        }
    }
}

/// A thread-safe in-memory store for payments.
///
/// Cloning shares the underlying data.
#[derive(Debug, Default, Clone)]
pub struct InMemoryPaymentStore {
    rows: Arc<RwLock<HashMap<String, Arc<Mutex<Row>>>>>,
    committed: Arc<RwLock<HashMap<String, PaymentDetails>>>,
}

impl InMemoryPaymentStore {
    /// Creates a new, empty in-memory payment store.
    pub fn new() -> Self {
        Self::default()
    }

    async fn row(&self, id: &str) -> Option<Arc<Mutex<Row>>> {
        self.rows.read().await.get(id).cloned()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn create(&self, payment: Payment) -> Result<Payment, StoreError> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(&payment.id) {
            return Err(StoreError::DuplicatePayment(payment.id));
        }

        let row = Row {
            payment: payment.clone(),
            operations: Vec::new(),
        };
        self.committed
            .write()
            .await
            .insert(payment.id.clone(), row.details());
        rows.insert(payment.id.clone(), Arc::new(Mutex::new(row)));
        Ok(payment)
    }

    async fn get(&self, id: &str) -> Result<Option<PaymentDetails>, StoreError> {
        Ok(self.committed.read().await.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<PaymentDetails>, StoreError> {
        let mut payments: Vec<_> = self.committed.read().await.values().cloned().collect();
        payments.sort_by(|a, b| {
            b.payment
                .created_at
                .cmp(&a.payment.created_at)
                .then_with(|| a.payment.id.cmp(&b.payment.id))
        });
        Ok(payments)
    }

    async fn begin(&self) -> Result<Box<dyn PaymentTx>, StoreError> {
        Ok(Box::new(InMemoryPaymentTx {
            store: self.clone(),
            locked: HashMap::new(),
        }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Locked row plus the writes staged against it.
struct Locked {
    guard: OwnedMutexGuard<Row>,
    payment: Option<Payment>,
    operations: Vec<PaymentOperation>,
}

/// Unit of work over the in-memory store.
pub struct InMemoryPaymentTx {
    store: InMemoryPaymentStore,
    locked: HashMap<String, Locked>,
}

impl InMemoryPaymentTx {
    /// Lock `id` for the rest of this unit of work if it is not already held.
    async fn acquire(&mut self, id: &str) -> Option<&mut Locked> {
        if !self.locked.contains_key(id) {
            let row = self.store.row(id).await?;
            let guard = row.lock_owned().await;
            self.locked.insert(
                id.to_string(),
                Locked {
                    guard,
                    payment: None,
                    operations: Vec::new(),
                },
            );
        }
        self.locked.get_mut(id)
    }
}

#[async_trait]
impl PaymentTx for InMemoryPaymentTx {
    async fn lock_payment(&mut self, id: &str) -> Result<Option<Payment>, StoreError> {
        Ok(self.acquire(id).await.map(|locked| {
            locked
                .payment
                .clone()
                .unwrap_or_else(|| locked.guard.payment.clone())
        }))
    }

    async fn find_operation(
        &mut self,
        payment_id: &str,
        operation_id: &str,
    ) -> Result<Option<PaymentOperation>, StoreError> {
        let Some(locked) = self.acquire(payment_id).await else {
            return Ok(None);
        };

        Ok(locked
            .guard
            .operations
            .iter()
            .chain(locked.operations.iter())
            .find(|op| op.operation_id == operation_id)
            .cloned())
    }

    async fn insert_operation(
        &mut self,
        operation: NewPaymentOperation,
    ) -> Result<PaymentOperation, StoreError> {
        let payment_id = operation.payment_id.clone();
        let locked = self
            .acquire(&payment_id)
            .await
            .ok_or_else(|| StoreError::MissingPayment(payment_id.clone()))?;

        let taken = locked
            .guard
            .operations
            .iter()
            .chain(locked.operations.iter())
            .any(|op| op.operation_id == operation.operation_id);
        if taken {
            return Err(StoreError::DuplicateOperation {
                payment_id,
                operation_id: operation.operation_id,
            });
        }

        let operation = operation.into_operation();
        locked.operations.push(operation.clone());
        Ok(operation)
    }

    async fn record_bank_reference(
        &mut self,
        operation: &PaymentOperation,
        bank_reference: &str,
    ) -> Result<(), StoreError> {
        let staged = self
            .locked
            .get_mut(&operation.payment_id)
            .and_then(|locked| locked.operations.iter_mut().find(|op| op.id == operation.id))
            .ok_or(StoreError::MissingOperation(operation.id))?;

        staged.bank_reference = Some(bank_reference.to_string());
        Ok(())
    }

    async fn update_state(&mut self, payment: &Payment) -> Result<(), StoreError> {
        let locked = self
            .acquire(&payment.id)
            .await
            .ok_or_else(|| StoreError::MissingPayment(payment.id.clone()))?;

        locked.payment = Some(payment.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let Self { store, locked } = *self;
        let mut committed = store.committed.write().await;
        for (id, mut locked) in locked {
            if let Some(payment) = locked.payment.take() {
                locked.guard.payment = payment;
            }
            locked.guard.operations.append(&mut locked.operations);
            committed.insert(id, locked.guard.details());
        }
        Ok(())
    }
}
