//! PostgreSQL payment store.
//!
//! # Atomicity Guarantees
//!
//! A `PgPaymentTx` wraps one PostgreSQL transaction. The payment row is
//! locked with `SELECT ... FOR UPDATE`, so concurrent transitions on the same
//! payment are serialised while different payments proceed in parallel.
//! The `UNIQUE (payment_id, operation_id)` constraint rejects a second
//! insert of the same key even if two transactions both missed it on lookup.
//! The engine inserts the ledger row before calling the processor, so the
//! constraint also keeps a second refund request from leaving the service.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use super::{PaymentStore, PaymentTx, StoreError};
use crate::db::DbPool;
use crate::models::payment::{
    NewPaymentOperation, Payment, PaymentDetails, PaymentOperation, UnknownVariant,
};

const PAYMENT_COLUMNS: &str = "id, amount, state, user_id, order_id, created_at, updated_at";
const OPERATION_COLUMNS: &str =
    "id, payment_id, operation_id, operation_type, amount, result, bank_reference, created_at";

/// Raw `payments` row; `state` is validated when converted to `Payment`.
#[derive(Debug, sqlx::FromRow)]
struct PaymentRow {
    id: String,
    amount: i64,
    state: String,
    user_id: String,
    order_id: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Raw `payment_operations` row.
#[derive(Debug, sqlx::FromRow)]
struct OperationRow {
    id: Uuid,
    payment_id: String,
    operation_id: String,
    operation_type: String,
    amount: i64,
    result: String,
    bank_reference: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = UnknownVariant;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            id: row.id,
            amount: row.amount,
            state: row.state.parse()?,
            user_id: row.user_id,
            order_id: row.order_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl TryFrom<OperationRow> for PaymentOperation {
    type Error = UnknownVariant;

    fn try_from(row: OperationRow) -> Result<Self, Self::Error> {
        Ok(PaymentOperation {
            id: row.id,
            payment_id: row.payment_id,
            operation_id: row.operation_id,
            operation_type: row.operation_type.parse()?,
            amount: row.amount,
            result: row.result.parse()?,
            bank_reference: row.bank_reference,
            created_at: row.created_at,
        })
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db_err| db_err.is_unique_violation())
}

/// Payment store backed by a PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct PgPaymentStore {
    pool: DbPool,
}

impl PgPaymentStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentStore for PgPaymentStore {
    async fn create(&self, payment: Payment) -> Result<Payment, StoreError> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            r#"
            INSERT INTO payments (id, amount, state, user_id, order_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(&payment.id)
        .bind(payment.amount)
        .bind(payment.state.as_str())
        .bind(&payment.user_id)
        .bind(&payment.order_id)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::DuplicatePayment(payment.id.clone())
            } else {
                StoreError::Database(e)
            }
        })?;

        Ok(Payment::try_from(row)?)
    }

    async fn get(&self, id: &str) -> Result<Option<PaymentDetails>, StoreError> {
        let Some(row) = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let operations = sqlx::query_as::<_, OperationRow>(&format!(
            "SELECT {OPERATION_COLUMNS} FROM payment_operations
             WHERE payment_id = $1
             ORDER BY created_at, id"
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(PaymentOperation::try_from)
        .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(PaymentDetails {
            payment: Payment::try_from(row)?,
            operations,
        }))
    }

    async fn list(&self) -> Result<Vec<PaymentDetails>, StoreError> {
        let payments = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments ORDER BY created_at DESC, id"
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut operations: HashMap<String, Vec<PaymentOperation>> = HashMap::new();
        for row in sqlx::query_as::<_, OperationRow>(&format!(
            "SELECT {OPERATION_COLUMNS} FROM payment_operations ORDER BY created_at, id"
        ))
        .fetch_all(&self.pool)
        .await?
        {
            let operation = PaymentOperation::try_from(row)?;
            operations
                .entry(operation.payment_id.clone())
                .or_default()
                .push(operation);
        }

        payments
            .into_iter()
            .map(|row| -> Result<PaymentDetails, StoreError> {
                let payment = Payment::try_from(row)?;
                Ok(PaymentDetails {
                    operations: operations.remove(&payment.id).unwrap_or_default(),
                    payment,
                })
            })
            .collect()
    }

    async fn begin(&self) -> Result<Box<dyn PaymentTx>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgPaymentTx { tx }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Unit of work over one PostgreSQL transaction.
///
/// Dropping it without `commit` rolls the transaction back.
pub struct PgPaymentTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl PaymentTx for PgPaymentTx {
    async fn lock_payment(&mut self, id: &str) -> Result<Option<Payment>, StoreError> {
        // FOR UPDATE ensures no other transaction can modify this row until we finish
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(Payment::try_from).transpose()?)
    }

    async fn find_operation(
        &mut self,
        payment_id: &str,
        operation_id: &str,
    ) -> Result<Option<PaymentOperation>, StoreError> {
        let row = sqlx::query_as::<_, OperationRow>(&format!(
            "SELECT {OPERATION_COLUMNS} FROM payment_operations
             WHERE payment_id = $1 AND operation_id = $2"
        ))
        .bind(payment_id)
        .bind(operation_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(PaymentOperation::try_from).transpose()?)
    }

    async fn insert_operation(
        &mut self,
        operation: NewPaymentOperation,
    ) -> Result<PaymentOperation, StoreError> {
        let operation = operation.into_operation();

        let row = sqlx::query_as::<_, OperationRow>(&format!(
            r#"
            INSERT INTO payment_operations (
                id,
                payment_id,
                operation_id,
                operation_type,
                amount,
                result,
                bank_reference,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {OPERATION_COLUMNS}
            "#
        ))
        .bind(operation.id)
        .bind(&operation.payment_id)
        .bind(&operation.operation_id)
        .bind(operation.operation_type.as_str())
        .bind(operation.amount)
        .bind(operation.result.as_str())
        .bind(&operation.bank_reference)
        .bind(operation.created_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::DuplicateOperation {
                    payment_id: operation.payment_id.clone(),
                    operation_id: operation.operation_id.clone(),
                }
            } else {
                StoreError::Database(e)
            }
        })?;

        Ok(PaymentOperation::try_from(row)?)
    }

    async fn record_bank_reference(
        &mut self,
        operation: &PaymentOperation,
        bank_reference: &str,
    ) -> Result<(), StoreError> {
        let updated = sqlx::query("UPDATE payment_operations SET bank_reference = $1 WHERE id = $2")
            .bind(bank_reference)
            .bind(operation.id)
            .execute(&mut *self.tx)
            .await?
            .rows_affected();

        if updated == 0 {
            return Err(StoreError::MissingOperation(operation.id));
        }
        Ok(())
    }

    async fn update_state(&mut self, payment: &Payment) -> Result<(), StoreError> {
        let updated = sqlx::query(
            r#"
            UPDATE payments
            SET state = $1,
                updated_at = $2
            WHERE id = $3
            "#,
        )
        .bind(payment.state.as_str())
        .bind(payment.updated_at)
        .bind(&payment.id)
        .execute(&mut *self.tx)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(StoreError::MissingPayment(payment.id.clone()));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}
