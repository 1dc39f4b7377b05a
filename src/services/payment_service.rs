//! Payment service - Core business logic for the payment lifecycle.
//!
//! This service handles:
//! - Payment creation (processor authorization, then the stored record)
//! - The idempotent transition engine (`apply_operation`)
//! - Reconciliation with the processor's authoritative state
//!
//! # Atomicity Guarantees
//!
//! Every transition runs inside one `PaymentTx`: lock the payment, check the
//! idempotency key, run the state machine, call the processor if the
//! operation needs it, record the operation and persist the new state. Any
//! failure drops the unit of work, which discards all of its writes.

use crate::{
    bank::{AuthorizeRequest, Bank, RefundRequest},
    error::AppError,
    models::payment::{
        CreatePaymentRequest, CreatePaymentResponse, NewPaymentOperation, OperationResult,
        OperationType, Payment, PaymentDetails,
    },
    store::{PaymentStore, StoreError},
};

/// Checkout parameters fixed at startup.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    /// Currency sent to the processor on authorize
    pub currency: String,

    /// URL the processor redirects the payer to after checkout
    pub callback_url: String,
}

/// Result of an engine call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The operation ran now.
    Applied(PaymentDetails),

    /// The idempotency key was already recorded; nothing ran.
    AlreadyApplied(PaymentDetails),
}

impl ApplyOutcome {
    pub fn details(&self) -> &PaymentDetails {
        match self {
            ApplyOutcome::Applied(details) | ApplyOutcome::AlreadyApplied(details) => details,
        }
    }

    pub fn into_details(self) -> PaymentDetails {
        match self {
            ApplyOutcome::Applied(details) | ApplyOutcome::AlreadyApplied(details) => details,
        }
    }

    pub fn is_already_applied(&self) -> bool {
        matches!(self, ApplyOutcome::AlreadyApplied(_))
    }
}

/// Result of checking a payment against the processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// The processor reached a final status and the matching operation went through the engine.
    Settled {
        operation: OperationType,
        outcome: ApplyOutcome,
    },

    /// The processor has not finished with the charge; nothing changed.
    Pending { status: String },
}

/// Idempotency key used by the payer redirect callback.
pub fn callback_operation_id(reference: &str) -> String {
    format!("verify-{reference}")
}

/// Idempotency key used by processor notifications.
pub fn webhook_operation_id(reference: &str) -> String {
    format!("webhook-{reference}")
}

/// Operation implied by a processor status, if it is final.
pub fn operation_for_status(status: &str) -> Option<OperationType> {
    match status {
        "success" => Some(OperationType::Capture),
        "failed" | "abandoned" | "reversed" => Some(OperationType::Void),
        _ => None,
    }
}

async fn fetch_details(store: &dyn PaymentStore, id: &str) -> Result<PaymentDetails, AppError> {
    store.get(id).await?.ok_or(AppError::PaymentNotFound)
}

/// Create a payment.
///
/// # Process
///
/// 1. Validate the request
/// 2. Reject an id that is already taken (without calling the processor)
/// 3. Authorize with the processor, tagged with idempotency key `op-{id}`
/// 4. Store the payment in `Initiated`
///
/// # Errors
///
/// - `InvalidRequest`: empty id or email, amount zero or negative
/// - `PaymentExists`: id already used
/// - `Bank`: processor call failed
/// - `Store`: storage error
pub async fn create_payment(
    store: &dyn PaymentStore,
    bank: &dyn Bank,
    checkout: &CheckoutSettings,
    request: CreatePaymentRequest,
) -> Result<CreatePaymentResponse, AppError> {
    if request.id.trim().is_empty() {
        return Err(AppError::InvalidRequest("Payment id is required".to_string()));
    }
    if request.amount <= 0 {
        return Err(AppError::InvalidRequest(
            "Amount must be positive".to_string(),
        ));
    }
    if request.email.trim().is_empty() {
        return Err(AppError::InvalidRequest("Email is required".to_string()));
    }

    if store.get(&request.id).await?.is_some() {
        return Err(AppError::PaymentExists);
    }

    let authorization = bank
        .authorize(AuthorizeRequest {
            payment_id: request.id.clone(),
            operation_id: format!("op-{}", request.id),
            amount: request.amount,
            currency: checkout.currency.clone(),
            email: request.email,
            callback_url: checkout.callback_url.clone(),
        })
        .await
        .inspect_err(|e| tracing::warn!(payment_id = %request.id, error = %e, "authorization failed"))?;

    let payment = store
        .create(Payment::new(
            request.id,
            request.amount,
            request.user_id,
            request.order_id,
        ))
        .await
        .map_err(|e| match e {
            StoreError::DuplicatePayment(_) => AppError::PaymentExists,
            other => AppError::Store(other),
        })?;

    tracing::info!(payment_id = %payment.id, amount = payment.amount, "payment created");

    Ok(CreatePaymentResponse {
        authorization,
        payment: PaymentDetails {
            payment,
            operations: Vec::new(),
        },
    })
}

/// Get a payment with its operation history.
pub async fn get_payment(store: &dyn PaymentStore, id: &str) -> Result<PaymentDetails, AppError> {
    fetch_details(store, id).await
}

/// List all payments with their operation history, newest first.
pub async fn list_payments(store: &dyn PaymentStore) -> Result<Vec<PaymentDetails>, AppError> {
    Ok(store.list().await?)
}

/// Apply `operation` to a payment exactly once per `operation_id`.
///
/// # Process
///
/// 1. Lock the payment row
/// 2. If `operation_id` is already recorded for this payment, stop and report `AlreadyApplied`
/// 3. Record the operation (guarded by the uniqueness constraint)
/// 4. Run the state machine on the locked snapshot
/// 5. Call the processor when the operation has a processor side (refund),
///    keyed by `operation_id`, and attach its reference to the record
/// 6. Persist the new state and commit
///
/// Steps 3-6 either all take effect or none do. The processor sees the same
/// key on every retry, so a refund whose commit failed is replayed rather
/// than refused.
///
/// # Errors
///
/// - `InvalidRequest`: empty `operation_id`
/// - `PaymentNotFound`: no such payment
/// - `InvalidTransition`: operation not allowed from the current state
/// - `Bank`: processor call failed
/// - `Store`: storage error
pub async fn apply_operation(
    store: &dyn PaymentStore,
    bank: &dyn Bank,
    payment_id: &str,
    operation_id: &str,
    operation: OperationType,
) -> Result<ApplyOutcome, AppError> {
    if operation_id.trim().is_empty() {
        return Err(AppError::InvalidRequest(
            "operation_id is required".to_string(),
        ));
    }

    let mut tx = store.begin().await?;

    let mut payment = tx
        .lock_payment(payment_id)
        .await?
        .ok_or(AppError::PaymentNotFound)?;

    if let Some(existing) = tx.find_operation(payment_id, operation_id).await? {
        drop(tx);
        tracing::info!(
            payment_id,
            operation_id,
            recorded = %existing.operation_type,
            requested = %operation,
            "operation already applied"
        );
        return Ok(ApplyOutcome::AlreadyApplied(
            fetch_details(store, payment_id).await?,
        ));
    }

    let inserted = tx
        .insert_operation(NewPaymentOperation {
            payment_id: payment.id.clone(),
            operation_id: operation_id.to_string(),
            operation_type: operation,
            amount: payment.amount,
            result: OperationResult::Success,
            bank_reference: None,
        })
        .await;

    let inserted = match inserted {
        Ok(inserted) => inserted,
        Err(StoreError::DuplicateOperation { .. }) => {
            // Lost the race on the uniqueness constraint: the winner's write stands.
            drop(tx);
            tracing::warn!(payment_id, operation_id, "duplicate operation rejected by store");
            return Ok(ApplyOutcome::AlreadyApplied(
                fetch_details(store, payment_id).await?,
            ));
        }
        Err(e) => return Err(e.into()),
    };

    let from = payment.state;
    payment.apply_operation(operation).inspect_err(|e| {
        tracing::info!(payment_id, operation_id, error = %e, "transition rejected");
    })?;

    match operation {
        OperationType::Refund => {
            let refund = bank
                .refund(RefundRequest {
                    reference: payment.id.clone(),
                    amount: payment.amount,
                    operation_id: operation_id.to_string(),
                })
                .await
                .inspect_err(|e| tracing::warn!(payment_id, error = %e, "refund failed"))?;
            tx.record_bank_reference(&inserted, &refund.reference).await?;
        }
        OperationType::Authorize | OperationType::Capture | OperationType::Void => {}
    }

    tx.update_state(&payment).await?;
    tx.commit().await?;

    tracing::info!(
        payment_id,
        operation_id,
        %operation,
        %from,
        to = %payment.state,
        "operation applied"
    );

    Ok(ApplyOutcome::Applied(
        fetch_details(store, payment_id).await?,
    ))
}

/// Bring a payment in line with the processor's view of the charge.
///
/// The processor is asked for the charge status directly; a caller-supplied
/// status is never trusted. A `success` leads to a capture (only when the
/// verified amount matches), `failed`/`abandoned`/`reversed` to a void, and
/// anything else leaves the payment untouched.
///
/// # Errors
///
/// - `PaymentNotFound`: no payment with this reference
/// - `Bank`: verification failed
/// - `AmountMismatch`: processor settled a different amount
/// - Anything `apply_operation` returns
pub async fn reconcile(
    store: &dyn PaymentStore,
    bank: &dyn Bank,
    reference: &str,
    operation_id: &str,
) -> Result<Reconciliation, AppError> {
    let details = fetch_details(store, reference).await?;

    let verified = bank.verify(reference).await?;

    let Some(operation) = operation_for_status(&verified.status) else {
        tracing::info!(reference, status = %verified.status, "charge not final yet");
        return Ok(Reconciliation::Pending {
            status: verified.status,
        });
    };

    if operation == OperationType::Capture && verified.amount != details.payment.amount {
        tracing::warn!(
            reference,
            expected = details.payment.amount,
            verified = verified.amount,
            "processor amount mismatch"
        );
        return Err(AppError::AmountMismatch {
            expected: details.payment.amount,
            verified: verified.amount,
        });
    }

    let outcome = apply_operation(store, bank, reference, operation_id, operation).await?;

    Ok(Reconciliation::Settled { operation, outcome })
}
