//! Local stand-in for the payment processor.
//!
//! Behaves deterministically apart from two injected knobs: a probability
//! that any call fails with `BankError::Unavailable`, and a fixed delay
//! before every answer. Authorized references and their amounts are kept in
//! memory so that `verify` and `refund` can answer consistently. A refund
//! retried under the key that created it gets the original answer back.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    AuthorizeRequest, AuthorizeResponse, Bank, BankError, RefundRequest, RefundResponse,
    VerifyResponse,
};

#[derive(Debug, Clone)]
struct Charge {
    amount: i64,
    currency: String,
    /// Idempotency key and answer of the refund that reversed this charge.
    refund: Option<(String, RefundResponse)>,
}

#[derive(Debug, Default)]
struct CallCounts {
    authorize: AtomicUsize,
    verify: AtomicUsize,
    refund: AtomicUsize,
    refunds_processed: AtomicUsize,
}

/// In-process processor simulator.
#[derive(Debug, Clone)]
pub struct SimulatedBank {
    failure_rate: f64,
    delay: Duration,
    verify_status: Arc<RwLock<String>>,
    charges: Arc<RwLock<HashMap<String, Charge>>>,
    calls: Arc<CallCounts>,
}

impl Default for SimulatedBank {
    fn default() -> Self {
        Self::new(0.0, Duration::ZERO)
    }
}

impl SimulatedBank {
    /// `failure_rate` is clamped to `[0, 1]`.
    pub fn new(failure_rate: f64, delay: Duration) -> Self {
        Self {
            failure_rate: failure_rate.clamp(0.0, 1.0),
            delay,
            verify_status: Arc::new(RwLock::new("success".to_string())),
            charges: Arc::new(RwLock::new(HashMap::new())),
            calls: Arc::new(CallCounts::default()),
        }
    }

    /// Status reported by subsequent `verify` calls (default `success`).
    pub async fn set_verify_status(&self, status: impl Into<String>) {
        *self.verify_status.write().await = status.into();
    }

    /// Register a charge as if it had been authorized out of band.
    pub async fn seed_charge(&self, reference: impl Into<String>, amount: i64) {
        self.charges.write().await.insert(
            reference.into(),
            Charge {
                amount,
                currency: "NGN".to_string(),
                refund: None,
            },
        );
    }

    pub fn authorize_calls(&self) -> usize {
        self.calls.authorize.load(Ordering::SeqCst)
    }

    pub fn verify_calls(&self) -> usize {
        self.calls.verify.load(Ordering::SeqCst)
    }

    pub fn refund_calls(&self) -> usize {
        self.calls.refund.load(Ordering::SeqCst)
    }

    /// Refunds that actually moved money, replays excluded.
    pub fn refunds_processed(&self) -> usize {
        self.calls.refunds_processed.load(Ordering::SeqCst)
    }

    async fn simulate(&self) -> Result<(), BankError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if self.failure_rate > 0.0 && rand::random::<f64>() < self.failure_rate {
            return Err(BankError::Unavailable);
        }
        Ok(())
    }
}

#[async_trait]
impl Bank for SimulatedBank {
    async fn authorize(&self, request: AuthorizeRequest) -> Result<AuthorizeResponse, BankError> {
        self.calls.authorize.fetch_add(1, Ordering::SeqCst);
        self.simulate().await?;

        if request.amount <= 0 {
            return Err(BankError::Processor("Invalid amount".to_string()));
        }

        let mut charges = self.charges.write().await;
        // Same reference twice is accepted only as a retry of the same charge.
        if let Some(existing) = charges.get(&request.payment_id)
            && existing.amount != request.amount
        {
            return Err(BankError::Processor("Duplicate Transaction Reference".to_string()));
        }
        charges
            .entry(request.payment_id.clone())
            .or_insert_with(|| Charge {
                amount: request.amount,
                currency: request.currency.clone(),
                refund: None,
            });

        Ok(AuthorizeResponse {
            authorization_url: format!("https://checkout.simulator.local/{}", request.payment_id),
            reference: request.payment_id,
        })
    }

    async fn verify(&self, reference: &str) -> Result<VerifyResponse, BankError> {
        self.calls.verify.fetch_add(1, Ordering::SeqCst);
        self.simulate().await?;

        let charge = self
            .charges
            .read()
            .await
            .get(reference)
            .cloned()
            .ok_or_else(|| BankError::Status {
                status: 404,
                message: "Transaction reference not found".to_string(),
            })?;

        let status = if charge.refund.is_some() {
            "reversed".to_string()
        } else {
            self.verify_status.read().await.clone()
        };

        Ok(VerifyResponse {
            reference: reference.to_string(),
            status,
            amount: charge.amount,
            currency: charge.currency,
        })
    }

    async fn refund(&self, request: RefundRequest) -> Result<RefundResponse, BankError> {
        self.calls.refund.fetch_add(1, Ordering::SeqCst);
        self.simulate().await?;

        let mut charges = self.charges.write().await;
        let charge = charges
            .get_mut(&request.reference)
            .ok_or_else(|| BankError::Status {
                status: 404,
                message: "Transaction reference not found".to_string(),
            })?;

        if let Some((key, response)) = &charge.refund {
            if *key == request.operation_id {
                return Ok(response.clone());
            }
            return Err(BankError::Processor(
                "Transaction has been fully reversed".to_string(),
            ));
        }
        if request.amount != charge.amount {
            return Err(BankError::Processor(
                "Refund amount must equal the transaction amount".to_string(),
            ));
        }

        let response = RefundResponse {
            reference: format!("rfnd_{}", request.reference),
            status: "processed".to_string(),
        };
        charge.refund = Some((request.operation_id, response.clone()));
        self.calls.refunds_processed.fetch_add(1, Ordering::SeqCst);
        Ok(response)
    }
}
