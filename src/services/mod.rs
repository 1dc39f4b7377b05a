//! Business logic services.
//!
//! Services contain core business logic separated from HTTP handlers.
//! They talk to storage and the processor only through the `PaymentStore`
//! and `Bank` traits.

pub mod payment_service;
pub mod webhook_service;
