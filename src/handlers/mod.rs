//! HTTP request handlers (route handlers).
//!
//! Handlers only extract request data, call a service and shape the
//! response. All business rules live in `services`.

/// Health check
pub mod health;

/// Payment lifecycle endpoints and the payer redirect callback
pub mod payments;

/// Development token issuance
pub mod users;

/// Processor notifications
pub mod webhooks;
