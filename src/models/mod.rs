//! Data models representing domain entities and API bodies.

/// Payment, operation ledger and lifecycle state machine
pub mod payment;
/// Inbound processor notifications
pub mod webhook;
