//! Payment gateway backend.
//!
//! Tracks each payment through `initiated → authorized → captured →
//! refunded` (or `voided`), coordinates every step with an external
//! processor, and applies externally triggered changes (client calls, payer
//! redirects, processor webhooks) at most once per idempotency key.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx, or an in-memory store
//! - **Processor**: Paystack REST API, or a local simulator
//! - **Authentication**: RS256 bearer tokens; HMAC-SHA512 for webhooks

pub mod app;
pub mod bank;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod store;
