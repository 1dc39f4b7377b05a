//! HTTP middleware components.
//!
//! Middleware run before route handlers and can short-circuit a request
//! (reject unauthorized callers) before any business logic runs.

/// RS256 bearer authentication middleware
pub mod auth;
