//! Router assembly and shared handler state.

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::{
    bank::Bank,
    handlers,
    middleware::auth::{self, JwtVerifier, TokenIssuer},
    services::{payment_service::CheckoutSettings, webhook_service::WebhookVerifier},
    store::PaymentStore,
};

/// State shared by every handler.
///
/// Everything in here is immutable after startup; cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PaymentStore>,
    pub bank: Arc<dyn Bank>,
    pub jwt: Arc<JwtVerifier>,
    pub webhook: Arc<WebhookVerifier>,
    pub checkout: Arc<CheckoutSettings>,

    /// Present only when a development signing key is configured.
    pub issuer: Option<Arc<TokenIssuer>>,

    /// Username and password accepted by the development token endpoint.
    pub dev_credentials: Option<(String, String)>,
}

/// Build the HTTP router.
///
/// # Routes
///
/// Public: `/health`, the redirect callback, the processor webhook and, when
/// a signing key is configured, `/v1/users/token`.
///
/// Bearer-protected: everything else under `/v1/payments`.
pub fn router(state: AppState) -> Router {
    let authenticated_routes = Router::new()
        .route(
            "/v1/payments",
            post(handlers::payments::create_payment).get(handlers::payments::list_payments),
        )
        .route("/v1/payments/{id}", get(handlers::payments::get_payment))
        .route(
            "/v1/payments/{id}/refund",
            post(handlers::payments::refund_payment),
        )
        .route(
            "/v1/payments/{id}/operations",
            post(handlers::payments::apply_operation),
        )
        // Apply authentication middleware to all routes in this group
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    let mut public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route(
            "/v1/payments/callback/verify",
            get(handlers::payments::verify_callback),
        )
        .route(
            "/v1/payments/webhooks/paystack",
            post(handlers::webhooks::paystack_webhook),
        );

    if state.issuer.is_some() {
        public_routes = public_routes.route("/v1/users/token", post(handlers::users::issue_token));
    }

    Router::new()
        .merge(public_routes)
        .merge(authenticated_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
