#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use serde_json::Value;
use tower::ServiceExt;

use paygate::{
    app::{self, AppState},
    bank::simulator::SimulatedBank,
    middleware::auth::{JwtVerifier, TokenIssuer},
    models::payment::{Payment, PaymentState},
    services::{payment_service::CheckoutSettings, webhook_service::WebhookVerifier},
    store::{PaymentStore, in_memory::InMemoryPaymentStore},
};

pub const PRIVATE_KEY: &str = include_str!("../fixtures/private.pem");
pub const PUBLIC_KEY: &str = include_str!("../fixtures/public.pem");
pub const OTHER_PRIVATE_KEY: &str = include_str!("../fixtures/other_private.pem");

pub const WEBHOOK_SECRET: &str = "sk_test_webhook_secret";
pub const DEV_USER: &str = "admin";
pub const DEV_PASSWORD: &str = "password";

/// Router wired to an in-memory store and the simulated bank.
pub struct TestApp {
    pub store: InMemoryPaymentStore,
    pub bank: SimulatedBank,
    pub webhook: WebhookVerifier,
    pub issuer: TokenIssuer,
    pub router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_bank(SimulatedBank::default())
    }

    pub fn with_bank(bank: SimulatedBank) -> Self {
        let store = InMemoryPaymentStore::new();
        let webhook = WebhookVerifier::new(Some(WEBHOOK_SECRET.to_string()));
        let issuer = TokenIssuer::from_rsa_pem(PRIVATE_KEY.as_bytes()).unwrap();

        let state = AppState {
            store: Arc::new(store.clone()),
            bank: Arc::new(bank.clone()),
            jwt: Arc::new(JwtVerifier::from_rsa_pem(PUBLIC_KEY.as_bytes()).unwrap()),
            webhook: Arc::new(webhook.clone()),
            checkout: Arc::new(CheckoutSettings {
                currency: "NGN".to_string(),
                callback_url: "http://localhost:8080/v1/payments/callback/verify".to_string(),
            }),
            issuer: Some(Arc::new(issuer.clone())),
            dev_credentials: Some((DEV_USER.to_string(), DEV_PASSWORD.to_string())),
        };

        Self {
            store,
            bank,
            webhook,
            issuer,
            router: app::router(state),
        }
    }

    pub fn token(&self) -> String {
        self.issuer.issue("tester").unwrap().0
    }

    /// Send a request through the router and decode the body as JSON (or a JSON string).
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        send(&self.router, request).await
    }

    pub async fn get_authed(&self, uri: &str) -> (StatusCode, Value) {
        self.send(
            Request::get(uri)
                .header("Authorization", format!("Bearer {}", self.token()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn post_authed(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(
            Request::post(uri)
                .header("Authorization", format!("Bearer {}", self.token()))
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn post_webhook(&self, body: &str, signature: Option<&str>) -> (StatusCode, Value) {
        let mut request = Request::post("/v1/payments/webhooks/paystack")
            .header("Content-Type", "application/json");
        if let Some(signature) = signature {
            request = request.header("x-paystack-signature", signature);
        }
        self.send(request.body(Body::from(body.to_string())).unwrap())
            .await
    }

    pub fn sign(&self, body: &str) -> String {
        self.webhook.sign(body.as_bytes()).unwrap()
    }

    pub async fn state_of(&self, id: &str) -> PaymentState {
        self.store.get(id).await.unwrap().unwrap().payment.state
    }

    pub async fn operation_count(&self, id: &str) -> usize {
        self.store.get(id).await.unwrap().unwrap().operations.len()
    }
}

pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    (status, body)
}

/// Insert a payment directly in `state`, and register the charge with the bank.
pub async fn seed_payment(
    store: &InMemoryPaymentStore,
    bank: &SimulatedBank,
    id: &str,
    amount: i64,
    state: PaymentState,
) {
    let mut payment = Payment::new(
        id.to_string(),
        amount,
        "user-1".to_string(),
        "order-1".to_string(),
    );
    payment.state = state;
    store.create(payment).await.unwrap();
    bank.seed_charge(id, amount).await;
}

pub fn charge_event(event: &str, reference: &str) -> String {
    serde_json::json!({
        "event": event,
        "data": { "reference": reference, "status": "success", "amount": 0 }
    })
    .to_string()
}
