use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
};
use serde_json::{Value, json};
use url::Url;

use paygate::bank::{AuthorizeRequest, Bank, BankError, RefundRequest, paystack::PaystackClient};

/// What the mock processor saw.
#[derive(Debug, Default)]
struct Seen {
    authorization: Vec<String>,
    idempotency_keys: Vec<String>,
    bodies: Vec<Value>,
}

type Shared = Arc<Mutex<Seen>>;

fn record(seen: &Shared, headers: &HeaderMap, body: Option<Value>) {
    let mut seen = seen.lock().unwrap();
    if let Some(auth) = headers.get("authorization") {
        seen.authorization.push(auth.to_str().unwrap().to_string());
    }
    if let Some(key) = headers.get("idempotency-key") {
        seen.idempotency_keys.push(key.to_str().unwrap().to_string());
    }
    if let Some(body) = body {
        seen.bodies.push(body);
    }
}

async fn initialize(
    State(seen): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    record(&seen, &headers, Some(body.clone()));
    if body["amount"].as_i64() == Some(13) {
        return (
            StatusCode::OK,
            Json(json!({"status": false, "message": "Duplicate Transaction Reference"})),
        );
    }
    (
        StatusCode::OK,
        Json(json!({
            "status": true,
            "message": "Authorization URL created",
            "data": {
                "authorization_url": "https://checkout.paystack.com/abc",
                "access_code": "abc",
                "reference": body["reference"]
            }
        })),
    )
}

async fn verify(
    State(seen): State<Shared>,
    headers: HeaderMap,
    Path(reference): Path<String>,
) -> (StatusCode, Json<Value>) {
    record(&seen, &headers, None);
    if reference == "missing" {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"status": false, "message": "Transaction reference not found"})),
        );
    }
    (
        StatusCode::OK,
        Json(json!({
            "status": true,
            "message": "Verification successful",
            "data": {
                "status": "success",
                "reference": reference,
                "amount": 5000,
                "currency": "NGN"
            }
        })),
    )
}

async fn refund(
    State(seen): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    record(&seen, &headers, Some(body.clone()));
    (
        StatusCode::OK,
        Json(json!({
            "status": true,
            "message": "Refund has been queued for processing",
            "data": {
                "status": "pending",
                "transaction": { "reference": body["transaction"], "amount": body["amount"] }
            }
        })),
    )
}

async fn mock_processor() -> (PaystackClient, Shared) {
    let seen = Shared::default();
    let app = Router::new()
        .route("/transaction/initialize", post(initialize))
        .route("/transaction/verify/{reference}", get(verify))
        .route("/refund", post(refund))
        .with_state(seen.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = PaystackClient::new(
        "sk_test_123",
        Url::parse(&format!("http://{addr}")).unwrap(),
        Duration::from_secs(5),
    )
    .unwrap();
    (client, seen)
}

fn authorize_request(amount: i64) -> AuthorizeRequest {
    AuthorizeRequest {
        payment_id: "pay_1".to_string(),
        operation_id: "op-pay_1".to_string(),
        amount,
        currency: "NGN".to_string(),
        email: "payer@example.com".to_string(),
        callback_url: "http://localhost:8080/v1/payments/callback/verify".to_string(),
    }
}

#[tokio::test]
async fn authorize_sends_idempotency_key_and_bearer_secret() {
    let (client, seen) = mock_processor().await;

    let response = client.authorize(authorize_request(5000)).await.unwrap();
    assert_eq!(response.reference, "pay_1");
    assert_eq!(response.authorization_url, "https://checkout.paystack.com/abc");

    let seen = seen.lock().unwrap();
    assert_eq!(seen.authorization, vec!["Bearer sk_test_123"]);
    assert_eq!(seen.idempotency_keys, vec!["op-pay_1"]);
    assert_eq!(seen.bodies[0]["amount"], 5000);
    assert_eq!(seen.bodies[0]["currency"], "NGN");
    assert_eq!(seen.bodies[0]["reference"], "pay_1");
    assert_eq!(seen.bodies[0]["email"], "payer@example.com");
}

#[tokio::test]
async fn processor_failure_flag_is_an_error() {
    let (client, _) = mock_processor().await;

    let err = client.authorize(authorize_request(13)).await.unwrap_err();
    assert!(matches!(err, BankError::Processor(msg) if msg == "Duplicate Transaction Reference"));
}

#[tokio::test]
async fn verify_maps_the_charge() {
    let (client, _) = mock_processor().await;

    let verified = client.verify("pay_1").await.unwrap();
    assert_eq!(verified.status, "success");
    assert_eq!(verified.amount, 5000);
    assert_eq!(verified.currency, "NGN");
    assert_eq!(verified.reference, "pay_1");
}

#[tokio::test]
async fn non_success_status_carries_processor_message() {
    let (client, _) = mock_processor().await;

    let err = client.verify("missing").await.unwrap_err();
    assert!(matches!(
        err,
        BankError::Status { status: 404, ref message } if message == "Transaction reference not found"
    ));
}

#[tokio::test]
async fn refund_posts_full_amount_under_the_operation_key() {
    let (client, seen) = mock_processor().await;

    let refunded = client
        .refund(RefundRequest {
            reference: "pay_1".to_string(),
            amount: 5000,
            operation_id: "refund-1".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(refunded.reference, "pay_1");
    assert_eq!(refunded.status, "pending");

    let seen = seen.lock().unwrap();
    assert_eq!(seen.bodies[0], json!({"transaction": "pay_1", "amount": 5000}));
    assert_eq!(seen.idempotency_keys, vec!["refund-1"]);
}

#[tokio::test]
async fn unreachable_processor_is_a_transport_error() {
    let client = PaystackClient::new(
        "sk_test_123",
        Url::parse("http://127.0.0.1:1").unwrap(),
        Duration::from_secs(2),
    )
    .unwrap();

    let err = client.verify("pay_1").await.unwrap_err();
    assert!(matches!(err, BankError::Transport(_)));
}
