mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{Value, json};

use paygate::{
    middleware::auth::TokenIssuer,
    models::payment::PaymentState,
};

use common::{DEV_PASSWORD, DEV_USER, OTHER_PRIVATE_KEY, TestApp, seed_payment};

fn new_payment(id: &str, amount: i64) -> Value {
    json!({
        "id": id,
        "amount": amount,
        "email": "payer@example.com",
        "order_id": "order-9"
    })
}

#[tokio::test]
async fn health_is_public() {
    let app = TestApp::new();
    let (status, body) = app
        .send(Request::get("/health").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn payment_routes_require_a_valid_token() {
    let app = TestApp::new();

    let (status, body) = app
        .send(
            Request::post("/v1/payments")
                .header("Content-Type", "application/json")
                .body(Body::from(new_payment("p1", 1000).to_string()))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "unauthorized");

    let forged = TokenIssuer::from_rsa_pem(OTHER_PRIVATE_KEY.as_bytes())
        .unwrap()
        .issue("mallory")
        .unwrap()
        .0;
    let (status, _) = app
        .send(
            Request::get("/v1/payments")
                .header("Authorization", format!("Bearer {forged}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert_eq!(app.bank.authorize_calls(), 0);
}

#[tokio::test]
async fn create_get_and_list() {
    let app = TestApp::new();

    let (status, body) = app.post_authed("/v1/payments", new_payment("p1", 1000)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["authorization"]["reference"], "p1");
    assert!(body["authorization"]["authorization_url"].is_string());
    assert_eq!(body["payment"]["state"], "initiated");
    assert_eq!(body["payment"]["user_id"], "tester");
    assert_eq!(body["payment"]["order_id"], "order-9");

    let (status, body) = app.get_authed("/v1/payments/p1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "p1");
    assert_eq!(body["amount"], 1000);
    assert_eq!(body["operations"], json!([]));

    app.post_authed("/v1/payments", new_payment("p2", 2000)).await;
    let (status, body) = app.get_authed("/v1/payments").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (status, body) = app.get_authed("/v1/payments/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "payment_not_found");
}

#[tokio::test]
async fn duplicate_create_conflicts_without_calling_the_bank() {
    let app = TestApp::new();

    app.post_authed("/v1/payments", new_payment("p1", 1000)).await;
    let (status, body) = app.post_authed("/v1/payments", new_payment("p1", 1000)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "payment_exists");
    assert_eq!(app.bank.authorize_calls(), 1);
}

#[tokio::test]
async fn invalid_create_requests_are_rejected() {
    let app = TestApp::new();

    let (status, _) = app.post_authed("/v1/payments", new_payment("p1", 0)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.post_authed("/v1/payments", new_payment("", 100)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(app.bank.authorize_calls(), 0);
}

#[tokio::test]
async fn operations_endpoint_drives_the_lifecycle() {
    let app = TestApp::new();
    app.post_authed("/v1/payments", new_payment("p1", 1000)).await;

    let (status, body) = app
        .post_authed(
            "/v1/payments/p1/operations",
            json!({"operation": "void", "operation_id": "k1"}),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "invalid_transition");

    for (op, key) in [("authorize", "a1"), ("capture", "c1")] {
        let (status, body) = app
            .post_authed(
                "/v1/payments/p1/operations",
                json!({"operation": op, "operation_id": key}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["already_applied"], false);
    }
    assert_eq!(app.state_of("p1").await, PaymentState::Captured);
}

#[tokio::test]
async fn refund_endpoint_is_idempotent() {
    let app = TestApp::new();
    seed_payment(&app.store, &app.bank, "p1", 1500, PaymentState::Captured).await;

    let (status, body) = app
        .post_authed("/v1/payments/p1/refund", json!({"operation_id": "r-1"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["already_applied"], false);
    assert_eq!(body["state"], "refunded");
    assert_eq!(body["operations"][0]["bank_reference"], "rfnd_p1");

    let (status, body) = app
        .post_authed("/v1/payments/p1/refund", json!({"operation_id": "r-1"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["already_applied"], true);
    assert_eq!(body["state"], "refunded");

    assert_eq!(app.bank.refund_calls(), 1);
    assert_eq!(app.operation_count("p1").await, 1);
}

#[tokio::test]
async fn refund_before_capture_is_rejected() {
    let app = TestApp::new();
    seed_payment(&app.store, &app.bank, "p1", 1500, PaymentState::Authorized).await;

    let (status, _) = app
        .post_authed("/v1/payments/p1/refund", json!({"operation_id": "r-1"}))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(app.bank.refund_calls(), 0);
}

#[tokio::test]
async fn callback_captures_and_renders_html() {
    let app = TestApp::new();
    app.post_authed("/v1/payments", new_payment("p1", 1000)).await;
    app.post_authed(
        "/v1/payments/p1/operations",
        json!({"operation": "authorize", "operation_id": "a1"}),
    )
    .await;

    for _ in 0..2 {
        let (status, body) = app
            .send(
                Request::get("/v1/payments/callback/verify?reference=p1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.as_str().unwrap().contains("Payment successful"));
    }

    assert_eq!(app.state_of("p1").await, PaymentState::Captured);
    let (_, body) = app.get_authed("/v1/payments/p1").await;
    let keys: Vec<_> = body["operations"]
        .as_array()
        .unwrap()
        .iter()
        .map(|op| op["operation_id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(keys, vec!["a1", "verify-p1"]);
}

#[tokio::test]
async fn callback_without_reference_is_a_bad_request() {
    let app = TestApp::new();
    let (status, _) = app
        .send(
            Request::get("/v1/payments/callback/verify")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn callback_for_unknown_payment_is_acknowledged() {
    let app = TestApp::new();
    let (status, body) = app
        .send(
            Request::get("/v1/payments/callback/verify?reference=ghost")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_str().unwrap().contains("Payment not found"));
}

#[tokio::test]
async fn development_token_is_accepted_by_payment_routes() {
    let app = TestApp::new();

    let (status, body) = app
        .send(
            Request::post("/v1/users/token")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    json!({"username": DEV_USER, "password": DEV_PASSWORD}).to_string(),
                ))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["token_type"], "Bearer");
    let token = body["access_token"].as_str().unwrap().to_string();

    let (status, _) = app
        .send(
            Request::get("/v1/payments")
                .header("Authorization", format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .send(
            Request::post("/v1/users/token")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    json!({"username": DEV_USER, "password": "wrong"}).to_string(),
                ))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
