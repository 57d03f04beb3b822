/// FedaPay client against a local mock HTTP server
///
/// Run with: cargo test --test fedapay_client

use std::time::Duration;

use elearn_shared::gateway::fedapay::FedaPayClient;
use elearn_shared::gateway::{
    CheckoutRequest, Customer, GatewayError, GatewayStatus, PaymentGateway, ReportedAmount,
};
use elearn_shared::settings::{GatewayEnvironment, PaymentSettings};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const API_KEY: &str = "sk_sandbox_test_key";

fn settings(server: &MockServer) -> PaymentSettings {
    let mut settings = PaymentSettings::new(
        API_KEY,
        "whsec_test",
        GatewayEnvironment::Sandbox,
        "learn.example.bj",
    );
    settings.api_url = server.uri();
    settings.timeout_secs = 1;
    settings
}

fn checkout_request() -> CheckoutRequest {
    CheckoutRequest {
        description: "Inscription : Algorithmique".to_string(),
        amount: 100,
        currency: "XOF".to_string(),
        callback_url: "https://learn.example.bj/student/payment/callback/".to_string(),
        customer: Customer {
            first_name: "Adjoa".to_string(),
            last_name: "Houngbo".to_string(),
            email: "adjoa@example.bj".to_string(),
            phone: Some("97000000".to_string()),
        },
    }
}

#[tokio::test]
async fn test_create_checkout_creates_transaction_then_token() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/transactions"))
        .and(header("authorization", format!("Bearer {}", API_KEY).as_str()))
        .and(body_partial_json(json!({
            "amount": 100,
            "currency": {"iso": "XOF"},
            "customer": {"email": "adjoa@example.bj", "phone_number": {"country": "bj"}}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "v1/transaction": {"id": 104728, "status": "pending", "amount": 100}
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/transactions/104728/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "tok_abc",
            "url": "https://sandbox-process.fedapay.com/tok_abc"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = FedaPayClient::new(&settings(&server)).unwrap();
    let checkout = client.create_checkout(&checkout_request()).await.unwrap();

    assert_eq!(checkout.transaction_id, "104728");
    assert_eq!(checkout.payment_url, "https://sandbox-process.fedapay.com/tok_abc");
    assert_eq!(checkout.status, GatewayStatus::Pending);
}

#[tokio::test]
async fn test_fetch_transaction_reads_status_and_amount() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/transactions/104728"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "v1/transaction": {"id": 104728, "status": "approved", "amount": 100}
        })))
        .mount(&server)
        .await;

    let client = FedaPayClient::new(&settings(&server)).unwrap();
    let tx = client.fetch_transaction("104728").await.unwrap();

    assert_eq!(tx.id, "104728");
    assert_eq!(tx.status, GatewayStatus::Approved);
    assert_eq!(tx.amount, ReportedAmount::Whole(100));
}

#[tokio::test]
async fn test_unknown_transaction_is_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/transactions/999"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = FedaPayClient::new(&settings(&server)).unwrap();
    let err = client.fetch_transaction("999").await.unwrap_err();

    assert!(matches!(err, GatewayError::NotFound(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_server_error_is_retryable_upstream() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/transactions"))
        .respond_with(
            ResponseTemplate::new(503).set_body_json(json!({"message": "Service indisponible"})),
        )
        .mount(&server)
        .await;

    let client = FedaPayClient::new(&settings(&server)).unwrap();
    let err = client.create_checkout(&checkout_request()).await.unwrap_err();

    match &err {
        GatewayError::Upstream { status, message } => {
            assert_eq!(*status, 503);
            assert_eq!(message, "Service indisponible");
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_slow_gateway_times_out() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/transactions/1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"id": 1, "status": "approved"}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let client = FedaPayClient::new(&settings(&server)).unwrap();
    let err = client.fetch_transaction("1").await.unwrap_err();

    assert!(matches!(err, GatewayError::Timeout));
}

#[tokio::test]
async fn test_token_without_url_is_invalid_response() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/transactions"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "v1/transaction": {"id": 7, "status": "pending"}
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/transactions/7/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "x"})))
        .mount(&server)
        .await;

    let client = FedaPayClient::new(&settings(&server)).unwrap();
    let err = client.create_checkout(&checkout_request()).await.unwrap_err();

    assert!(matches!(err, GatewayError::InvalidResponse(_)));
}

#[test]
fn test_empty_api_key_is_rejected() {
    let mut settings = PaymentSettings::new(
        "  ",
        "whsec",
        GatewayEnvironment::Sandbox,
        "learn.example.bj",
    );
    settings.timeout_secs = 5;

    assert!(matches!(
        FedaPayClient::new(&settings),
        Err(GatewayError::Configuration(_))
    ));
}
