/// Router-level tests that never reach the database
///
/// The state carries a lazy pool pointing at a closed port, so any handler
/// that queries the database before rejecting would surface as a 5xx here.

mod common;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use common::{access_token, request, sign_webhook, TestApp, WEBHOOK_SECRET};
use elearn_shared::gateway::{CALLBACK_PATH, SIGNATURE_HEADER, WEBHOOK_PATH};
use elearn_shared::models::user::Role;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn test_health_reports_degraded_database() {
    let app = TestApp::lazy();

    let (status, body) = app.json(request(Method::GET, "/health", None, None)).await;

    assert_eq!(status, 200);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["database"], "disconnected");
    assert_eq!(body["payment_gateway"], "sandbox");
}

#[tokio::test]
async fn test_protected_route_requires_token() {
    let app = TestApp::lazy();

    let (status, body) = app.json(request(Method::GET, "/v1/dashboard", None, None)).await;
    assert_eq!(status, 401);
    assert_eq!(body["error"], "unauthorized");

    let response = app
        .send(
            Request::builder()
                .uri("/v1/courses")
                .header(header::AUTHORIZATION, "Basic dXNlcjpwYXNz")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_forged_token_is_rejected() {
    let app = TestApp::lazy();

    let (forged, _, _) = elearn_shared::auth::jwt::issue_pair(
        Uuid::new_v4(),
        Role::Manager,
        "some-other-secret-that-is-long-enough-too",
    )
    .unwrap();

    let (status, _) = app
        .json(request(Method::GET, "/v1/manager/users", Some(&forged), None))
        .await;
    assert_eq!(status, 401);
}

#[tokio::test]
async fn test_refresh_token_is_not_an_access_token() {
    let app = TestApp::lazy();

    let (_, refresh, _) =
        elearn_shared::auth::jwt::issue_pair(Uuid::new_v4(), Role::Student, common::JWT_SECRET)
            .unwrap();

    let (status, _) = app
        .json(request(Method::GET, "/v1/enrollments", Some(&refresh), None))
        .await;
    assert_eq!(status, 401);
}

#[tokio::test]
async fn test_manager_routes_reject_other_roles() {
    let app = TestApp::lazy();

    for role in [Role::Student, Role::Instructor] {
        let token = access_token(Uuid::new_v4(), role);

        let (status, _) = app
            .json(request(Method::GET, "/v1/manager/users", Some(&token), None))
            .await;
        assert_eq!(status, 403, "{} must not list users", role);

        let (status, _) = app
            .json(request(Method::GET, "/v1/manager/analytics", Some(&token), None))
            .await;
        assert_eq!(status, 403, "{} must not see analytics", role);

        let (status, _) = app
            .json(request(Method::GET, "/v1/manager/feedback", Some(&token), None))
            .await;
        assert_eq!(status, 403, "{} must not list feedback", role);

        let uri = format!("/v1/manager/courses/{}/instructor", Uuid::new_v4());
        let body = json!({ "instructor_id": Uuid::new_v4() });
        let (status, _) = app
            .json(request(Method::PUT, &uri, Some(&token), Some(body)))
            .await;
        assert_eq!(status, 403, "{} must not reassign courses", role);
    }
}

#[tokio::test]
async fn test_feedback_rating_checked_before_enrollment() {
    let app = TestApp::lazy();
    let token = access_token(Uuid::new_v4(), Role::Student);

    let uri = format!("/v1/courses/{}/feedback", Uuid::new_v4());
    let (status, body) = app
        .json(request(
            Method::POST,
            &uri,
            Some(&token),
            Some(json!({ "rating": 9, "comment": "Super" })),
        ))
        .await;

    assert_eq!(status, 422);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn test_only_students_enroll() {
    let app = TestApp::lazy();
    let token = access_token(Uuid::new_v4(), Role::Instructor);

    let uri = format!("/v1/courses/{}/enroll", Uuid::new_v4());
    let (status, _) = app.json(request(Method::POST, &uri, Some(&token), None)).await;

    assert_eq!(status, 403);
}

#[tokio::test]
async fn test_webhook_without_signature_is_rejected() {
    let app = TestApp::lazy();

    let (status, body) = app
        .json(request(
            Method::POST,
            WEBHOOK_PATH,
            None,
            Some(json!({
                "name": "transaction.approved",
                "entity": { "id": 1, "status": "approved", "amount": 5000 }
            })),
        ))
        .await;

    assert_eq!(status, 400);
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn test_webhook_with_wrong_secret_is_rejected() {
    let app = TestApp::lazy();
    let payload = br#"{"name":"transaction.approved","entity":{"id":7,"status":"approved"}}"#;

    let response = app
        .send(
            Request::builder()
                .method(Method::POST)
                .uri(WEBHOOK_PATH)
                .header(SIGNATURE_HEADER, sign_webhook(payload, "not-the-secret"))
                .body(Body::from(&payload[..]))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Same signature over a different body
    let signature = sign_webhook(payload, WEBHOOK_SECRET);
    let tampered = br#"{"name":"transaction.approved","entity":{"id":8,"status":"approved"}}"#;
    let response = app
        .send(
            Request::builder()
                .method(Method::POST)
                .uri(WEBHOOK_PATH)
                .header(SIGNATURE_HEADER, signature)
                .body(Body::from(&tampered[..]))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_signed_webhook_without_transaction_is_acknowledged() {
    let app = TestApp::lazy();
    let payload = br#"{"name":"customer.created","entity":{"email":"a@b.bj"}}"#;

    let (status, body) = app
        .json(
            Request::builder()
                .method(Method::POST)
                .uri(WEBHOOK_PATH)
                .header(SIGNATURE_HEADER, sign_webhook(payload, WEBHOOK_SECRET))
                .body(Body::from(&payload[..]))
                .unwrap(),
        )
        .await;

    assert_eq!(status, 200);
    assert_eq!(body["outcome"], "ignored");
}

#[tokio::test]
async fn test_callback_without_transaction_id() {
    let app = TestApp::lazy();

    let uri = format!("{}?status=approved", CALLBACK_PATH);
    let (status, _) = app.json(request(Method::GET, &uri, None, None)).await;

    assert_eq!(status, 422);
}

#[tokio::test]
async fn test_register_validates_before_touching_the_database() {
    let app = TestApp::lazy();

    let (status, body) = app
        .json(request(
            Method::POST,
            "/v1/auth/register",
            None,
            Some(json!({
                "email": "not-an-email",
                "password": "short",
                "first_name": "Afi",
                "last_name": "Dossou"
            })),
        ))
        .await;
    assert_eq!(status, 422);
    assert_eq!(body["error"], "validation_error");

    let (status, body) = app
        .json(request(
            Method::POST,
            "/v1/auth/register",
            None,
            Some(json!({
                "email": "afi@example.bj",
                "password": "Cotonou2026",
                "first_name": "Afi",
                "last_name": "Dossou",
                "role": "manager"
            })),
        ))
        .await;
    assert_eq!(status, 422);
    assert_eq!(body["details"][0]["field"], "role");
}

#[tokio::test]
async fn test_malformed_verification_code() {
    let app = TestApp::lazy();

    let uri = format!("/v1/certificates/verify/{}", "X".repeat(80));
    let (status, _) = app.json(request(Method::GET, &uri, None, None)).await;

    assert_eq!(status, 422);
}

#[tokio::test]
async fn test_security_headers_on_every_response() {
    let app = TestApp::lazy();

    let response = app.send(request(Method::GET, "/v1/dashboard", None, None)).await;

    let headers = response.headers();
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert!(headers.contains_key(header::CACHE_CONTROL));
    assert!(!headers.contains_key(header::STRICT_TRANSPORT_SECURITY));
}
