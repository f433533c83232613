
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use telegram_gateway::api;
use telegram_gateway::HandshakeStatus;
use test_utils::{TestGateway, CODE, PASSWORD, PHONE};
use tower::ServiceExt;

fn app(gateway: &TestGateway) -> Router {
    api::router(gateway.state.clone())
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn authed(method: &str, uri: &str, session: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-phone", PHONE)
        .header("x-session-data", session);
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request")
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let body = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes()
        .to_vec();
    (status, body)
}

async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, body) = send(app, request).await;
    let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, value)
}

/// Log in over HTTP and return the base64 session
async fn http_login(gateway: &TestGateway, app: &Router) -> String {
    let (status, body) = send_json(app, post_json("/auth/request-code", json!({ "phone": PHONE }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "code_sent");

    gateway
        .wait_for_status(PHONE, |s| *s == HandshakeStatus::AwaitingCode)
        .await;
    let (status, body) = send_json(
        app,
        post_json("/auth/login", json!({ "phone": PHONE, "code": CODE })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["status"], "success");
    assert_eq!(body["phone"], PHONE);
    body["session_data"].as_str().expect("session_data").to_string()
}

#[tokio::test]
async fn test_login_and_browse() {
    let gateway = TestGateway::new().await;
    gateway.add_default_account().await;
    let friend = gateway.platform.add_contact(1001, "Olena", "Koval", None).await;
    let incoming = gateway.platform.add_message(friend, "hello", false).await;
    let app = app(&gateway);

    let session = http_login(&gateway, &app).await;
    assert!(STANDARD.decode(&session).is_ok());

    let (status, body) = send_json(&app, authed("GET", "/api/chats", &session, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["chats"][0]["name"], "Olena Koval");
    assert_eq!(body["chats"][0]["type"], "user");

    let (status, body) = send_json(
        &app,
        authed("GET", "/api/messages/1001?limit=10", &session, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["chat_id"], "1001");
    assert_eq!(body["messages"][0]["text"], "hello");

    let (status, body) = send_json(
        &app,
        authed(
            "POST",
            "/api/send",
            &session,
            Some(json!({ "chat_id": "1001", "text": "hi back" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "sent");
    assert!(body["message_id"].as_i64().expect("message id") > incoming as i64);

    let (status, body) = send_json(
        &app,
        authed(
            "POST",
            "/api/mark-read",
            &session,
            Some(json!({ "chat_id": "1001", "message_ids": [incoming] })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "marked_read");
    assert_eq!(gateway.platform.unread_count(friend).await, Some(0));
}

#[tokio::test]
async fn test_password_login_over_http() {
    let gateway = TestGateway::new().await;
    gateway.add_password_account().await;
    let app = app(&gateway);

    let (status, _) = send_json(&app, post_json("/auth/request-code", json!({ "phone": PHONE }))).await;
    assert_eq!(status, StatusCode::OK);
    gateway
        .wait_for_status(PHONE, |s| *s == HandshakeStatus::AwaitingCode)
        .await;

    let (status, body) = send_json(
        &app,
        post_json("/auth/login", json!({ "phone": PHONE, "code": CODE })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "password_required");
    assert_eq!(body["needs_password"], true);

    let (status, body) = send_json(
        &app,
        post_json("/auth/password", json!({ "phone": PHONE, "password": PASSWORD })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["status"], "success");
    assert!(!body["session_data"].as_str().unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_auth_errors() {
    let gateway = TestGateway::new().await;
    gateway.add_default_account().await;
    let app = app(&gateway);

    let (status, body) = send_json(
        &app,
        post_json("/auth/login", json!({ "phone": PHONE, "code": CODE })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid code or no pending auth");

    let (status, body) = send_json(
        &app,
        post_json("/auth/password", json!({ "phone": PHONE, "password": PASSWORD })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "No pending password request");

    let (status, body) = send_json(&app, post_json("/auth/request-code", json!({ "nope": 1 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid request");

    send_json(&app, post_json("/auth/request-code", json!({ "phone": PHONE }))).await;
    gateway
        .wait_for_status(PHONE, |s| *s == HandshakeStatus::AwaitingCode)
        .await;
    let (status, body) = send_json(
        &app,
        post_json("/auth/login", json!({ "phone": PHONE, "code": "00000" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].as_str().unwrap_or_default().contains("PHONE_CODE_INVALID"));
}

#[tokio::test]
async fn test_api_requires_session_headers() {
    let gateway = TestGateway::new().await;
    let app = app(&gateway);

    let request = Request::builder()
        .uri("/api/chats")
        .body(Body::empty())
        .expect("request");
    let (status, body) = send_json(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Missing authentication headers");

    let (status, _) = send_json(&app, authed("GET", "/api/chats", "@@not-base64@@", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let forged = STANDARD.encode(br#"{"dc_id":2,"auth_key":"ff","phone":"+15550100"}"#);
    let (status, _) = send_json(&app, authed("GET", "/api/chats", &forged, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_bad_chat_ids_are_rejected() {
    let gateway = TestGateway::new().await;
    gateway.add_default_account().await;
    let app = app(&gateway);
    let session = http_login(&gateway, &app).await;

    let (status, body) = send_json(&app, authed("GET", "/api/messages/abc", &session, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid chat_id");

    let (status, body) = send_json(
        &app,
        authed(
            "POST",
            "/api/mark-read",
            &session,
            Some(json!({ "chat_id": "1001", "message_ids": [] })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No message IDs provided");
}

#[tokio::test]
async fn test_poll_endpoint() {
    let gateway = TestGateway::new().await;
    gateway.add_default_account().await;
    let friend = gateway.platform.add_contact(1001, "Olena", "Koval", None).await;
    let last = gateway.platform.add_message(friend, "seen", false).await;
    let app = app(&gateway);
    let session = http_login(&gateway, &app).await;

    let uri = format!("/api/poll/1001?after_message_id={}&timeout=1", last);
    let (status, body) = send_json(&app, authed("GET", &uri, &session, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["has_new"], false);
    assert_eq!(body["messages"], json!([]));

    let platform = gateway.platform.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        platform.push_message(friend, "fresh").await;
    });
    let uri = format!("/api/poll/1001?after_message_id={}&timeout=5", last);
    let (status, body) = send_json(&app, authed("GET", &uri, &session, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["has_new"], true);
    assert_eq!(body["messages"][0]["text"], "fresh");

    let (status, _) = send_json(
        &app,
        authed("GET", "/api/poll/1001?after_message_id=x", &session, None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_photo_with_query_token() {
    let gateway = TestGateway::new().await;
    gateway.add_default_account().await;
    let friend = gateway.platform.add_contact(1001, "Olena", "Koval", None).await;
    let photo = gateway
        .platform
        .add_photo(friend, "look", vec![0xFF, 0xD8, 0xFF, 0xE0])
        .await;
    let app = app(&gateway);
    let session = http_login(&gateway, &app).await;

    let token = STANDARD.encode(format!("{}:{}", PHONE, session));
    let request = Request::builder()
        .uri(format!("/api/photo/1001/{}?token={}", photo, urlencode(&token)))
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").and_then(|v| v.to_str().ok()),
        Some("image/jpeg")
    );
    let bytes = response.into_body().collect().await.expect("body").to_bytes();
    assert_eq!(bytes.as_ref(), &[0xFF, 0xD8, 0xFF, 0xE0]);

    let request = Request::builder()
        .uri(format!("/api/photo/1001/{}", photo))
        .body(Body::empty())
        .expect("request");
    let (status, body) = send_json(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Missing authentication");

    let (status, _) = send_json(&app, authed("GET", "/api/photo/1001/99999", &session, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cors_preflight_allows_session_headers() {
    let gateway = TestGateway::new().await;
    let app = app(&gateway);

    let request = Request::builder()
        .method("OPTIONS")
        .uri("/api/chats")
        .header("origin", "http://phone.local")
        .header("access-control-request-method", "GET")
        .header("access-control-request-headers", "x-phone,x-session-data")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert!(response.status().is_success());
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}

/// Percent-encode the base64 characters that are not query-safe
fn urlencode(value: &str) -> String {
    value
        .replace('+', "%2B")
        .replace('/', "%2F")
        .replace('=', "%3D")
}
