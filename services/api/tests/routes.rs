//! Router-level tests against the in-memory store.

use api_lib::adapters::{CannedReplyAdapter, EmulatorTokenVerifier, InMemoryDb, TracingSmsSender};
use api_lib::config::{Config, ProjectConfig};
use api_lib::web::{api_router, AppState};
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use exit_core::ports::DatabaseService;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn test_config() -> Config {
    Config {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        database_url: None,
        log_level: tracing::Level::INFO,
        cors_origin: "http://localhost:3000".to_string(),
        project: ProjectConfig {
            project_id: "ex-it-test".to_string(),
            google_client_id: None,
            apple_client_id: None,
        },
        use_auth_emulator: true,
        gemini_api_key: None,
        gemini_base_url: "http://localhost".to_string(),
        chat_model: "test".to_string(),
        sms_webhook_url: None,
        session_ttl_days: 30,
    }
}

fn app() -> (Router, Arc<InMemoryDb>) {
    let db = Arc::new(InMemoryDb::new());
    let state = Arc::new(AppState {
        db: db.clone(),
        config: Arc::new(test_config()),
        chat_adapter: Arc::new(CannedReplyAdapter::new()),
        sms_sender: Some(Arc::new(TracingSmsSender)),
        federated_verifier: Arc::new(EmulatorTokenVerifier),
    });
    (api_router(state), db)
}

async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

fn post_json(uri: &str, body: Value, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// The `session=...` pair from a `Set-Cookie` header.
fn session_of(response: &Response) -> String {
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

async fn sign_up(app: &Router, email: &str) -> String {
    let response = send(
        app,
        post_json(
            "/auth/signup",
            json!({"email": email, "password": "hunter22", "display_name": "Sam"}),
            None,
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    session_of(&response)
}

fn emulator_token(claims: Value) -> String {
    format!(
        "{}.{}.",
        URL_SAFE_NO_PAD.encode(r#"{"alg":"none"}"#),
        URL_SAFE_NO_PAD.encode(claims.to_string())
    )
}

//=========================================================================================
// Quotes
//=========================================================================================

#[tokio::test]
async fn anonymous_quote_submission_is_rejected() {
    let (app, db) = app();
    let response = send(
        &app,
        post_json("/quotes", json!({"text": "You are stronger than you think."}), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(db.top_quotes(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn quote_length_is_validated() {
    let (app, db) = app();
    let cookie = sign_up(&app, "sam@example.com").await;

    let short = send(&app, post_json("/quotes", json!({"text": "  too short "}), Some(&cookie))).await;
    assert_eq!(short.status(), StatusCode::BAD_REQUEST);

    let long = send(&app, post_json("/quotes", json!({"text": "a".repeat(201)}), Some(&cookie))).await;
    assert_eq!(long.status(), StatusCode::BAD_REQUEST);
    assert!(db.top_quotes(10).await.unwrap().is_empty());

    let ok = send(
        &app,
        post_json("/quotes", json!({"text": "  One day at a time.  "}), Some(&cookie)),
    )
    .await;
    assert_eq!(ok.status(), StatusCode::CREATED);
    let quote = json_body(ok).await;
    assert_eq!(quote["text"], "One day at a time.");
    assert_eq!(quote["votes"], 0);
    assert_eq!(quote["username"], "Sam");
}

#[tokio::test]
async fn second_vote_by_same_user_conflicts() {
    let (app, _db) = app();
    let cookie = sign_up(&app, "sam@example.com").await;
    let created = send(
        &app,
        post_json("/quotes", json!({"text": "Healing is not linear."}), Some(&cookie)),
    )
    .await;
    let id = json_body(created).await["id"].as_str().unwrap().to_string();
    let uri = format!("/quotes/{}/vote", id);

    let first = send(&app, post_json(&uri, json!({}), Some(&cookie))).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(json_body(first).await["votes"], 1);

    let second = send(&app, post_json(&uri, json!({}), Some(&cookie))).await;
    assert_eq!(second.status(), StatusCode::CONFLICT);

    let top = json_body(send(&app, get("/quotes?limit=5", None)).await).await;
    assert_eq!(top[0]["votes"], 1);
}

#[tokio::test]
async fn vote_for_unknown_quote_is_not_found() {
    let (app, _db) = app();
    let cookie = sign_up(&app, "sam@example.com").await;
    let uri = format!("/quotes/{}/vote", uuid::Uuid::new_v4());
    let response = send(&app, post_json(&uri, json!({}), Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

//=========================================================================================
// Accounts
//=========================================================================================

#[tokio::test]
async fn signup_login_me_logout() {
    let (app, _db) = app();
    sign_up(&app, "Sam@Example.com").await;

    let duplicate = send(
        &app,
        post_json(
            "/auth/signup",
            json!({"email": "sam@example.com", "password": "another1"}),
            None,
        ),
    )
    .await;
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);

    let wrong = send(
        &app,
        post_json(
            "/auth/login",
            json!({"email": "sam@example.com", "password": "nope-nope"}),
            None,
        ),
    )
    .await;
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    let login = send(
        &app,
        post_json(
            "/auth/login",
            json!({"email": "sam@example.com", "password": "hunter22"}),
            None,
        ),
    )
    .await;
    assert_eq!(login.status(), StatusCode::OK);
    let cookie = session_of(&login);

    let me = json_body(send(&app, get("/auth/me", Some(&cookie))).await).await;
    assert_eq!(me["email"], "sam@example.com");
    assert_eq!(me["providers"], json!(["password"]));

    let logout = send(&app, post_json("/auth/logout", json!({}), Some(&cookie))).await;
    assert_eq!(logout.status(), StatusCode::OK);
    let after = send(&app, get("/auth/me", Some(&cookie))).await;
    assert_eq!(after.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn phone_numbers_must_be_e164() {
    let (app, _db) = app();
    let response = send(
        &app,
        post_json("/auth/phone/start", json!({"phone_number": "555-5555"}), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let started = send(
        &app,
        post_json("/auth/phone/start", json!({"phone_number": "+15555555555"}), None),
    )
    .await;
    assert_eq!(started.status(), StatusCode::OK);
    let verification_id = json_body(started).await["verification_id"].clone();

    let wrong = send(
        &app,
        post_json(
            "/auth/phone/verify",
            json!({"verification_id": verification_id, "code": "not-it"}),
            None,
        ),
    )
    .await;
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn federated_email_collision_then_link() {
    let (app, _db) = app();
    let password_cookie = sign_up(&app, "sam@example.com").await;
    let token = emulator_token(json!({
        "sub": "g-42",
        "email": "sam@example.com",
        "email_verified": true,
        "name": "Sam G"
    }));

    let collision = send(
        &app,
        post_json(
            "/auth/federated",
            json!({"provider": "google", "id_token": token}),
            None,
        ),
    )
    .await;
    assert_eq!(collision.status(), StatusCode::CONFLICT);
    let body = json_body(collision).await;
    assert_eq!(body["code"], "account-exists-with-different-credential");
    assert_eq!(body["email"], "sam@example.com");
    assert_eq!(body["existing_providers"], json!(["password"]));

    let linked = send(
        &app,
        post_json(
            "/auth/link",
            json!({"pending_credential_id": body["pending_credential_id"]}),
            Some(&password_cookie),
        ),
    )
    .await;
    assert_eq!(linked.status(), StatusCode::OK);
    assert_eq!(
        json_body(linked).await["providers"],
        json!(["google.com", "password"])
    );

    // The Google credential now signs straight in.
    let again = send(
        &app,
        post_json(
            "/auth/federated",
            json!({"provider": "google", "id_token": token}),
            None,
        ),
    )
    .await;
    assert_eq!(again.status(), StatusCode::OK);
    assert_eq!(json_body(again).await["email"], "sam@example.com");
}

#[tokio::test]
async fn federated_sign_in_creates_new_account() {
    let (app, _db) = app();
    let token = emulator_token(json!({"sub": "a-7", "email": "new@example.com", "email_verified": "true"}));
    let response = send(
        &app,
        post_json(
            "/auth/federated",
            json!({"provider": "apple", "id_token": token}),
            None,
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let cookie = session_of(&response);

    let me = json_body(send(&app, get("/auth/me", Some(&cookie))).await).await;
    assert_eq!(me["display_name"], "new@example.com");
    assert_eq!(me["providers"], json!(["apple.com"]));
}

#[tokio::test]
async fn unverified_federated_email_claims_nothing() {
    let (app, _db) = app();
    sign_up(&app, "victim@example.com").await;

    let token = emulator_token(json!({
        "sub": "a-666",
        "email": "victim@example.com",
        "email_verified": "false",
        "name": "Mallory"
    }));
    let response = send(
        &app,
        post_json(
            "/auth/federated",
            json!({"provider": "apple", "id_token": token}),
            None,
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let cookie = session_of(&response);
    let me = json_body(send(&app, get("/auth/me", Some(&cookie))).await).await;
    assert_eq!(me["email"], Value::Null);
    assert_eq!(me["providers"], json!(["apple.com"]));

    // An unverified address does not reserve the email either.
    let token = emulator_token(json!({"sub": "g-7", "email": "later@example.com"}));
    let response = send(
        &app,
        post_json(
            "/auth/federated",
            json!({"provider": "google", "id_token": token}),
            None,
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    sign_up(&app, "later@example.com").await;
}

#[tokio::test]
async fn rejected_link_keeps_the_pending_credential() {
    let (app, _db) = app();
    let owner_cookie = sign_up(&app, "sam@example.com").await;
    let stranger_cookie = sign_up(&app, "alex@example.com").await;
    let token = emulator_token(json!({
        "sub": "g-42",
        "email": "sam@example.com",
        "email_verified": true
    }));

    let collision = send(
        &app,
        post_json(
            "/auth/federated",
            json!({"provider": "google", "id_token": token}),
            None,
        ),
    )
    .await;
    assert_eq!(collision.status(), StatusCode::CONFLICT);
    let pending_id = json_body(collision).await["pending_credential_id"].clone();

    let forbidden = send(
        &app,
        post_json(
            "/auth/link",
            json!({"pending_credential_id": pending_id}),
            Some(&stranger_cookie),
        ),
    )
    .await;
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

    let linked = send(
        &app,
        post_json(
            "/auth/link",
            json!({"pending_credential_id": pending_id}),
            Some(&owner_cookie),
        ),
    )
    .await;
    assert_eq!(linked.status(), StatusCode::OK);

    // A successful link consumes it.
    let replay = send(
        &app,
        post_json(
            "/auth/link",
            json!({"pending_credential_id": pending_id}),
            Some(&owner_cookie),
        ),
    )
    .await;
    assert_eq!(replay.status(), StatusCode::NOT_FOUND);
}

//=========================================================================================
// Counter & Content
//=========================================================================================

#[tokio::test]
async fn anonymous_counter_uses_device_record() {
    let (app, db) = app();
    db.set_device_start("dev-9", "2020-01-01T00:00:00.000Z")
        .await
        .unwrap();

    let request = Request::builder()
        .uri("/counter")
        .header("x-device-id", "dev-9")
        .body(Body::empty())
        .unwrap();
    let body = json_body(send(&app, request).await).await;
    assert_eq!(body["source"], "local");
    assert!(body["days"].as_i64().unwrap() > 365);
}

#[tokio::test]
async fn counter_reset_returns_zero_days() {
    let (app, _db) = app();
    let cookie = sign_up(&app, "sam@example.com").await;
    let response = send(&app, post_json("/counter/reset", json!({}), Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["days"], 0);

    let reading = json_body(send(&app, get("/counter", Some(&cookie))).await).await;
    assert_eq!(reading["source"], "remote");

    let again = send(&app, post_json("/counter/reset", json!({}), Some(&cookie))).await;
    assert_eq!(again.status(), StatusCode::OK);
    assert_eq!(json_body(again).await["days"], 0);
    let reading = json_body(send(&app, get("/counter", Some(&cookie))).await).await;
    assert_eq!(reading["days"], 0);
}

#[tokio::test]
async fn content_endpoints() {
    let (app, _db) = app();

    let resources = json_body(send(&app, get("/resources", None)).await).await;
    assert_eq!(resources.as_array().unwrap().len(), 4);

    let module = json_body(send(&app, get("/resources/2", None)).await).await;
    assert_eq!(module["title"], "Coping with Urges");
    let missing = send(&app, get("/resources/99", None)).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let cards = json_body(send(&app, get("/support/cards", None)).await).await;
    assert_eq!(cards.as_array().unwrap().len(), 6);
    assert_eq!(cards[3]["action"], json!({"kind": "navigate", "page": "chat"}));

    let warning = json_body(send(&app, get("/warning", None)).await).await;
    assert_eq!(warning["stay_label"], "Stay Strong");
}
