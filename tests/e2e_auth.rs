//! E2E tests for password auth and session endpoints

mod common;

use brdscope::data::{EntityId, Session};
use chrono::{Duration, Utc};
use common::{TestServer, set_cookie_header, set_cookies};
use serde_json::{Value, json};

#[tokio::test]
async fn test_signup_sets_session_cookie() {
    let server = TestServer::new().await;

    let response = server
        .client
        .post(server.url("/api/auth/signup"))
        .json(&json!({"email": " new@example.com ", "password": "secret123", "name": "New"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let cookie = set_cookie_header(&response, "auth_token").expect("session cookie");
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("Path=/"));
    assert!(!cookie.contains("Secure"));

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["user"]["email"], "new@example.com");
    assert_eq!(body["user"]["plan"], "FREE");
    assert_eq!(body["user"]["aiCallsUsed"], 0);
    assert_eq!(body["user"]["aiCallsLimit"], 5);
    assert_eq!(body["token"].as_str().unwrap().len(), 64);
}

#[tokio::test]
async fn test_signup_validation() {
    let server = TestServer::new().await;
    server.signup("taken@example.com").await;

    for (payload, message) in [
        (
            json!({"email": "taken@example.com", "password": "secret123"}),
            "User with this email already exists",
        ),
        (
            json!({"email": "short@example.com", "password": "abc"}),
            "Password must be at least 6 characters",
        ),
        (json!({"email": "", "password": ""}), "Email and password are required"),
    ] {
        let response = server
            .client
            .post(server.url("/api/auth/signup"))
            .json(&payload)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], message);
    }
}

#[tokio::test]
async fn test_login_and_me() {
    let server = TestServer::new().await;
    server.signup("login@example.com").await;

    let response = server
        .client
        .post(server.url("/api/auth/login"))
        .json(&json!({"email": "login@example.com", "password": "secret123"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let cookies = set_cookies(&response);
    let body: Value = response.json().await.unwrap();
    let token = body["token"].as_str().unwrap().to_string();
    assert_eq!(cookies.get("auth_token"), Some(&token));

    // Cookie auth
    let response = server
        .client
        .get(server.url("/api/auth/me"))
        .header("Cookie", format!("auth_token={}", token))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["user"]["email"], "login@example.com");

    // Bearer auth
    let response = server
        .client
        .get(server.url("/api/auth/me"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_login_rejects_wrong_password() {
    let server = TestServer::new().await;
    server.signup("wrong@example.com").await;

    for payload in [
        json!({"email": "wrong@example.com", "password": "not-the-password"}),
        json!({"email": "nobody@example.com", "password": "secret123"}),
    ] {
        let response = server
            .client
            .post(server.url("/api/auth/login"))
            .json(&payload)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 401);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], "Invalid email or password");
    }
}

#[tokio::test]
async fn test_me_requires_session() {
    let server = TestServer::new().await;

    let response = server
        .client
        .get(server.url("/api/auth/me"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    let response = server
        .client
        .get(server.url("/api/auth/me"))
        .bearer_auth("not-a-session")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn test_logout_revokes_session() {
    let server = TestServer::new().await;
    let token = server.signup("logout@example.com").await;

    let response = server
        .client
        .post(server.url("/api/auth/logout"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let cookie = set_cookie_header(&response, "auth_token").expect("removal cookie");
    assert!(cookie.contains("Max-Age=0"));
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);

    let response = server
        .client
        .get(server.url("/api/auth/me"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    // Logging out without a session still succeeds
    let response = server
        .client
        .post(server.url("/api/auth/logout"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_refresh_replaces_session() {
    let server = TestServer::new().await;
    let token = server.signup("refresh@example.com").await;

    let response = server
        .client
        .post(server.url("/api/auth/refresh"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    let fresh = body["token"].as_str().unwrap().to_string();
    assert_ne!(fresh, token);

    let old = server
        .client
        .get(server.url("/api/auth/me"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(old.status(), 401);

    let new = server
        .client
        .get(server.url("/api/auth/me"))
        .bearer_auth(&fresh)
        .send()
        .await
        .unwrap();
    assert_eq!(new.status(), 200);
}

#[tokio::test]
async fn test_expired_session_is_rejected_and_removed() {
    let server = TestServer::new().await;
    let token = server.signup("expired@example.com").await;

    let response = server
        .client
        .get(server.url("/api/auth/me"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    let user_id = body["user"]["id"].as_str().unwrap().to_string();

    let now = Utc::now();
    let expired = Session {
        id: EntityId::new().0,
        user_id,
        token: "e".repeat(64),
        expires_at: now - Duration::minutes(5),
        created_at: now - Duration::hours(5),
    };
    server.state.db.insert_session(&expired).await.unwrap();

    let response = server
        .client
        .get(server.url("/api/auth/me"))
        .bearer_auth(&expired.token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    let stored = server
        .state
        .db
        .get_session_by_token(&expired.token)
        .await
        .unwrap();
    assert!(stored.is_none());
}
