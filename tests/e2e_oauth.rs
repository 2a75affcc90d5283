//! E2E tests for the OAuth authorization-code flow with PKCE
//!
//! Providers are served by the upstream stub in `common`.

mod common;

use common::{
    APPLE_EMAIL, GITHUB_EMAIL, GOOGLE_EMAIL, STUB_AUTH_CODE, TestServer, location,
    no_redirect_client, set_cookie_header, set_cookies,
};
use serde_json::{Value, json};
use std::collections::HashMap;

/// Flow values handed out by the start endpoint
struct StartedFlow {
    state: String,
    cookie_header: String,
}

async fn start_flow(server: &TestServer, provider: &str) -> StartedFlow {
    let response = no_redirect_client()
        .get(server.url(&format!("/api/auth/oauth/{}", provider)))
        .send()
        .await
        .expect("request succeeds");
    assert!(response.status().is_redirection());

    let cookies = set_cookies(&response);
    let cookie_header = [
        format!("oauth_state_{}", provider),
        format!("oauth_code_verifier_{}", provider),
    ]
    .iter()
    .map(|name| format!("{}={}", name, cookies.get(name).expect("flow cookie")))
    .collect::<Vec<_>>()
    .join("; ");

    let target = url::Url::parse(&location(&response)).expect("absolute url");
    let params: HashMap<String, String> = target.query_pairs().into_owned().collect();

    StartedFlow {
        state: params["state"].clone(),
        cookie_header,
    }
}

async fn callback(
    server: &TestServer,
    provider: &str,
    query: &[(&str, &str)],
    cookie_header: Option<&str>,
) -> reqwest::Response {
    let mut request = no_redirect_client()
        .get(server.url(&format!("/api/auth/oauth/{}/callback", provider)))
        .query(query);
    if let Some(cookie_header) = cookie_header {
        request = request.header("Cookie", cookie_header);
    }
    request.send().await.expect("request succeeds")
}

async fn me(server: &TestServer, token: &str) -> Value {
    let response = server
        .client
        .get(server.url("/api/auth/me"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    response.json().await.unwrap()
}

#[tokio::test]
async fn test_start_redirects_with_pkce_parameters() {
    let server = TestServer::new().await;

    let response = no_redirect_client()
        .get(server.url("/api/auth/oauth/google"))
        .send()
        .await
        .expect("request succeeds");
    assert_eq!(response.status(), 303);

    let target = location(&response);
    assert!(target.starts_with(&server.upstream.url("/oauth/authorize?")));
    let target = url::Url::parse(&target).unwrap();
    let params: HashMap<String, String> = target.query_pairs().into_owned().collect();
    assert_eq!(params["client_id"], "test-client-id");
    assert_eq!(params["response_type"], "code");
    assert_eq!(params["code_challenge_method"], "S256");
    assert_eq!(params["code_challenge"].len(), 43);
    assert_eq!(
        params["redirect_uri"],
        "http://localhost:8080/api/auth/oauth/google/callback"
    );
    assert!(!params.contains_key("response_mode"));

    let state_cookie = set_cookie_header(&response, "oauth_state_google").expect("state cookie");
    assert!(state_cookie.contains("HttpOnly"));
    assert!(state_cookie.contains("Max-Age=600"));
    assert!(set_cookie_header(&response, "oauth_code_verifier_google").is_some());

    // Signed cookie value is not the bare state
    let cookies = set_cookies(&response);
    assert_ne!(cookies["oauth_state_google"], params["state"]);
}

#[tokio::test]
async fn test_apple_start_requests_form_post() {
    let server = TestServer::new().await;

    let response = no_redirect_client()
        .get(server.url("/api/auth/oauth/apple"))
        .send()
        .await
        .unwrap();

    let target = location(&response);
    assert!(target.contains("response_mode=form_post"));
}

#[tokio::test]
async fn test_invalid_provider_is_rejected() {
    let server = TestServer::new().await;

    let response = no_redirect_client()
        .get(server.url("/api/auth/oauth/twitter"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Invalid provider");
}

#[tokio::test]
async fn test_google_login_completes() {
    let server = TestServer::new().await;
    let flow = start_flow(&server, "google").await;

    let response = callback(
        &server,
        "google",
        &[("code", STUB_AUTH_CODE), ("state", flow.state.as_str())],
        Some(&flow.cookie_header),
    )
    .await;

    assert_eq!(response.status(), 303);
    assert_eq!(location(&response), "/dashboard");
    let cookies = set_cookies(&response);
    let token = cookies.get("auth_token").expect("session cookie").clone();
    assert_eq!(token.len(), 64);

    // Flow cookies are cleared
    let state_cookie = set_cookie_header(&response, "oauth_state_google").unwrap();
    assert!(state_cookie.contains("Max-Age=0"));

    let body = me(&server, &token).await;
    assert_eq!(body["user"]["email"], GOOGLE_EMAIL);
    assert_eq!(body["user"]["name"], "OAuth User");
    assert_eq!(body["user"]["plan"], "FREE");
}

#[tokio::test]
async fn test_github_login_uses_primary_email_and_blocks_password_login() {
    let server = TestServer::new().await;
    let flow = start_flow(&server, "github").await;

    let response = callback(
        &server,
        "github",
        &[("code", STUB_AUTH_CODE), ("state", flow.state.as_str())],
        Some(&flow.cookie_header),
    )
    .await;
    assert_eq!(location(&response), "/dashboard");
    let token = set_cookies(&response)["auth_token"].clone();

    let body = me(&server, &token).await;
    assert_eq!(body["user"]["email"], GITHUB_EMAIL);
    assert_eq!(body["user"]["name"], "octocat");

    let response = server
        .client
        .post(server.url("/api/auth/login"))
        .json(&json!({"email": GITHUB_EMAIL, "password": "anything"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("created with OAuth"));
}

#[tokio::test]
async fn test_repeat_login_reuses_user() {
    let server = TestServer::new().await;

    let mut user_ids = Vec::new();
    for _ in 0..2 {
        let flow = start_flow(&server, "google").await;
        let response = callback(
            &server,
            "google",
            &[("code", STUB_AUTH_CODE), ("state", flow.state.as_str())],
            Some(&flow.cookie_header),
        )
        .await;
        let token = set_cookies(&response)["auth_token"].clone();
        let body = me(&server, &token).await;
        user_ids.push(body["user"]["id"].as_str().unwrap().to_string());
    }

    assert_eq!(user_ids[0], user_ids[1]);
}

#[tokio::test]
async fn test_oauth_links_existing_password_account() {
    let server = TestServer::new().await;
    let password_token = server.signup(GOOGLE_EMAIL).await;
    let password_user = me(&server, &password_token).await;

    let flow = start_flow(&server, "google").await;
    let response = callback(
        &server,
        "google",
        &[("code", STUB_AUTH_CODE), ("state", flow.state.as_str())],
        Some(&flow.cookie_header),
    )
    .await;
    let token = set_cookies(&response)["auth_token"].clone();
    let oauth_user = me(&server, &token).await;

    assert_eq!(oauth_user["user"]["id"], password_user["user"]["id"]);
}

#[tokio::test]
async fn test_apple_form_post_callback() {
    let server = TestServer::new().await;
    let flow = start_flow(&server, "apple").await;

    let response = no_redirect_client()
        .post(server.url("/api/auth/oauth/apple/callback"))
        .header("Cookie", &flow.cookie_header)
        .form(&[("code", STUB_AUTH_CODE), ("state", flow.state.as_str())])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 303);
    assert_eq!(location(&response), "/dashboard");
    let token = set_cookies(&response)["auth_token"].clone();
    let body = me(&server, &token).await;
    assert_eq!(body["user"]["email"], APPLE_EMAIL);
}

#[tokio::test]
async fn test_form_post_callback_only_for_apple() {
    let server = TestServer::new().await;

    let response = no_redirect_client()
        .post(server.url("/api/auth/oauth/google/callback"))
        .form(&[("code", STUB_AUTH_CODE), ("state", "whatever")])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "POST only supported for Apple");
}

#[tokio::test]
async fn test_state_mismatch_redirects_to_login() {
    let server = TestServer::new().await;
    let flow = start_flow(&server, "google").await;

    let response = callback(
        &server,
        "google",
        &[("code", STUB_AUTH_CODE), ("state", "forged-state")],
        Some(&flow.cookie_header),
    )
    .await;

    assert_eq!(response.status(), 303);
    assert_eq!(location(&response), "/login?error=invalid_state");
    assert!(!set_cookies(&response).contains_key("auth_token"));
}

#[tokio::test]
async fn test_callback_without_flow_cookies_is_rejected() {
    let server = TestServer::new().await;
    let flow = start_flow(&server, "github").await;

    let response = callback(
        &server,
        "github",
        &[("code", STUB_AUTH_CODE), ("state", flow.state.as_str())],
        None,
    )
    .await;

    assert_eq!(location(&response), "/login?error=invalid_state");
}

#[tokio::test]
async fn test_missing_code_redirects_to_login() {
    let server = TestServer::new().await;

    let response = callback(&server, "github", &[("state", "abc")], None).await;

    assert_eq!(location(&response), "/login?error=missing_code_or_state");
}

#[tokio::test]
async fn test_provider_error_is_forwarded() {
    let server = TestServer::new().await;

    let response = callback(&server, "google", &[("error", "access_denied")], None).await;

    assert_eq!(location(&response), "/login?error=access_denied");
}

#[tokio::test]
async fn test_early_failures_clear_flow_cookies() {
    let server = TestServer::new().await;

    let flow = start_flow(&server, "google").await;
    let denied = callback(
        &server,
        "google",
        &[("error", "access_denied"), ("state", flow.state.as_str())],
        Some(&flow.cookie_header),
    )
    .await;
    assert_eq!(location(&denied), "/login?error=access_denied");

    let flow = start_flow(&server, "google").await;
    let missing_code = callback(
        &server,
        "google",
        &[("state", flow.state.as_str())],
        Some(&flow.cookie_header),
    )
    .await;
    assert_eq!(location(&missing_code), "/login?error=missing_code_or_state");

    for response in [&denied, &missing_code] {
        for name in ["oauth_state_google", "oauth_code_verifier_google"] {
            let cookie = set_cookie_header(response, name).expect("flow cookie cleared");
            assert!(cookie.contains("Max-Age=0"));
        }
    }
}

#[tokio::test]
async fn test_rejected_code_redirects_with_oauth_failed() {
    let server = TestServer::new().await;
    let flow = start_flow(&server, "google").await;

    let response = callback(
        &server,
        "google",
        &[("code", "bad-code"), ("state", flow.state.as_str())],
        Some(&flow.cookie_header),
    )
    .await;

    assert_eq!(location(&response), "/login?error=oauth_failed");
    assert!(!set_cookies(&response).contains_key("auth_token"));
}
