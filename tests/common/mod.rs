//! Common test utilities for E2E tests
//!
//! `TestServer` boots the real router on a random port with a temporary
//! SQLite database. OAuth providers and the LLM API are replaced by an
//! in-process stub server (`UpstreamStub`).

#![allow(dead_code)]

use axum::{
    Form, Json, Router,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use brdscope::{AppState, config};
use serde_json::{Value, json};
use std::collections::HashMap;
use tempfile::TempDir;
use tokio::net::TcpListener;

pub const STUB_AUTH_CODE: &str = "good-code";
pub const STUB_ACCESS_TOKEN: &str = "stub-access-token";
pub const STUB_LLM_KEY: &str = "test-llm-key";
pub const GOOGLE_EMAIL: &str = "oauth-user@example.com";
pub const GITHUB_EMAIL: &str = "octo@example.com";
pub const APPLE_EMAIL: &str = "apple-user@example.com";

/// Requirements returned by the stub LLM
pub fn stub_requirements() -> Value {
    json!({
        "businessRequirementsSummary": "Online store for handmade goods",
        "functionalRequirements": [
            {"id": "FR-1", "title": "Checkout", "description": "Customers pay by card", "priority": "high", "category": "payments"},
            {"id": "FR-2", "title": "Search", "description": "Find products by name", "priority": "medium"}
        ],
        "nonFunctionalRequirements": [
            {"id": "NFR-1", "title": "Latency", "description": "Pages load under 2s", "type": "performance"}
        ],
        "frontendRequirements": [
            {"id": "FE-1", "title": "Cart", "description": "Cart drawer", "component": "CartDrawer", "priority": "medium"}
        ],
        "userStories": [
            {"id": "US-1", "story": "As a buyer, I want to pay by card", "acceptanceCriteria": ["Card accepted"], "priority": "high"}
        ],
        "taskBreakdown": [
            {"id": "T1", "title": "Payment API", "description": "Integrate PSP", "estimatedHours": 16, "priority": "high", "role": "backend"},
            {"id": "T2", "title": "Cart UI", "description": "Build drawer", "estimatedHours": 8, "priority": "medium", "role": "frontend"}
        ],
        "apiEndpoints": [
            {"id": "API-1", "method": "POST", "path": "/api/checkout", "description": "Start checkout"}
        ],
        "recommendations": null
    })
}

// =============================================================================
// Upstream stub
// =============================================================================

/// Stub OAuth provider endpoints and LLM API
pub struct UpstreamStub {
    pub addr: String,
}

impl UpstreamStub {
    pub async fn start() -> Self {
        let app = Router::new()
            .route("/oauth/token", post(stub_token))
            .route("/apple/token", post(stub_apple_token))
            .route("/google/userinfo", get(stub_google_userinfo))
            .route("/github/user", get(stub_github_user))
            .route("/github/emails", get(stub_github_emails))
            .route("/llm/chat/completions", post(stub_chat_completion));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }
}

fn has_bearer(headers: &HeaderMap, expected: &str) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {}", expected))
        .unwrap_or(false)
}

fn code_is_valid(form: &HashMap<String, String>) -> bool {
    form.get("code").map(String::as_str) == Some(STUB_AUTH_CODE)
        && form
            .get("code_verifier")
            .map(|v| v.len() >= 43)
            .unwrap_or(false)
        && form.get("grant_type").map(String::as_str) == Some("authorization_code")
}

async fn stub_token(Form(form): Form<HashMap<String, String>>) -> (StatusCode, Json<Value>) {
    if code_is_valid(&form) {
        (
            StatusCode::OK,
            Json(json!({
                "access_token": STUB_ACCESS_TOKEN,
                "token_type": "bearer",
                "expires_in": 3600
            })),
        )
    } else {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "invalid_grant"})),
        )
    }
}

async fn stub_apple_token(Form(form): Form<HashMap<String, String>>) -> (StatusCode, Json<Value>) {
    if !code_is_valid(&form) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "invalid_grant"})),
        );
    }
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256"}"#);
    let payload = URL_SAFE_NO_PAD.encode(
        json!({"sub": "apple-001", "email": APPLE_EMAIL}).to_string(),
    );
    (
        StatusCode::OK,
        Json(json!({
            "access_token": STUB_ACCESS_TOKEN,
            "id_token": format!("{}.{}.signature", header, payload),
            "expires_in": 3600
        })),
    )
}

async fn stub_google_userinfo(headers: HeaderMap) -> (StatusCode, Json<Value>) {
    if !has_bearer(&headers, STUB_ACCESS_TOKEN) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "invalid_token"})));
    }
    (
        StatusCode::OK,
        Json(json!({"sub": "google-123", "email": GOOGLE_EMAIL, "name": "OAuth User"})),
    )
}

async fn stub_github_user(headers: HeaderMap) -> (StatusCode, Json<Value>) {
    if !has_bearer(&headers, STUB_ACCESS_TOKEN) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"message": "Bad credentials"})));
    }
    (
        StatusCode::OK,
        Json(json!({"id": 4242, "login": "octocat", "name": null, "email": null})),
    )
}

async fn stub_github_emails(headers: HeaderMap) -> (StatusCode, Json<Value>) {
    if !has_bearer(&headers, STUB_ACCESS_TOKEN) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"message": "Bad credentials"})));
    }
    (
        StatusCode::OK,
        Json(json!([
            {"email": "old@example.com", "primary": false, "verified": true},
            {"email": GITHUB_EMAIL, "primary": true, "verified": true}
        ])),
    )
}

async fn stub_chat_completion(
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if !has_bearer(&headers, STUB_LLM_KEY) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "bad key"})));
    }
    if body["response_format"]["type"] != "json_object" || body["messages"].as_array().map(Vec::len) != Some(2) {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "bad request"})));
    }

    // Wrap in a fence to exercise the fallback parser
    let content = format!("```json\n{}\n```", stub_requirements());
    (
        StatusCode::OK,
        Json(json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        })),
    )
}

// =============================================================================
// Test server
// =============================================================================

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub _temp_dir: TempDir,
    pub client: reqwest::Client,
    pub upstream: UpstreamStub,
}

impl TestServer {
    /// Create a new test server instance
    pub async fn new() -> Self {
        let upstream = UpstreamStub::start().await;

        // Create temporary directory for test database
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let provider = |token_path: &str, userinfo_path: Option<&str>| config::OAuthProviderConfig {
            client_id: Some("test-client-id".to_string()),
            client_secret: Some("test-client-secret".to_string()),
            authorization_url: Some(upstream.url("/oauth/authorize")),
            token_url: Some(upstream.url(token_path)),
            userinfo_url: userinfo_path.map(|path| upstream.url(path)),
            emails_url: Some(upstream.url("/github/emails")),
        };

        // Create test configuration
        let config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
                domain: "localhost:8080".to_string(),
                protocol: "http".to_string(),
            },
            database: config::DatabaseConfig { path: db_path },
            auth: config::AuthConfig {
                session_secret: "test-secret-key-that-is-32-bytes!".to_string(),
                session_ttl_hours: 4,
            },
            oauth: config::OAuthConfig {
                google: provider("/oauth/token", Some("/google/userinfo")),
                github: provider("/oauth/token", Some("/github/user")),
                apple: provider("/apple/token", None),
            },
            llm: config::LlmConfig {
                api_key: Some(STUB_LLM_KEY.to_string()),
                base_url: upstream.url("/llm"),
                model: "test-model".to_string(),
                temperature: 0.3,
                timeout_seconds: 10,
            },
            upload: config::UploadConfig {
                max_bytes: 1024 * 1024,
                max_extracted_bytes: 2 * 1024 * 1024,
            },
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };

        // Initialize app state
        let state = AppState::new(config).await.unwrap();

        // Create HTTP client
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = format!("http://{}", listener.local_addr().unwrap());

        let app = brdscope::build_router(state.clone());

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait a bit for server to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        Self {
            addr,
            state,
            _temp_dir: temp_dir,
            client,
            upstream,
        }
    }

    /// Get base URL for API requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// Sign up a password user and return the session token
    pub async fn signup(&self, email: &str) -> String {
        let response = self
            .client
            .post(self.url("/api/auth/signup"))
            .json(&json!({"email": email, "password": "secret123", "name": "Test User"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);

        let body: Value = response.json().await.unwrap();
        body["token"].as_str().unwrap().to_string()
    }

    /// Save an analysis through the API and return its id
    pub async fn save_analysis(&self, token: &str, document_name: &str, requirements: Value) -> String {
        let response = self
            .client
            .post(self.url("/api/analyses"))
            .bearer_auth(token)
            .json(&json!({
                "documentName": document_name,
                "documentText": "The system shall sell handmade goods.",
                "requirements": requirements
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);

        let body: Value = response.json().await.unwrap();
        body["analysis"]["id"].as_str().unwrap().to_string()
    }
}

/// Client that reports redirects instead of following them
pub fn no_redirect_client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(std::time::Duration::from_secs(10))
        .build()
        .expect("failed to build no-redirect client")
}

/// `name=value` pairs of every `Set-Cookie` header
pub fn set_cookies(response: &reqwest::Response) -> HashMap<String, String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(';').next())
        .filter_map(|pair| pair.split_once('='))
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .collect()
}

/// Raw `Set-Cookie` header for one cookie
pub fn set_cookie_header(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find(|value| value.starts_with(&format!("{}=", name)))
        .map(str::to_string)
}

/// Redirect target of a response
pub fn location(response: &reqwest::Response) -> String {
    response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .expect("location header")
        .to_string()
}
