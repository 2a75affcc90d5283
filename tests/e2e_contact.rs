//! E2E tests for the contact-sales endpoint

mod common;

use common::TestServer;
use serde_json::{Value, json};

#[tokio::test]
async fn test_contact_sales_is_stored() {
    let server = TestServer::new().await;

    let response = server
        .client
        .post(server.url("/api/contact-sales"))
        .json(&json!({
            "name": "Ada",
            "email": "ada@example.com",
            "company": "Analytical Engines",
            "phone": "+44 20 0000 0000",
            "message": "We need the enterprise plan.",
            "planName": "ENTERPRISE"
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert!(body["message"].as_str().unwrap().contains("sales team"));

    assert_eq!(server.state.db.count_contact_requests().await.unwrap(), 1);
}

#[tokio::test]
async fn test_contact_sales_requires_all_fields() {
    let server = TestServer::new().await;

    let response = server
        .client
        .post(server.url("/api/contact-sales"))
        .json(&json!({
            "name": "Ada",
            "email": "ada@example.com",
            "company": "   ",
            "phone": "123",
            "message": "Hello"
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "All fields are required");
    assert_eq!(server.state.db.count_contact_requests().await.unwrap(), 0);
}
