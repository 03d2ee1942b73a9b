//! Account and session flows.
//!
//! Requires a migrated database and a running storefront; see the crate docs.

use aurum_core::UserRole;
use aurum_integration_tests::{base_url, client, login, pool, seed_user, unique_email};
use reqwest::StatusCode;
use serde_json::{Value, json};

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_health() {
    let resp = client()
        .get(format!("{}/health/ready", base_url()))
        .send()
        .await
        .expect("Failed to reach server");
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_register_then_login_requires_verification() {
    let client = client();
    let email = unique_email("register");

    let resp = client
        .post(format!("{}/auth/register", base_url()))
        .json(&json!({
            "name": "New Shopper",
            "email": email,
            "password": "bangles-and-rings-9",
        }))
        .send()
        .await
        .expect("Failed to register");
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = client
        .post(format!("{}/auth/login", base_url()))
        .json(&json!({ "email": email, "password": "bangles-and-rings-9" }))
        .send()
        .await
        .expect("Failed to log in");
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_duplicate_registration_conflicts() {
    let pool = pool().await;
    let email = seed_user(&pool, UserRole::Customer).await;

    let resp = client()
        .post(format!("{}/auth/register", base_url()))
        .json(&json!({
            "name": "Second Shopper",
            "email": email,
            "password": "bangles-and-rings-9",
        }))
        .send()
        .await
        .expect("Failed to register");
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_session_lifecycle() {
    let pool = pool().await;
    let email = seed_user(&pool, UserRole::Customer).await;
    let client = client();

    let resp = client
        .get(format!("{}/auth/me", base_url()))
        .send()
        .await
        .expect("Failed to call /auth/me");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let user = login(&client, &email).await;
    assert_eq!(user["email"], email);

    let me: Value = client
        .get(format!("{}/auth/me", base_url()))
        .send()
        .await
        .expect("Failed to call /auth/me")
        .json()
        .await
        .expect("Invalid body");
    assert_eq!(me["email"], email);

    let resp = client
        .post(format!("{}/auth/logout", base_url()))
        .send()
        .await
        .expect("Failed to log out");
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = client
        .get(format!("{}/auth/me", base_url()))
        .send()
        .await
        .expect("Failed to call /auth/me");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_wrong_password_is_rejected() {
    let pool = pool().await;
    let email = seed_user(&pool, UserRole::Customer).await;

    let resp = client()
        .post(format!("{}/auth/login", base_url()))
        .json(&json!({ "email": email, "password": "not-the-password-1" }))
        .send()
        .await
        .expect("Failed to log in");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}
