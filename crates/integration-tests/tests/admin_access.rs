//! Back-office authorization.
//!
//! Requires a migrated database and a running storefront; see the crate docs.

use aurum_core::UserRole;
use aurum_integration_tests::{base_url, client, login, pool, seed_user};
use reqwest::StatusCode;
use serde_json::{Value, json};

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_dashboard_requires_admin() {
    let pool = pool().await;

    let resp = client()
        .get(format!("{}/admin/dashboard", base_url()))
        .send()
        .await
        .expect("Failed to call dashboard");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let customer = client();
    login(&customer, &seed_user(&pool, UserRole::Customer).await).await;
    let resp = customer
        .get(format!("{}/admin/dashboard", base_url()))
        .send()
        .await
        .expect("Failed to call dashboard");
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let admin = client();
    login(&admin, &seed_user(&pool, UserRole::Admin).await).await;
    let dashboard: Value = admin
        .get(format!("{}/admin/dashboard?days=7", base_url()))
        .send()
        .await
        .expect("Failed to call dashboard")
        .json()
        .await
        .expect("Invalid body");
    assert!(dashboard["totals"]["product_count"].is_number());
    assert!(dashboard["sales_by_day"].is_array());
}

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_admin_cannot_block_self() {
    let pool = pool().await;
    let admin = client();
    let me = login(&admin, &seed_user(&pool, UserRole::Admin).await).await;
    let id = me["id"].as_i64().expect("user id");

    let resp = admin
        .post(format!("{}/admin/users/{id}/block", base_url()))
        .send()
        .await
        .expect("Failed to block");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_blocked_customer_loses_access() {
    let pool = pool().await;
    let admin = client();
    login(&admin, &seed_user(&pool, UserRole::Admin).await).await;

    let customer = client();
    let user = login(&customer, &seed_user(&pool, UserRole::Customer).await).await;
    let id = user["id"].as_i64().expect("user id");

    let resp = admin
        .post(format!("{}/admin/users/{id}/block", base_url()))
        .send()
        .await
        .expect("Failed to block");
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = customer
        .get(format!("{}/cart", base_url()))
        .send()
        .await
        .expect("Failed to load cart");
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_coupon_codes_are_uppercased() {
    let pool = pool().await;
    let admin = client();
    login(&admin, &seed_user(&pool, UserRole::Admin).await).await;

    let code = format!("it-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]);
    let resp = admin
        .post(format!("{}/admin/coupons", base_url()))
        .json(&json!({
            "code": code,
            "kind": "percent",
            "value": "10",
        }))
        .send()
        .await
        .expect("Failed to create coupon");
    assert_eq!(resp.status(), StatusCode::CREATED);
    let coupon: Value = resp.json().await.expect("Invalid body");
    assert_eq!(coupon["code"], code.to_uppercase());
}
