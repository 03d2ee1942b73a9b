//! Wishlist behaviour.
//!
//! Requires a migrated database and a running storefront; see the crate docs.

use aurum_core::UserRole;
use aurum_integration_tests::{base_url, client, login, pool, seed_product, seed_user};
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};

async fn post(client: &Client, path: &str, body: Value) -> Value {
    let resp = client
        .post(format!("{}{path}", base_url()))
        .json(&body)
        .send()
        .await
        .expect("Request failed");
    assert_eq!(resp.status(), StatusCode::OK, "POST {path}");
    resp.json().await.expect("Invalid body")
}

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_wishlist_add_is_idempotent() {
    let pool = pool().await;
    let product_id = seed_product(&pool, 4999, 2).await;
    let email = seed_user(&pool, UserRole::Customer).await;
    let client = client();
    login(&client, &email).await;

    post(&client, "/wishlist/add", json!({ "product_id": product_id })).await;
    let items = post(&client, "/wishlist/add", json!({ "product_id": product_id })).await;
    let items = items.as_array().expect("wishlist array");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["product"]["id"], json!(product_id));

    let listed: Value = client
        .get(format!("{}/wishlist", base_url()))
        .send()
        .await
        .expect("Failed to load wishlist")
        .json()
        .await
        .expect("Invalid body");
    assert_eq!(listed.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_move_to_cart_empties_wishlist_entry() {
    let pool = pool().await;
    let product_id = seed_product(&pool, 4999, 2).await;
    let email = seed_user(&pool, UserRole::Customer).await;
    let client = client();
    login(&client, &email).await;

    post(&client, "/wishlist/add", json!({ "product_id": product_id })).await;
    post(&client, "/wishlist/move-to-cart", json!({ "product_id": product_id })).await;

    let listed: Value = client
        .get(format!("{}/wishlist", base_url()))
        .send()
        .await
        .expect("Failed to load wishlist")
        .json()
        .await
        .expect("Invalid body");
    assert_eq!(listed.as_array().map(Vec::len), Some(0));

    let count: Value = client
        .get(format!("{}/cart/count", base_url()))
        .send()
        .await
        .expect("Failed to count cart")
        .json()
        .await
        .expect("Invalid body");
    assert_eq!(count["count"], 1);
}
