//! Catalog, cart and cash-on-delivery checkout.
//!
//! Requires a migrated database and a running storefront; see the crate docs.

use aurum_core::UserRole;
use aurum_integration_tests::{
    base_url, client, create_address, login, pool, seed_product, seed_user, stock_of,
};
use reqwest::StatusCode;
use serde_json::{Value, json};

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_product_listing_and_detail() {
    let pool = pool().await;
    let product_id = seed_product(&pool, 1499, 3).await;

    let listing: Value = client()
        .get(format!("{}/product?category=Pendants&per_page=100", base_url()))
        .send()
        .await
        .expect("Failed to list products")
        .json()
        .await
        .expect("Invalid body");
    assert!(listing["total"].as_i64().unwrap_or_default() >= 1);

    let resp = client()
        .get(format!("{}/product/{product_id}", base_url()))
        .send()
        .await
        .expect("Failed to load product");
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = client()
        .get(format!("{}/product?min_price=500&max_price=100", base_url()))
        .send()
        .await
        .expect("Failed to list products");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_cart_rejects_more_than_stock() {
    let pool = pool().await;
    let product_id = seed_product(&pool, 999, 2).await;
    let email = seed_user(&pool, UserRole::Customer).await;
    let client = client();
    login(&client, &email).await;

    let resp = client
        .post(format!("{}/cart/add", base_url()))
        .json(&json!({ "product_id": product_id, "quantity": 3 }))
        .send()
        .await
        .expect("Failed to add to cart");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = client
        .post(format!("{}/cart/add", base_url()))
        .json(&json!({ "product_id": product_id, "quantity": 2 }))
        .send()
        .await
        .expect("Failed to add to cart");
    assert_eq!(resp.status(), StatusCode::OK);

    let count: Value = client
        .get(format!("{}/cart/count", base_url()))
        .send()
        .await
        .expect("Failed to count cart")
        .json()
        .await
        .expect("Invalid body");
    assert_eq!(count["count"], 2);
}

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_cod_checkout_places_order_and_decrements_stock() {
    let pool = pool().await;
    let product_id = seed_product(&pool, 2499, 5).await;
    let email = seed_user(&pool, UserRole::Customer).await;
    let client = client();
    let user = login(&client, &email).await;
    let user_id = user["id"].as_i64().expect("user id");
    let address_id = create_address(&client).await;

    client
        .post(format!("{}/cart/add", base_url()))
        .json(&json!({ "product_id": product_id, "quantity": 2 }))
        .send()
        .await
        .expect("Failed to add to cart");

    let resp = client
        .post(format!("{}/order/checkout", base_url()))
        .json(&json!({ "address_id": address_id, "payment_method": "cod" }))
        .send()
        .await
        .expect("Failed to check out");
    assert_eq!(resp.status(), StatusCode::OK);
    let outcome: Value = resp.json().await.expect("Invalid body");
    assert_eq!(outcome["next"], "placed");
    let order_id = outcome["order"]["id"].as_i64().expect("order id");

    let product: Value = client
        .get(format!("{}/product/{product_id}", base_url()))
        .send()
        .await
        .expect("Failed to load product")
        .json()
        .await
        .expect("Invalid body");
    assert_eq!(product["stock"], 3);

    let count: Value = client
        .get(format!("{}/cart/count", base_url()))
        .send()
        .await
        .expect("Failed to count cart")
        .json()
        .await
        .expect("Invalid body");
    assert_eq!(count["count"], 0);

    // Cash on delivery never stages: one order, nothing left waiting.
    let (orders, temps): (i64, i64) = sqlx::query_as(
        r"
        SELECT (SELECT COUNT(*) FROM orders WHERE user_id = $1),
               (SELECT COUNT(*) FROM order_temps WHERE user_id = $1)
        ",
    )
    .bind(user_id)
    .fetch_one(&pool)
    .await
    .expect("Failed to count orders");
    assert_eq!((orders, temps), (1, 0));

    // A reason is required to cancel.
    let resp = client
        .post(format!("{}/order/{order_id}/cancel", base_url()))
        .json(&json!({ "reason": "  " }))
        .send()
        .await
        .expect("Failed to cancel");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = client
        .post(format!("{}/order/{order_id}/cancel", base_url()))
        .json(&json!({ "reason": "Ordered the wrong size" }))
        .send()
        .await
        .expect("Failed to cancel");
    assert_eq!(resp.status(), StatusCode::OK);
    let cancelled: Value = resp.json().await.expect("Invalid body");
    assert_eq!(cancelled["status"], "cancelled");
    assert_eq!(stock_of(&pool, product_id).await, 5);
}

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_checkout_with_empty_cart_fails() {
    let pool = pool().await;
    let email = seed_user(&pool, UserRole::Customer).await;
    let client = client();
    login(&client, &email).await;
    let address_id = create_address(&client).await;

    let resp = client
        .post(format!("{}/order/checkout", base_url()))
        .json(&json!({ "address_id": address_id, "payment_method": "cod" }))
        .send()
        .await
        .expect("Failed to check out");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}
