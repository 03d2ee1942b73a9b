//! Turning staged prepaid checkouts into orders.
//!
//! These run against the database only; no server is needed.

use hmac::{Hmac, Mac};
use secrecy::SecretString;
use serde_json::json;
use sha2::Sha256;
use sqlx::PgPool;

use aurum_core::UserRole;
use aurum_integration_tests::{
    count_by_gateway_order, gateway_order_id, place_cod_order, pool, seed_coupon, seed_product,
    seed_user, stage_checkout, stock_of, user_id,
};
use aurum_storefront::config::{PricingConfig, RazorpayConfig};
use aurum_storefront::db::orders::Promotion;
use aurum_storefront::db::{CouponRepository, OrderTempRepository, RepositoryError};
use aurum_storefront::payments::{Gateways, RazorpayClient};
use aurum_storefront::services::checkout::{CheckoutError, CheckoutService, Fulfillment};
use aurum_storefront::services::email::EmailService;
use aurum_storefront::services::pricing::CouponError;

const KEY_SECRET: &str = "rzp_test_key_secret";
const WEBHOOK_SECRET: &str = "rzp_test_webhook_secret";

fn sign(secret: &str, message: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("hmac key");
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

/// Shared pieces a `CheckoutService` borrows, with Razorpay enabled on
/// throwaway credentials so refunds fail and get logged.
struct Checkout {
    pool: PgPool,
    pricing: PricingConfig,
    gateways: Gateways,
    fulfillment: Fulfillment,
}

impl Checkout {
    fn new(pool: PgPool) -> Self {
        let razorpay = RazorpayClient::new(RazorpayConfig {
            key_id: "rzp_test_key".to_owned(),
            key_secret: SecretString::from(KEY_SECRET),
            webhook_secret: Some(SecretString::from(WEBHOOK_SECRET)),
        })
        .expect("razorpay client");
        let email = EmailService::new(None, "http://localhost:3000").expect("log-only email");
        Self {
            fulfillment: Fulfillment::new(pool.clone(), None, email),
            gateways: Gateways {
                razorpay: Some(razorpay),
                ..Gateways::default()
            },
            pricing: PricingConfig::default(),
            pool,
        }
    }

    fn service(&self) -> CheckoutService<'_> {
        CheckoutService::new(
            &self.pool,
            &self.pricing,
            "http://localhost:3000",
            &self.gateways,
            &self.fulfillment,
        )
    }
}

#[tokio::test]
#[ignore = "Requires database"]
async fn test_promotion_is_idempotent_and_consumes_the_temp() {
    let pool = pool().await;
    let product_id = seed_product(&pool, 1999, 4).await;
    let user = user_id(&pool, &seed_user(&pool, UserRole::Customer).await).await;
    let gateway_id = gateway_order_id();
    stage_checkout(&pool, &gateway_id, user, product_id, 2, None).await;

    let temps = OrderTempRepository::new(&pool);
    let promoted = temps.promote(&gateway_id, "pay_first").await;
    let Ok(Promotion::Created(order)) = promoted else {
        panic!("first promotion should create the order: {promoted:?}");
    };
    assert_eq!(order.gateway_payment_id.as_deref(), Some("pay_first"));
    assert_eq!(count_by_gateway_order(&pool, "order_temps", &gateway_id).await, 0);
    assert_eq!(count_by_gateway_order(&pool, "orders", &gateway_id).await, 1);
    assert_eq!(stock_of(&pool, product_id).await, 2);

    let repeated = temps.promote(&gateway_id, "pay_first").await;
    let Ok(Promotion::AlreadyPromoted(again)) = repeated else {
        panic!("second promotion should find the existing order: {repeated:?}");
    };
    assert_eq!(again.id, order.id);
    assert_eq!(count_by_gateway_order(&pool, "orders", &gateway_id).await, 1);
    assert_eq!(stock_of(&pool, product_id).await, 2);
}

#[tokio::test]
#[ignore = "Requires database"]
async fn test_promotion_without_stock_writes_nothing() {
    let pool = pool().await;
    let product_id = seed_product(&pool, 1999, 1).await;
    let user = user_id(&pool, &seed_user(&pool, UserRole::Customer).await).await;
    let gateway_id = gateway_order_id();
    stage_checkout(&pool, &gateway_id, user, product_id, 2, None).await;

    let result = OrderTempRepository::new(&pool)
        .promote(&gateway_id, "pay_short")
        .await;
    assert!(matches!(result, Err(RepositoryError::InsufficientStock(id)) if id == product_id));
    assert_eq!(count_by_gateway_order(&pool, "orders", &gateway_id).await, 0);
    assert_eq!(count_by_gateway_order(&pool, "order_temps", &gateway_id).await, 1);
    assert_eq!(stock_of(&pool, product_id).await, 1);
}

#[tokio::test]
#[ignore = "Requires database"]
async fn test_coupon_redeemed_elsewhere_blocks_promotion() {
    let pool = pool().await;
    let product_id = seed_product(&pool, 1999, 5).await;
    let user = user_id(&pool, &seed_user(&pool, UserRole::Customer).await).await;
    let coupon = seed_coupon(&pool, None).await;
    let gateway_id = gateway_order_id();
    stage_checkout(&pool, &gateway_id, user, product_id, 1, Some(&coupon)).await;

    place_cod_order(&pool, user, product_id, Some(&coupon))
        .await
        .expect("COD order with a fresh coupon");

    let result = OrderTempRepository::new(&pool)
        .promote(&gateway_id, "pay_late")
        .await;
    assert!(matches!(result, Err(RepositoryError::CouponRedeemed(id)) if id == coupon.id));
    assert_eq!(count_by_gateway_order(&pool, "orders", &gateway_id).await, 0);
    assert_eq!(stock_of(&pool, product_id).await, 4);
}

#[tokio::test]
#[ignore = "Requires database"]
async fn test_coupon_usage_limit_holds_across_orders() {
    let pool = pool().await;
    let product_id = seed_product(&pool, 1999, 5).await;
    let first = user_id(&pool, &seed_user(&pool, UserRole::Customer).await).await;
    let second = user_id(&pool, &seed_user(&pool, UserRole::Customer).await).await;
    let coupon = seed_coupon(&pool, Some(1)).await;
    let gateway_id = gateway_order_id();
    stage_checkout(&pool, &gateway_id, second, product_id, 1, Some(&coupon)).await;

    place_cod_order(&pool, first, product_id, Some(&coupon))
        .await
        .expect("first use of the coupon");
    let result = OrderTempRepository::new(&pool)
        .promote(&gateway_id, "pay_second")
        .await;
    assert!(matches!(result, Err(RepositoryError::CouponExhausted(_))));

    let stored = CouponRepository::new(&pool)
        .get_by_code(&coupon.code)
        .await
        .expect("Failed to load coupon")
        .expect("coupon exists");
    assert_eq!(stored.used_count, 1);
}

#[tokio::test]
#[ignore = "Requires database"]
async fn test_purge_expired_keeps_live_temps() {
    let pool = pool().await;
    let product_id = seed_product(&pool, 999, 5).await;
    let user = user_id(&pool, &seed_user(&pool, UserRole::Customer).await).await;
    let expired = gateway_order_id();
    let live = gateway_order_id();
    stage_checkout(&pool, &expired, user, product_id, 1, None).await;
    stage_checkout(&pool, &live, user, product_id, 1, None).await;
    sqlx::query(
        "UPDATE order_temps SET expires_at = NOW() - INTERVAL '1 hour' WHERE gateway_order_id = $1",
    )
    .bind(&expired)
    .execute(&pool)
    .await
    .expect("Failed to expire temp");

    let purged = OrderTempRepository::new(&pool)
        .purge_expired()
        .await
        .expect("Failed to purge");
    assert!(purged >= 1);
    assert_eq!(count_by_gateway_order(&pool, "order_temps", &expired).await, 0);
    assert_eq!(count_by_gateway_order(&pool, "order_temps", &live).await, 1);
}

#[tokio::test]
#[ignore = "Requires database"]
async fn test_unplaceable_capture_is_discarded_and_webhook_acknowledged() {
    let pool = pool().await;
    let product_id = seed_product(&pool, 1999, 5).await;
    let user = user_id(&pool, &seed_user(&pool, UserRole::Customer).await).await;
    let coupon = seed_coupon(&pool, None).await;
    let gateway_id = gateway_order_id();
    stage_checkout(&pool, &gateway_id, user, product_id, 1, Some(&coupon)).await;
    place_cod_order(&pool, user, product_id, Some(&coupon))
        .await
        .expect("COD order with a fresh coupon");

    let body = json!({
        "event": "payment.captured",
        "payload": {"payment": {"entity": {"id": "pay_hook", "order_id": &gateway_id}}}
    })
    .to_string();
    let checkout = Checkout::new(pool.clone());
    let outcome = checkout
        .service()
        .razorpay_webhook(body.as_bytes(), &sign(WEBHOOK_SECRET, body.as_bytes()))
        .await;

    assert!(matches!(outcome, Ok(None)));
    assert_eq!(count_by_gateway_order(&pool, "order_temps", &gateway_id).await, 0);
    assert_eq!(count_by_gateway_order(&pool, "orders", &gateway_id).await, 0);
}

#[tokio::test]
#[ignore = "Requires database"]
async fn test_unplaceable_confirmation_reports_the_coupon() {
    let pool = pool().await;
    let product_id = seed_product(&pool, 1999, 5).await;
    let user = user_id(&pool, &seed_user(&pool, UserRole::Customer).await).await;
    let coupon = seed_coupon(&pool, None).await;
    let gateway_id = gateway_order_id();
    stage_checkout(&pool, &gateway_id, user, product_id, 1, Some(&coupon)).await;
    place_cod_order(&pool, user, product_id, Some(&coupon))
        .await
        .expect("COD order with a fresh coupon");

    let signature = sign(KEY_SECRET, format!("{gateway_id}|pay_widget").as_bytes());
    let checkout = Checkout::new(pool.clone());
    let result = checkout
        .service()
        .confirm_razorpay(user, &gateway_id, "pay_widget", &signature)
        .await;

    assert!(matches!(
        result,
        Err(CheckoutError::Coupon(CouponError::AlreadyRedeemed))
    ));
    assert_eq!(count_by_gateway_order(&pool, "order_temps", &gateway_id).await, 0);
}
