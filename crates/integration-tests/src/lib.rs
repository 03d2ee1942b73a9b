//! Integration tests for the Aurum storefront.
//!
//! The tests talk HTTP to a running server and seed fixtures straight into
//! its database, so both must be up:
//!
//! ```bash
//! cargo run -p aurum-cli -- migrate
//! cargo run -p aurum-storefront &
//! cargo test -p aurum-integration-tests -- --ignored
//! ```
//!
//! `AURUM_TEST_URL` (default `http://localhost:3000`) and
//! `AURUM_DATABASE_URL` point the tests at the server and its database.
//! Every fixture uses a random email or slug, so runs never collide.

#![allow(clippy::expect_used, clippy::missing_panics_doc, clippy::indexing_slicing)]

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use secrecy::SecretString;
use serde_json::{Value, json};
use sqlx::PgPool;
use uuid::Uuid;

use aurum_core::{
    DiscountKind, Email, Money, PaymentMethod, PaymentStatus, Phone, ProductId, UserId, UserRole,
};
use aurum_storefront::db::orders::NewOrderTemp;
use aurum_storefront::db::users::NewUser;
use aurum_storefront::db::{
    CouponRepository, OrderRepository, OrderTempRepository, ProductRepository, UserRepository,
    create_pool,
};
use aurum_storefront::models::{
    Coupon, CouponInput, NewOrder, Order, OrderLine, OrderTemp, ProductInput, ShippingAddress,
};
use aurum_storefront::services::auth::hash_password;
use aurum_storefront::services::pricing::Quote;

/// Password given to every seeded account.
pub const TEST_PASSWORD: &str = "integration-pass-1";

/// Base URL of the server under test.
#[must_use]
pub fn base_url() -> String {
    std::env::var("AURUM_TEST_URL").unwrap_or_else(|_| "http://localhost:3000".to_owned())
}

/// A client that keeps the session cookie between requests.
///
/// Each client claims its own forwarded address so the per-IP limiter on
/// `/auth` treats parallel tests as different visitors.
#[must_use]
pub fn client() -> Client {
    let octets = Uuid::new_v4().into_bytes();
    let forwarded = format!("10.{}.{}.{}", octets[0], octets[1], octets[2]);
    let mut headers = HeaderMap::new();
    headers.insert(
        "x-forwarded-for",
        HeaderValue::from_str(&forwarded).expect("valid header"),
    );
    Client::builder()
        .cookie_store(true)
        .default_headers(headers)
        .build()
        .expect("Failed to create HTTP client")
}

/// Pool on the server's database, for fixtures.
pub async fn pool() -> PgPool {
    let url = std::env::var("AURUM_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .expect("AURUM_DATABASE_URL must be set for integration tests");
    create_pool(&SecretString::from(url))
        .await
        .expect("Failed to connect to test database")
}

/// A unique address on the reserved example domain.
#[must_use]
pub fn unique_email(prefix: &str) -> String {
    format!("{prefix}-{}@example.com", Uuid::new_v4().simple())
}

/// Insert a verified account and return its email.
pub async fn seed_user(pool: &PgPool, role: UserRole) -> String {
    let email = unique_email(role.as_str());
    let parsed = Email::parse(&email).expect("valid email");
    let hash = hash_password(TEST_PASSWORD).expect("hash");
    UserRepository::new(pool)
        .create(&NewUser {
            name: "Integration Tester",
            email: &parsed,
            phone: None,
            password_hash: &hash,
            role,
            email_verified: true,
        })
        .await
        .expect("Failed to seed user");
    email
}

/// Insert an active product with `stock` units and return its id.
pub async fn seed_product(pool: &PgPool, price_rupees: u32, stock: u32) -> ProductId {
    let input = ProductInput {
        name: format!("Test Pendant {}", Uuid::new_v4().simple()),
        slug: None,
        description: "Integration fixture".to_owned(),
        category: "Pendants".to_owned(),
        brand: Some("Aurum".to_owned()),
        material: Some("Gold".to_owned()),
        color: Some("Yellow".to_owned()),
        price: Money::from_rupees(price_rupees),
        compare_at_price: None,
        stock,
        weight_grams: 10,
        images: Vec::new(),
        is_active: true,
    }
    .normalize()
    .expect("valid product");
    ProductRepository::new(pool)
        .create(&input)
        .await
        .expect("Failed to seed product")
        .id
}

/// Log `client` in and return the user JSON.
pub async fn login(client: &Client, email: &str) -> Value {
    let resp = client
        .post(format!("{}/auth/login", base_url()))
        .json(&json!({ "email": email, "password": TEST_PASSWORD }))
        .send()
        .await
        .expect("Failed to log in");
    assert_eq!(resp.status(), StatusCode::OK, "login failed for {email}");
    resp.json::<Value>().await.expect("Invalid login body")["user"].clone()
}

/// Save a shipping address for the logged-in client and return its id.
pub async fn create_address(client: &Client) -> i64 {
    let resp = client
        .post(format!("{}/address", base_url()))
        .json(&json!({
            "full_name": "Integration Tester",
            "phone": "9876543210",
            "line1": "12 MG Road",
            "city": "Bengaluru",
            "state": "Karnataka",
            "pincode": "560001",
        }))
        .send()
        .await
        .expect("Failed to create address");
    assert_eq!(resp.status(), StatusCode::CREATED);
    resp.json::<Value>().await.expect("Invalid address body")["id"]
        .as_i64()
        .expect("address id")
}

// =============================================================================
// Order fixtures
// =============================================================================

/// Id of an account seeded with [`seed_user`].
pub async fn user_id(pool: &PgPool, email: &str) -> UserId {
    UserRepository::new(pool)
        .get_by_email(&Email::parse(email).expect("valid email"))
        .await
        .expect("Failed to load user")
        .expect("seeded user exists")
        .id
}

/// A fresh gateway order id in Razorpay's shape.
#[must_use]
pub fn gateway_order_id() -> String {
    format!("order_{}", Uuid::new_v4().simple())
}

/// Insert a coupon worth 10% with an optional usage limit.
pub async fn seed_coupon(pool: &PgPool, usage_limit: Option<u32>) -> Coupon {
    let input = CouponInput {
        code: format!("IT{}", &Uuid::new_v4().simple().to_string()[..10]),
        description: "Integration fixture".to_owned(),
        kind: DiscountKind::Percent,
        value: 10.into(),
        min_order: Money::ZERO,
        max_discount: None,
        usage_limit,
        expires_at: None,
        is_active: true,
    }
    .normalize()
    .expect("valid coupon");
    CouponRepository::new(pool)
        .create(&input)
        .await
        .expect("Failed to seed coupon")
}

fn shipping_address() -> ShippingAddress {
    ShippingAddress {
        full_name: "Integration Tester".to_owned(),
        phone: Phone::parse("9876543210").expect("valid phone"),
        email: "tester@example.com".to_owned(),
        line1: "12 MG Road".to_owned(),
        line2: None,
        city: "Bengaluru".to_owned(),
        state: "Karnataka".to_owned(),
        pincode: "560001".to_owned(),
        country: "India".to_owned(),
    }
}

async fn order_line(pool: &PgPool, product_id: ProductId, quantity: u32) -> OrderLine {
    let product = ProductRepository::new(pool)
        .get_by_id(product_id)
        .await
        .expect("Failed to load product")
        .expect("seeded product exists");
    OrderLine {
        product_id,
        name: product.name,
        category: product.category,
        image: None,
        unit_price: product.price,
        discount: Money::ZERO,
        quantity,
        weight_grams: product.weight_grams,
    }
}

fn quote_for(lines: &[OrderLine]) -> Quote {
    let subtotal = lines
        .iter()
        .fold(Money::ZERO, |acc, line| acc + line.net_total());
    Quote {
        subtotal,
        total: subtotal,
        ..Quote::default()
    }
}

/// Stage a Razorpay checkout of `quantity` units, as `POST /order/checkout` does.
pub async fn stage_checkout(
    pool: &PgPool,
    gateway_order_id: &str,
    user_id: UserId,
    product_id: ProductId,
    quantity: u32,
    coupon: Option<&Coupon>,
) -> OrderTemp {
    let lines = vec![order_line(pool, product_id, quantity).await];
    let quote = quote_for(&lines);
    OrderTempRepository::new(pool)
        .create(&NewOrderTemp {
            gateway_order_id,
            payment_method: PaymentMethod::Razorpay,
            user_id,
            shipping_address: &shipping_address(),
            lines: &lines,
            quote: &quote,
            coupon_id: coupon.map(|c| c.id),
            coupon_code: coupon.map(|c| c.code.as_str()),
        })
        .await
        .expect("Failed to stage checkout")
}

/// Place a cash-on-delivery order of one unit straight through the repository.
pub async fn place_cod_order(
    pool: &PgPool,
    user_id: UserId,
    product_id: ProductId,
    coupon: Option<&Coupon>,
) -> Result<Order, aurum_storefront::db::RepositoryError> {
    let lines = vec![order_line(pool, product_id, 1).await];
    let quote = quote_for(&lines);
    OrderRepository::new(pool)
        .create(&NewOrder {
            user_id,
            payment_method: PaymentMethod::Cod,
            payment_status: PaymentStatus::Pending,
            gateway_order_id: None,
            gateway_payment_id: None,
            shipping_address: shipping_address(),
            lines,
            quote,
            coupon_id: coupon.map(|c| c.id),
            coupon_code: coupon.map(|c| c.code.clone()),
        })
        .await
}

/// Rows in `table` matching `gateway_order_id`.
pub async fn count_by_gateway_order(pool: &PgPool, table: &str, gateway_order_id: &str) -> i64 {
    sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM {table} WHERE gateway_order_id = $1"
    ))
    .bind(gateway_order_id)
    .fetch_one(pool)
    .await
    .expect("Failed to count rows")
}

/// Current stock of a product.
pub async fn stock_of(pool: &PgPool, product_id: ProductId) -> u32 {
    ProductRepository::new(pool)
        .get_by_id(product_id)
        .await
        .expect("Failed to load product")
        .expect("product exists")
        .stock
}
