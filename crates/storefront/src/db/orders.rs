//! Order and order-temp repositories.
//!
//! Order creation is a single transaction: insert the order and its items,
//! decrement stock with a conditional update, record the coupon redemption,
//! and drop the purchased lines from the cart. A stock update that matches
//! no row aborts everything with `InsufficientStock`.

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};

use aurum_core::{
    CouponId, Money, OrderId, OrderItemId, OrderStatus, OrderTempId, PaymentMethod,
    PaymentStatus, ProductId, UserId,
};

use super::{Page, Pagination, RepositoryError, positive_u32};
use crate::models::order::generate_order_number;
use crate::models::{NewOrder, Order, OrderDetail, OrderItem, OrderLine, OrderTemp, ShippingAddress};
use crate::services::pricing::Quote;

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: i32,
    order_number: String,
    user_id: i32,
    status: OrderStatus,
    payment_method: PaymentMethod,
    payment_status: PaymentStatus,
    gateway_order_id: Option<String>,
    gateway_payment_id: Option<String>,
    shipping_address: Json<ShippingAddress>,
    subtotal: Money,
    offer_discount: Money,
    coupon_discount: Money,
    shipping: Money,
    cod_charge: Money,
    total: Money,
    coupon_code: Option<String>,
    shiprocket_order_id: Option<i64>,
    shiprocket_shipment_id: Option<i64>,
    awb_code: Option<String>,
    courier_name: Option<String>,
    cancel_reason: Option<String>,
    return_reason: Option<String>,
    delivered_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<OrderRow> for Order {
    fn from(row: OrderRow) -> Self {
        Self {
            id: OrderId::new(row.id),
            order_number: row.order_number,
            user_id: UserId::new(row.user_id),
            status: row.status,
            payment_method: row.payment_method,
            payment_status: row.payment_status,
            gateway_order_id: row.gateway_order_id,
            gateway_payment_id: row.gateway_payment_id,
            shipping_address: row.shipping_address.0,
            subtotal: row.subtotal,
            offer_discount: row.offer_discount,
            coupon_discount: row.coupon_discount,
            shipping: row.shipping,
            cod_charge: row.cod_charge,
            total: row.total,
            coupon_code: row.coupon_code,
            shiprocket_order_id: row.shiprocket_order_id,
            shiprocket_shipment_id: row.shiprocket_shipment_id,
            awb_code: row.awb_code,
            courier_name: row.courier_name,
            cancel_reason: row.cancel_reason,
            return_reason: row.return_reason,
            delivered_at: row.delivered_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow {
    id: i32,
    order_id: i32,
    product_id: i32,
    name: String,
    category: String,
    image: Option<String>,
    unit_price: Money,
    discount: Money,
    quantity: i32,
    weight_grams: i32,
}

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = RepositoryError;

    fn try_from(row: OrderItemRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: OrderItemId::new(row.id),
            order_id: OrderId::new(row.order_id),
            product_id: ProductId::new(row.product_id),
            name: row.name,
            category: row.category,
            image: row.image,
            unit_price: row.unit_price,
            discount: row.discount,
            quantity: positive_u32(row.quantity, "quantity")?,
            weight_grams: positive_u32(row.weight_grams, "weight_grams")?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderTempRow {
    id: i32,
    gateway_order_id: String,
    payment_method: PaymentMethod,
    user_id: i32,
    shipping_address: Json<ShippingAddress>,
    lines: Json<Vec<OrderLine>>,
    quote: Json<Quote>,
    coupon_id: Option<i32>,
    coupon_code: Option<String>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl From<OrderTempRow> for OrderTemp {
    fn from(row: OrderTempRow) -> Self {
        Self {
            id: OrderTempId::new(row.id),
            gateway_order_id: row.gateway_order_id,
            payment_method: row.payment_method,
            user_id: UserId::new(row.user_id),
            shipping_address: row.shipping_address.0,
            lines: row.lines.0,
            quote: row.quote.0,
            coupon_id: row.coupon_id.map(CouponId::new),
            coupon_code: row.coupon_code,
            created_at: row.created_at,
            expires_at: row.expires_at,
        }
    }
}

const ORDER_COLUMNS: &str = "id, order_number, user_id, status, payment_method, payment_status, \
     gateway_order_id, gateway_payment_id, shipping_address, subtotal, offer_discount, \
     coupon_discount, shipping, cod_charge, total, coupon_code, shiprocket_order_id, \
     shiprocket_shipment_id, awb_code, courier_name, cancel_reason, return_reason, delivered_at, \
     created_at, updated_at";

const ORDER_ITEM_COLUMNS: &str =
    "id, order_id, product_id, name, category, image, unit_price, discount, quantity, weight_grams";

const ORDER_TEMP_COLUMNS: &str = "id, gateway_order_id, payment_method, user_id, \
     shipping_address, lines, quote, coupon_id, coupon_code, created_at, expires_at";

/// Attempts at drawing an unused order number before giving up.
const ORDER_NUMBER_ATTEMPTS: usize = 5;

fn quantity_i32(quantity: u32) -> Result<i32, RepositoryError> {
    i32::try_from(quantity).map_err(|_| RepositoryError::Conflict("quantity is too large".to_owned()))
}

/// Extra column writes that accompany a status change.
#[derive(Debug, Clone, Default)]
pub struct StatusChange<'a> {
    pub cancel_reason: Option<&'a str>,
    pub return_reason: Option<&'a str>,
    pub payment_status: Option<PaymentStatus>,
}

// =============================================================================
// Orders
// =============================================================================

/// Repository for placed orders.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Place an order atomically.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::InsufficientStock` if any line can't be
    /// covered; nothing is written in that case.
    pub async fn create(&self, new: &NewOrder) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let order = insert_order(&mut tx, new).await?;
        tx.commit().await?;
        Ok(order)
    }

    /// An order by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// An order with its items; `owner` restricts it to one customer.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn detail(
        &self,
        id: OrderId,
        owner: Option<UserId>,
    ) -> Result<Option<OrderDetail>, RepositoryError> {
        let Some(order) = self.get(id).await? else {
            return Ok(None);
        };
        if owner.is_some_and(|user_id| user_id != order.user_id) {
            return Ok(None);
        }
        let items = self.items(id).await?;
        Ok(Some(OrderDetail { order, items }))
    }

    /// Items of an order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn items(&self, order_id: OrderId) -> Result<Vec<OrderItem>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderItemRow>(&format!(
            "SELECT {ORDER_ITEM_COLUMNS} FROM order_items WHERE order_id = $1 ORDER BY id"
        ))
        .bind(order_id)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// The order created from a gateway order, if any.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_gateway_order_id(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE gateway_order_id = $1"
        ))
        .bind(gateway_order_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// A customer's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn list_for_user(
        &self,
        user_id: UserId,
        pagination: Pagination,
    ) -> Result<Page<Order>, RepositoryError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(self.pool)
            .await?;

        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            SELECT {ORDER_COLUMNS} FROM orders
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "
        ))
        .bind(user_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(self.pool)
        .await?;

        Ok(Page::new(
            rows.into_iter().map(Into::into).collect(),
            total,
            pagination.page,
            pagination.per_page,
        ))
    }

    /// All orders, optionally filtered by status, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn list(
        &self,
        status: Option<OrderStatus>,
        pagination: Pagination,
    ) -> Result<Page<Order>, RepositoryError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM orders");
        if let Some(status) = status {
            count.push(" WHERE status = ").push_bind(status);
        }
        let total: i64 = count.build_query_scalar().fetch_one(self.pool).await?;

        let mut query = QueryBuilder::<Postgres>::new(format!("SELECT {ORDER_COLUMNS} FROM orders"));
        if let Some(status) = status {
            query.push(" WHERE status = ").push_bind(status);
        }
        query
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(pagination.limit())
            .push(" OFFSET ")
            .push_bind(pagination.offset());
        let rows: Vec<OrderRow> = query.build_query_as().fetch_all(self.pool).await?;

        Ok(Page::new(
            rows.into_iter().map(Into::into).collect(),
            total,
            pagination.page,
            pagination.per_page,
        ))
    }

    /// Move an order to `to`, validating the transition against the locked row.
    ///
    /// Cancelled and Returned put the items back into stock. Delivered
    /// stamps `delivered_at`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order doesn't exist.
    /// Returns `RepositoryError::Conflict` if the transition isn't allowed.
    pub async fn transition(
        &self,
        id: OrderId,
        to: OrderStatus,
        change: &StatusChange<'_>,
    ) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let from: OrderStatus =
            sqlx::query_scalar("SELECT status FROM orders WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(RepositoryError::NotFound)?;

        if !from.can_transition_to(to) {
            return Err(RepositoryError::Conflict(format!(
                "order cannot move from {from} to {to}"
            )));
        }

        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            UPDATE orders SET
                status = $2,
                cancel_reason = COALESCE($3, cancel_reason),
                return_reason = COALESCE($4, return_reason),
                payment_status = COALESCE($5, payment_status),
                delivered_at = CASE WHEN $2 = 'delivered'::order_status AND delivered_at IS NULL
                                    THEN NOW() ELSE delivered_at END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(id)
        .bind(to)
        .bind(change.cancel_reason)
        .bind(change.return_reason)
        .bind(change.payment_status)
        .fetch_one(&mut *tx)
        .await?;

        if matches!(to, OrderStatus::Cancelled | OrderStatus::Returned) {
            restock(&mut tx, id).await?;
        }

        tx.commit().await?;
        Ok(row.into())
    }

    /// Record a payment status change, e.g. after a refund.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order doesn't exist.
    pub async fn set_payment_status(
        &self,
        id: OrderId,
        status: PaymentStatus,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE orders SET payment_status = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(status)
        .execute(self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Record the Shiprocket order and shipment.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order doesn't exist.
    pub async fn set_shipment(
        &self,
        id: OrderId,
        shiprocket_order_id: i64,
        shipment_id: i64,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE orders SET shiprocket_order_id = $2, shiprocket_shipment_id = $3, updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(shiprocket_order_id)
        .bind(shipment_id)
        .execute(self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Record the assigned courier and AWB.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order doesn't exist.
    pub async fn set_awb(
        &self,
        id: OrderId,
        awb_code: &str,
        courier_name: &str,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE orders SET awb_code = $2, courier_name = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(awb_code)
        .bind(courier_name)
        .execute(self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

/// Insert an order, its items, the stock decrements, the coupon redemption,
/// and remove the purchased products from the cart.
async fn insert_order(conn: &mut PgConnection, new: &NewOrder) -> Result<Order, RepositoryError> {
    if let Some(coupon_id) = new.coupon_id {
        claim_coupon(conn, coupon_id, new.user_id).await?;
    }

    let mut inserted = None;
    for _ in 0..ORDER_NUMBER_ATTEMPTS {
        let order_number = generate_order_number(Utc::now());
        inserted = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            INSERT INTO orders (order_number, user_id, status, payment_method, payment_status,
                                gateway_order_id, gateway_payment_id, shipping_address,
                                subtotal, offer_discount, coupon_discount, shipping, cod_charge,
                                total, coupon_code)
            VALUES ($1, $2, 'placed', $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (order_number) DO NOTHING
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(&order_number)
        .bind(new.user_id)
        .bind(new.payment_method)
        .bind(new.payment_status)
        .bind(&new.gateway_order_id)
        .bind(&new.gateway_payment_id)
        .bind(Json(&new.shipping_address))
        .bind(new.quote.subtotal)
        .bind(new.quote.offer_discount)
        .bind(new.quote.coupon_discount)
        .bind(new.quote.shipping)
        .bind(new.quote.cod_charge)
        .bind(new.quote.total)
        .bind(&new.coupon_code)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| RepositoryError::conflict_on_unique(e, "gateway order already used"))?;
        if inserted.is_some() {
            break;
        }
    }
    let order: Order = inserted
        .ok_or_else(|| RepositoryError::Conflict("could not allocate an order number".to_owned()))?
        .into();

    for line in &new.lines {
        let quantity = quantity_i32(line.quantity)?;
        let weight = quantity_i32(line.weight_grams)?;

        let decremented = sqlx::query(
            "UPDATE products SET stock = stock - $2, updated_at = NOW() WHERE id = $1 AND stock >= $2",
        )
        .bind(line.product_id)
        .bind(quantity)
        .execute(&mut *conn)
        .await?;
        if decremented.rows_affected() == 0 {
            return Err(RepositoryError::InsufficientStock(line.product_id));
        }

        sqlx::query(
            r"
            INSERT INTO order_items (order_id, product_id, name, category, image, unit_price, discount, quantity, weight_grams)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ",
        )
        .bind(order.id)
        .bind(line.product_id)
        .bind(&line.name)
        .bind(&line.category)
        .bind(&line.image)
        .bind(line.unit_price)
        .bind(line.discount)
        .bind(quantity)
        .bind(weight)
        .execute(&mut *conn)
        .await?;
    }

    if let Some(coupon_id) = new.coupon_id {
        sqlx::query(
            "INSERT INTO coupon_redemptions (coupon_id, user_id, order_id) VALUES ($1, $2, $3)",
        )
        .bind(coupon_id)
        .bind(new.user_id)
        .bind(order.id)
        .execute(&mut *conn)
        .await?;

        sqlx::query("UPDATE coupons SET used_count = used_count + 1 WHERE id = $1")
            .bind(coupon_id)
            .execute(&mut *conn)
            .await?;
    }

    let purchased: Vec<ProductId> = new.lines.iter().map(|l| l.product_id).collect();
    sqlx::query("DELETE FROM cart_items WHERE user_id = $1 AND product_id = ANY($2)")
        .bind(new.user_id)
        .bind(&purchased)
        .execute(&mut *conn)
        .await?;

    Ok(order)
}

/// Lock the coupon row and check it can still be redeemed by `user_id`.
///
/// Concurrent orders using the same coupon serialise on the lock, so the
/// usage limit and the one-per-shopper rule hold across them.
async fn claim_coupon(
    conn: &mut PgConnection,
    coupon_id: CouponId,
    user_id: UserId,
) -> Result<(), RepositoryError> {
    let (usage_limit, used_count): (Option<i32>, i32) =
        sqlx::query_as("SELECT usage_limit, used_count FROM coupons WHERE id = $1 FOR UPDATE")
            .bind(coupon_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or(RepositoryError::CouponExhausted(coupon_id))?;
    if usage_limit.is_some_and(|limit| used_count >= limit) {
        return Err(RepositoryError::CouponExhausted(coupon_id));
    }

    let redeemed: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM coupon_redemptions WHERE coupon_id = $1 AND user_id = $2)",
    )
    .bind(coupon_id)
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await?;
    if redeemed {
        return Err(RepositoryError::CouponRedeemed(coupon_id));
    }
    Ok(())
}

async fn restock(conn: &mut PgConnection, order_id: OrderId) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        UPDATE products p SET stock = p.stock + i.quantity, updated_at = NOW()
        FROM order_items i
        WHERE i.order_id = $1 AND i.product_id = p.id
        ",
    )
    .bind(order_id)
    .execute(conn)
    .await?;
    Ok(())
}

// =============================================================================
// Order temps
// =============================================================================

/// A staged prepaid checkout to persist.
#[derive(Debug, Clone)]
pub struct NewOrderTemp<'a> {
    pub gateway_order_id: &'a str,
    pub payment_method: PaymentMethod,
    pub user_id: UserId,
    pub shipping_address: &'a ShippingAddress,
    pub lines: &'a [OrderLine],
    pub quote: &'a Quote,
    pub coupon_id: Option<CouponId>,
    pub coupon_code: Option<&'a str>,
}

/// Outcome of promoting a staged checkout.
#[derive(Debug, Clone)]
pub enum Promotion {
    /// This call created the order.
    Created(Order),
    /// An earlier call (or webhook) already did.
    AlreadyPromoted(Order),
}

impl Promotion {
    #[must_use]
    pub fn into_order(self) -> Order {
        match self {
            Self::Created(order) | Self::AlreadyPromoted(order) => order,
        }
    }
}

/// Repository for staged prepaid checkouts.
pub struct OrderTempRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderTempRepository<'a> {
    /// Create a new order-temp repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Stage a checkout under its gateway order id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the gateway order id is already staged.
    pub async fn create(&self, temp: &NewOrderTemp<'_>) -> Result<OrderTemp, RepositoryError> {
        let row = sqlx::query_as::<_, OrderTempRow>(&format!(
            r"
            INSERT INTO order_temps (gateway_order_id, payment_method, user_id, shipping_address,
                                     lines, quote, coupon_id, coupon_code)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {ORDER_TEMP_COLUMNS}
            "
        ))
        .bind(temp.gateway_order_id)
        .bind(temp.payment_method)
        .bind(temp.user_id)
        .bind(Json(temp.shipping_address))
        .bind(Json(temp.lines))
        .bind(Json(temp.quote))
        .bind(temp.coupon_id)
        .bind(temp.coupon_code)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::conflict_on_unique(e, "gateway order already staged"))?;

        Ok(row.into())
    }

    /// A staged checkout by gateway order id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, gateway_order_id: &str) -> Result<Option<OrderTemp>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderTempRow>(&format!(
            "SELECT {ORDER_TEMP_COLUMNS} FROM order_temps WHERE gateway_order_id = $1"
        ))
        .bind(gateway_order_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// Turn a staged checkout into a paid order.
    ///
    /// The staging row is locked for the whole transaction, so concurrent
    /// confirmations of one gateway order serialise and the loser sees the
    /// winner's order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if neither a staged checkout nor
    /// an order exists for this gateway order id.
    /// Returns `RepositoryError::InsufficientStock`, `CouponRedeemed` or
    /// `CouponExhausted` if the staged order can no longer be honoured; the
    /// staging row is left in place for the caller to refund and discard.
    pub async fn promote(
        &self,
        gateway_order_id: &str,
        gateway_payment_id: &str,
    ) -> Result<Promotion, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let temp = sqlx::query_as::<_, OrderTempRow>(&format!(
            "SELECT {ORDER_TEMP_COLUMNS} FROM order_temps WHERE gateway_order_id = $1 FOR UPDATE"
        ))
        .bind(gateway_order_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(temp) = temp else {
            tx.rollback().await?;
            return OrderRepository::new(self.pool)
                .get_by_gateway_order_id(gateway_order_id)
                .await?
                .map(Promotion::AlreadyPromoted)
                .ok_or(RepositoryError::NotFound);
        };

        let temp_id = temp.id;
        let new = OrderTemp::from(temp).into_new_order(gateway_payment_id.to_owned());
        let order = insert_order(&mut tx, &new).await?;

        sqlx::query("DELETE FROM order_temps WHERE id = $1")
            .bind(temp_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Promotion::Created(order))
    }

    /// Discard a staged checkout.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete(&self, gateway_order_id: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM order_temps WHERE gateway_order_id = $1")
            .bind(gateway_order_id)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete staged checkouts whose capture never arrived.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn purge_expired(&self) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM order_temps WHERE expires_at <= NOW()")
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
