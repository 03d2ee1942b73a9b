//! Orders, order items and the pre-capture staging record.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use aurum_core::{
    CouponId, Money, OrderId, OrderItemId, OrderStatus, OrderTempId, PaymentMethod,
    PaymentStatus, ProductId, UserId,
};

use super::ShippingAddress;
use crate::services::pricing::Quote;

/// Days after delivery during which a return can be requested.
pub const RETURN_WINDOW_DAYS: i64 = 7;

/// How long a staged prepaid checkout waits for its capture.
pub const ORDER_TEMP_TTL_HOURS: i64 = 24;

/// A placed order.
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub shipping_address: ShippingAddress,
    pub subtotal: Money,
    pub offer_discount: Money,
    pub coupon_discount: Money,
    pub shipping: Money,
    pub cod_charge: Money,
    pub total: Money,
    pub coupon_code: Option<String>,
    pub shiprocket_order_id: Option<i64>,
    pub shiprocket_shipment_id: Option<i64>,
    pub awb_code: Option<String>,
    pub courier_name: Option<String>,
    pub cancel_reason: Option<String>,
    pub return_reason: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Whether the payment went through a gateway and can be refunded.
    #[must_use]
    pub const fn is_refundable(&self) -> bool {
        self.payment_method.is_prepaid() && matches!(self.payment_status, PaymentStatus::Paid)
    }

    /// Whether a shipment has already been booked.
    #[must_use]
    pub const fn has_shipment(&self) -> bool {
        self.shiprocket_order_id.is_some()
    }

    /// Whether the customer may still ask for a return at `now`.
    #[must_use]
    pub fn can_request_return(&self, now: DateTime<Utc>) -> bool {
        self.status == OrderStatus::Delivered
            && self
                .delivered_at
                .is_some_and(|at| now <= at + Duration::days(RETURN_WINDOW_DAYS))
    }
}

/// A purchased product, frozen at order time.
#[derive(Debug, Clone, Serialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub name: String,
    pub category: String,
    pub image: Option<String>,
    pub unit_price: Money,
    pub discount: Money,
    pub quantity: u32,
    pub weight_grams: u32,
}

/// An order together with its items.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// A priced cart line ready to become an order item.
///
/// `discount` is the offer discount for the whole line, not per unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub name: String,
    pub category: String,
    pub image: Option<String>,
    pub unit_price: Money,
    pub discount: Money,
    pub quantity: u32,
    pub weight_grams: u32,
}

impl OrderLine {
    /// Line total after the offer discount.
    #[must_use]
    pub fn net_total(&self) -> Money {
        (self.unit_price * self.quantity).saturating_sub(self.discount)
    }
}

/// Everything needed to insert an order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: UserId,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub shipping_address: ShippingAddress,
    pub lines: Vec<OrderLine>,
    pub quote: Quote,
    pub coupon_id: Option<CouponId>,
    pub coupon_code: Option<String>,
}

/// A prepaid checkout waiting for the gateway to confirm capture.
#[derive(Debug, Clone, Serialize)]
pub struct OrderTemp {
    pub id: OrderTempId,
    pub gateway_order_id: String,
    pub payment_method: PaymentMethod,
    pub user_id: UserId,
    pub shipping_address: ShippingAddress,
    pub lines: Vec<OrderLine>,
    pub quote: Quote,
    pub coupon_id: Option<CouponId>,
    pub coupon_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl OrderTemp {
    /// Turn the staged checkout into a paid order.
    #[must_use]
    pub fn into_new_order(self, gateway_payment_id: String) -> NewOrder {
        NewOrder {
            user_id: self.user_id,
            payment_method: self.payment_method,
            payment_status: PaymentStatus::Paid,
            gateway_order_id: Some(self.gateway_order_id),
            gateway_payment_id: Some(gateway_payment_id),
            shipping_address: self.shipping_address,
            lines: self.lines,
            quote: self.quote,
            coupon_id: self.coupon_id,
            coupon_code: self.coupon_code,
        }
    }
}

/// Human-facing order number: `AUR-YYYYMMDD-NNNNNN`.
#[must_use]
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    let suffix: u32 = rand::rng().random_range(0..1_000_000);
    format!("AUR-{}-{suffix:06}", now.format("%Y%m%d"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_order_number_format() {
        let now = Utc.with_ymd_and_hms(2026, 3, 9, 10, 0, 0).unwrap();
        let number = generate_order_number(now);
        assert!(number.starts_with("AUR-20260309-"), "{number}");
        assert_eq!(number.len(), "AUR-20260309-000000".len());
    }

    #[test]
    fn test_line_net_total() {
        let line = OrderLine {
            product_id: ProductId::new(1),
            name: "Jhumka".to_owned(),
            category: "Earrings".to_owned(),
            image: None,
            unit_price: Money::from_rupees(1000),
            discount: Money::from_rupees(300),
            quantity: 2,
            weight_grams: 40,
        };
        assert_eq!(line.net_total(), Money::from_rupees(1700));
    }
}
