//! Shiprocket request and response shapes.

use chrono::{DateTime, FixedOffset, Utc};
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use aurum_core::{Money, PaymentMethod};

use crate::models::OrderDetail;

/// Default parcel size for jewelry boxes, in centimetres.
const PACKAGE_LENGTH_CM: u32 = 10;
const PACKAGE_BREADTH_CM: u32 = 10;
const PACKAGE_HEIGHT_CM: u32 = 5;

/// UTC+05:30.
const IST_OFFSET_SECS: i32 = 19_800;

/// Shiprocket rejects weights below 100 g.
const MIN_WEIGHT_KG: f64 = 0.1;

/// Body of `POST /orders/create/adhoc`.
#[derive(Debug, Clone, Serialize)]
pub struct AdhocOrder {
    pub order_id: String,
    pub order_date: String,
    pub pickup_location: String,
    pub billing_customer_name: String,
    pub billing_last_name: String,
    pub billing_address: String,
    pub billing_address_2: String,
    pub billing_city: String,
    pub billing_pincode: String,
    pub billing_state: String,
    pub billing_country: String,
    pub billing_email: String,
    pub billing_phone: String,
    pub shipping_is_billing: bool,
    pub order_items: Vec<AdhocItem>,
    pub payment_method: &'static str,
    pub shipping_charges: f64,
    pub total_discount: f64,
    pub sub_total: f64,
    pub length: u32,
    pub breadth: u32,
    pub height: u32,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdhocItem {
    pub name: String,
    pub sku: String,
    pub units: u32,
    pub selling_price: f64,
    pub discount: f64,
}

impl AdhocOrder {
    /// Build the adhoc order for a placed order.
    #[must_use]
    pub fn from_order(detail: &OrderDetail, pickup_location: &str) -> Self {
        let order = &detail.order;
        let address = &order.shipping_address;

        let order_items = detail
            .items
            .iter()
            .map(|item| AdhocItem {
                name: item.name.clone(),
                sku: format!("AUR-{}", item.product_id),
                units: item.quantity,
                selling_price: to_f64(item.unit_price),
                discount: to_f64(item.discount),
            })
            .collect();

        let grams: u32 = detail
            .items
            .iter()
            .map(|i| i.weight_grams.saturating_mul(i.quantity))
            .sum();
        let weight = (f64::from(grams) / 1000.0).max(MIN_WEIGHT_KG);

        Self {
            order_id: order.order_number.clone(),
            order_date: ist_timestamp(order.created_at),
            pickup_location: pickup_location.to_owned(),
            billing_customer_name: address.full_name.clone(),
            billing_last_name: String::new(),
            billing_address: address.line1.clone(),
            billing_address_2: address.line2.clone().unwrap_or_default(),
            billing_city: address.city.clone(),
            billing_pincode: address.pincode.clone(),
            billing_state: address.state.clone(),
            billing_country: address.country.clone(),
            billing_email: address.email.clone(),
            billing_phone: address.phone.as_str().to_owned(),
            shipping_is_billing: true,
            order_items,
            payment_method: match order.payment_method {
                PaymentMethod::Cod => "COD",
                _ => "Prepaid",
            },
            shipping_charges: to_f64(order.shipping + order.cod_charge),
            total_discount: to_f64(order.offer_discount + order.coupon_discount),
            sub_total: to_f64(order.subtotal),
            length: PACKAGE_LENGTH_CM,
            breadth: PACKAGE_BREADTH_CM,
            height: PACKAGE_HEIGHT_CM,
            weight,
        }
    }
}

/// Shiprocket reads `order_date` as India Standard Time.
fn ist_timestamp(at: DateTime<Utc>) -> String {
    let local = FixedOffset::east_opt(IST_OFFSET_SECS)
        .map_or_else(|| at.naive_utc(), |ist| at.with_timezone(&ist).naive_local());
    local.format("%Y-%m-%d %H:%M").to_string()
}

fn to_f64(money: Money) -> f64 {
    money.amount().to_f64().unwrap_or_default()
}

/// Ids of a booked Shiprocket order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreatedShipment {
    pub order_id: i64,
    pub shipment_id: i64,
}

#[derive(Debug, Deserialize)]
pub(super) struct CreateOrderResponse {
    pub order_id: Option<i64>,
    pub shipment_id: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Courier assignment result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignedAwb {
    pub awb_code: String,
    pub courier_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct AssignAwbResponse {
    #[serde(default)]
    pub awb_assign_status: i64,
    pub response: Option<AssignAwbInner>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct AssignAwbInner {
    pub data: Option<AssignAwbData>,
}

#[derive(Debug, Deserialize)]
pub(super) struct AssignAwbData {
    pub awb_code: Option<String>,
    pub courier_name: Option<String>,
}

impl AssignAwbResponse {
    pub(super) fn into_awb(self) -> Result<AssignedAwb, String> {
        let data = self.response.and_then(|r| r.data);
        match data {
            Some(AssignAwbData {
                awb_code: Some(awb_code),
                courier_name,
            }) if self.awb_assign_status == 1 && !awb_code.is_empty() => Ok(AssignedAwb {
                awb_code,
                courier_name,
            }),
            _ => Err(self
                .message
                .unwrap_or_else(|| "no courier available".to_owned())),
        }
    }
}

/// A configured pickup address.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PickupLocation {
    pub pickup_location: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub pin_code: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub(super) struct PickupResponse {
    pub data: PickupData,
}

#[derive(Debug, Deserialize)]
pub(super) struct PickupData {
    #[serde(default)]
    pub shipping_address: Vec<PickupLocation>,
}

/// Tracking summary for an AWB.
#[derive(Debug, Clone, Serialize)]
pub struct Tracking {
    pub awb_code: String,
    pub current_status: Option<String>,
    pub courier_name: Option<String>,
    pub etd: Option<String>,
    pub track_url: Option<String>,
    pub activities: Vec<TrackingActivity>,
}

/// One scan event.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrackingActivity {
    pub date: String,
    #[serde(default)]
    pub activity: String,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct TrackResponse {
    pub tracking_data: TrackingData,
}

#[derive(Debug, Deserialize)]
pub(super) struct TrackingData {
    #[serde(default)]
    pub shipment_track: Vec<ShipmentTrack>,
    #[serde(default)]
    pub shipment_track_activities: Option<Vec<TrackingActivity>>,
    #[serde(default)]
    pub track_url: Option<String>,
    #[serde(default)]
    pub etd: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ShipmentTrack {
    #[serde(default)]
    pub current_status: Option<String>,
    #[serde(default)]
    pub courier_name: Option<String>,
}

impl TrackResponse {
    pub(super) fn into_tracking(self, awb_code: &str) -> Tracking {
        let data = self.tracking_data;
        let track = data.shipment_track.into_iter().next();
        Tracking {
            awb_code: awb_code.to_owned(),
            current_status: track.as_ref().and_then(|t| t.current_status.clone()),
            courier_name: track.and_then(|t| t.courier_name),
            etd: data.etd,
            track_url: data.track_url,
            activities: data.shipment_track_activities.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use aurum_core::{OrderId, OrderItemId, OrderStatus, PaymentStatus, Phone, ProductId, UserId};

    use super::*;
    use crate::models::{Order, OrderItem, ShippingAddress};

    fn detail(method: PaymentMethod, weight_grams: u32) -> OrderDetail {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 18, 45, 0).unwrap();
        OrderDetail {
            order: Order {
                id: OrderId::new(7),
                order_number: "AUR-20260302-004211".to_owned(),
                user_id: UserId::new(3),
                status: OrderStatus::Placed,
                payment_method: method,
                payment_status: PaymentStatus::Pending,
                gateway_order_id: None,
                gateway_payment_id: None,
                shipping_address: ShippingAddress {
                    full_name: "Asha Rao".to_owned(),
                    phone: Phone::parse("9876543210").unwrap(),
                    email: "asha@example.com".to_owned(),
                    line1: "12 MG Road".to_owned(),
                    line2: None,
                    city: "Bengaluru".to_owned(),
                    state: "Karnataka".to_owned(),
                    pincode: "560001".to_owned(),
                    country: "India".to_owned(),
                },
                subtotal: Money::from_rupees(3000),
                offer_discount: Money::from_rupees(300),
                coupon_discount: Money::ZERO,
                shipping: Money::ZERO,
                cod_charge: Money::from_rupees(49),
                total: Money::from_rupees(2749),
                coupon_code: None,
                shiprocket_order_id: None,
                shiprocket_shipment_id: None,
                awb_code: None,
                courier_name: None,
                cancel_reason: None,
                return_reason: None,
                delivered_at: None,
                created_at: now,
                updated_at: now,
            },
            items: vec![OrderItem {
                id: OrderItemId::new(1),
                order_id: OrderId::new(7),
                product_id: ProductId::new(11),
                name: "Kundan Choker".to_owned(),
                category: "Necklaces".to_owned(),
                image: None,
                unit_price: Money::from_rupees(1500),
                discount: Money::from_rupees(300),
                quantity: 2,
                weight_grams,
            }],
        }
    }

    #[test]
    fn test_adhoc_order_fields() {
        let adhoc = AdhocOrder::from_order(&detail(PaymentMethod::Cod, 40), "Primary");
        assert_eq!(adhoc.order_id, "AUR-20260302-004211");
        assert_eq!(adhoc.order_date, "2026-03-02 00:15");
        assert_eq!(adhoc.payment_method, "COD");
        assert_eq!(adhoc.billing_phone, "9876543210");
        assert_eq!(adhoc.order_items[0].sku, "AUR-11");
        assert!((adhoc.shipping_charges - 49.0).abs() < f64::EPSILON);
        assert!((adhoc.weight - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn test_prepaid_and_weight() {
        let adhoc = AdhocOrder::from_order(&detail(PaymentMethod::Razorpay, 250), "Primary");
        assert_eq!(adhoc.payment_method, "Prepaid");
        assert!((adhoc.weight - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_awb_response() {
        let ok: AssignAwbResponse = serde_json::from_str(
            r#"{"awb_assign_status": 1, "response": {"data": {"awb_code": "1411", "courier_name": "Delhivery"}}}"#,
        )
        .unwrap();
        assert_eq!(ok.into_awb().unwrap().awb_code, "1411");

        let failed: AssignAwbResponse = serde_json::from_str(
            r#"{"awb_assign_status": 0, "message": "Courier not serviceable"}"#,
        )
        .unwrap();
        assert_eq!(failed.into_awb().unwrap_err(), "Courier not serviceable");
    }

    #[test]
    fn test_tracking_response() {
        let response: TrackResponse = serde_json::from_str(
            r#"{"tracking_data": {
                "track_status": 1,
                "shipment_track": [{"current_status": "In Transit", "courier_name": "Bluedart"}],
                "shipment_track_activities": [
                    {"date": "2026-03-03 10:00:00", "status": "PKD", "activity": "Picked up", "location": "Mumbai"}
                ],
                "track_url": "https://shiprocket.co/tracking/1411",
                "etd": "2026-03-06"
            }}"#,
        )
        .unwrap();
        let tracking = response.into_tracking("1411");
        assert_eq!(tracking.current_status.as_deref(), Some("In Transit"));
        assert_eq!(tracking.activities.len(), 1);
        assert_eq!(tracking.activities[0].activity, "Picked up");
    }

    #[test]
    fn test_tracking_without_scans() {
        let response: TrackResponse = serde_json::from_str(
            r#"{"tracking_data": {"track_status": 0, "shipment_status": 0,
                "shipment_track": [], "shipment_track_activities": null,
                "error": "Aahh! There is no activities found in our DB."}}"#,
        )
        .unwrap();
        let tracking = response.into_tracking("1411");
        assert!(tracking.current_status.is_none());
        assert!(tracking.activities.is_empty());
    }
}
