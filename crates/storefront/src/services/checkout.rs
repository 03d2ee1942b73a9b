//! Checkout and the order lifecycle after it.
//!
//! # Flow
//!
//! - COD orders are written straight away with payment `pending`
//! - Prepaid orders first create a gateway order, then stage the priced cart
//!   as an `OrderTemp` keyed by the gateway order id
//! - Confirmation (browser callback or webhook, whichever arrives first)
//!   promotes the staging record into a paid order exactly once
//! - Shipment booking and emails run after the order is committed and never
//!   undo it

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use thiserror::Error;

use aurum_core::{
    AddressId, OrderId, OrderStatus, PaymentMethod, PaymentStatus, UserId,
};

use crate::config::PricingConfig;
use crate::db::orders::{NewOrderTemp, Promotion, StatusChange};
use crate::db::{
    AddressRepository, CartRepository, CouponRepository, OfferRepository, OrderRepository,
    OrderTempRepository, Page, Pagination, RepositoryError,
};
use crate::models::order::RETURN_WINDOW_DAYS;
use crate::models::promotion::normalize_code;
use crate::models::{Coupon, NewOrder, Order, OrderDetail, OrderLine, OrderTemp, ShippingAddress, User};
use crate::payments::{Gateways, PaymentError, razorpay};
use crate::services::email::EmailService;
use crate::services::pricing::{self, AppliedCoupon, CouponError, PricedLine, Quote};
use crate::shiprocket::{ShiprocketClient, ShiprocketError, Tracking};

/// Errors from checkout and order changes.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("your cart is empty")]
    EmptyCart,

    #[error("address not found")]
    AddressNotFound,

    #[error("{0} is out of stock")]
    OutOfStock(String),

    #[error(transparent)]
    Coupon(#[from] CouponError),

    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error("no pending payment matches this confirmation")]
    PaymentNotFound,

    #[error("order not found")]
    OrderNotFound,

    #[error("please tell us the reason")]
    ReasonRequired,

    #[error("a {0} order can no longer be cancelled")]
    NotCancellable(OrderStatus),

    #[error("returns are accepted within {RETURN_WINDOW_DAYS} days of delivery")]
    ReturnWindowClosed,

    #[error("{0}")]
    Conflict(String),

    #[error("shipping is not configured")]
    ShippingNotConfigured,

    #[error(transparent)]
    Shipping(#[from] ShiprocketError),

    #[error(transparent)]
    Repository(RepositoryError),
}

impl From<RepositoryError> for CheckoutError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::InsufficientStock(product_id) => {
                Self::OutOfStock(format!("product {product_id}"))
            }
            RepositoryError::CouponRedeemed(_) => Self::Coupon(CouponError::AlreadyRedeemed),
            RepositoryError::CouponExhausted(_) => Self::Coupon(CouponError::UsageLimitReached),
            RepositoryError::Conflict(message) => Self::Conflict(message),
            RepositoryError::NotFound => Self::OrderNotFound,
            other => Self::Repository(other),
        }
    }
}

/// What the shopper submits to place an order.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    pub address_id: AddressId,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub coupon_code: Option<String>,
}

/// What the client must do next.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "next", rename_all = "snake_case")]
pub enum CheckoutOutcome {
    /// The order exists; nothing left to pay online.
    Placed { order: Order },
    /// Open Razorpay Checkout with these values.
    Razorpay {
        key_id: String,
        razorpay_order_id: String,
        amount: i64,
        currency: String,
        quote: Quote,
    },
    /// Redirect to PayPal for approval.
    Paypal {
        paypal_order_id: String,
        approve_url: String,
        quote: Quote,
    },
    /// Redirect to the Stripe hosted checkout.
    Stripe {
        session_id: String,
        checkout_url: String,
        quote: Quote,
    },
}

/// Shipment state of an order, with live tracking when available.
#[derive(Debug, Clone, Serialize)]
pub struct OrderTracking {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub awb_code: Option<String>,
    pub courier_name: Option<String>,
    pub tracking: Option<Tracking>,
}

/// A priced cart ready to become an order.
struct PreparedCheckout {
    lines: Vec<OrderLine>,
    quote: Quote,
    coupon: Option<Coupon>,
}

/// Result of promoting a captured payment.
enum Promoted {
    Placed(Order),
    /// The payment was refunded; carries why no order was placed.
    Refunded(CheckoutError),
}

/// Checkout and order operations.
pub struct CheckoutService<'a> {
    pool: &'a PgPool,
    pricing: &'a PricingConfig,
    base_url: &'a str,
    gateways: &'a Gateways,
    fulfillment: &'a Fulfillment,
}

impl<'a> CheckoutService<'a> {
    #[must_use]
    pub const fn new(
        pool: &'a PgPool,
        pricing: &'a PricingConfig,
        base_url: &'a str,
        gateways: &'a Gateways,
        fulfillment: &'a Fulfillment,
    ) -> Self {
        Self {
            pool,
            pricing,
            base_url,
            gateways,
            fulfillment,
        }
    }

    /// Price the cart for a payment method and optional coupon.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::EmptyCart`, `OutOfStock` or `Coupon` when the
    /// cart cannot be checked out as it stands.
    pub async fn quote(
        &self,
        user_id: UserId,
        coupon_code: Option<&str>,
        method: PaymentMethod,
    ) -> Result<Quote, CheckoutError> {
        Ok(self.prepare(user_id, coupon_code, method).await?.quote)
    }

    /// Place an order, or start a gateway payment for it.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError` if the cart, address or coupon is invalid, or
    /// the gateway refuses to create its order.
    #[tracing::instrument(skip(self, user, request), fields(user_id = %user.id, method = %request.payment_method))]
    pub async fn place_order(
        &self,
        user: &User,
        request: &CheckoutRequest,
    ) -> Result<CheckoutOutcome, CheckoutError> {
        let address = AddressRepository::new(self.pool)
            .get(user.id, request.address_id)
            .await?
            .ok_or(CheckoutError::AddressNotFound)?;
        let shipping_address = address.snapshot(user.email.as_str());
        let prepared = self
            .prepare(user.id, request.coupon_code.as_deref(), request.payment_method)
            .await?;
        let reference = checkout_reference(user.id, Utc::now().timestamp_millis());

        match request.payment_method {
            PaymentMethod::Cod => {
                let order = OrderRepository::new(self.pool)
                    .create(&NewOrder {
                        user_id: user.id,
                        payment_method: PaymentMethod::Cod,
                        payment_status: PaymentStatus::Pending,
                        gateway_order_id: None,
                        gateway_payment_id: None,
                        shipping_address,
                        coupon_id: prepared.coupon.as_ref().map(|c| c.id),
                        coupon_code: prepared.coupon.map(|c| c.code),
                        lines: prepared.lines,
                        quote: prepared.quote,
                    })
                    .await?;
                tracing::info!(order_id = %order.id, order_number = %order.order_number, "COD order placed");
                self.fulfillment.spawn_after_placement(order.id);
                Ok(CheckoutOutcome::Placed { order })
            }
            PaymentMethod::Razorpay => {
                let client = self.gateways.razorpay()?;
                let notes = serde_json::json!({
                    "user_id": user.id.to_string(),
                    "email": user.email.as_str(),
                });
                let gateway_order = client
                    .create_order(prepared.quote.total, &reference, &notes)
                    .await?;
                self.stage(&gateway_order.id, PaymentMethod::Razorpay, user.id, &shipping_address, &prepared)
                    .await?;
                Ok(CheckoutOutcome::Razorpay {
                    key_id: client.key_id().to_owned(),
                    razorpay_order_id: gateway_order.id,
                    amount: gateway_order.amount,
                    currency: gateway_order.currency,
                    quote: prepared.quote,
                })
            }
            PaymentMethod::Paypal => {
                let client = self.gateways.paypal()?;
                let paypal_order = client
                    .create_order(
                        prepared.quote.total,
                        &reference,
                        &self.return_url("paypal"),
                        &self.cancel_url(),
                    )
                    .await?;
                self.stage(&paypal_order.id, PaymentMethod::Paypal, user.id, &shipping_address, &prepared)
                    .await?;
                Ok(CheckoutOutcome::Paypal {
                    paypal_order_id: paypal_order.id,
                    approve_url: paypal_order.approve_url,
                    quote: prepared.quote,
                })
            }
            PaymentMethod::Stripe => {
                let client = self.gateways.stripe()?;
                let description = format!("Aurum order, {} item(s)", prepared.lines.len());
                let session = client
                    .create_checkout_session(
                        prepared.quote.total,
                        &description,
                        &reference,
                        user.email.as_str(),
                        &format!("{}&session_id={{CHECKOUT_SESSION_ID}}", self.return_url("stripe")),
                        &self.cancel_url(),
                    )
                    .await?;
                let checkout_url = session.url.clone().ok_or(PaymentError::UnexpectedResponse {
                    gateway: "stripe",
                    message: "session has no checkout URL".to_owned(),
                })?;
                self.stage(&session.id, PaymentMethod::Stripe, user.id, &shipping_address, &prepared)
                    .await?;
                Ok(CheckoutOutcome::Stripe {
                    session_id: session.id,
                    checkout_url,
                    quote: prepared.quote,
                })
            }
        }
    }

    /// Confirm a Razorpay payment from the checkout callback.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Payment` for a bad signature and
    /// `PaymentNotFound` if the gateway order isn't this user's.
    #[tracing::instrument(skip(self, signature))]
    pub async fn confirm_razorpay(
        &self,
        user_id: UserId,
        razorpay_order_id: &str,
        razorpay_payment_id: &str,
        signature: &str,
    ) -> Result<Order, CheckoutError> {
        self.gateways.razorpay()?.verify_payment_signature(
            razorpay_order_id,
            razorpay_payment_id,
            signature,
        )?;
        self.promote(razorpay_order_id, razorpay_payment_id, Some(user_id))
            .await
    }

    /// Capture an approved PayPal order.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Payment` if PayPal does not complete the capture.
    #[tracing::instrument(skip(self))]
    pub async fn capture_paypal(
        &self,
        user_id: UserId,
        paypal_order_id: &str,
    ) -> Result<Order, CheckoutError> {
        let client = self.gateways.paypal()?;

        // A repeated return from PayPal must not capture twice.
        if let Some(order) = OrderRepository::new(self.pool)
            .get_by_gateway_order_id(paypal_order_id)
            .await?
        {
            return if order.user_id == user_id {
                Ok(order)
            } else {
                Err(CheckoutError::PaymentNotFound)
            };
        }
        let temp = OrderTempRepository::new(self.pool)
            .get(paypal_order_id)
            .await?
            .filter(|t| t.user_id == user_id)
            .ok_or(CheckoutError::PaymentNotFound)?;

        let capture = client.capture_order(&temp.gateway_order_id).await?;
        self.promote(paypal_order_id, &capture.capture_id, Some(user_id))
            .await
    }

    /// Confirm a Stripe Checkout Session after the redirect back.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Payment` if the session is not paid.
    #[tracing::instrument(skip(self))]
    pub async fn confirm_stripe(
        &self,
        user_id: UserId,
        session_id: &str,
    ) -> Result<Order, CheckoutError> {
        let session = self.gateways.stripe()?.retrieve_session(session_id).await?;
        if !session.is_paid() {
            return Err(PaymentError::NotCompleted(session.payment_status).into());
        }
        let payment_intent = session
            .payment_intent
            .ok_or(PaymentError::UnexpectedResponse {
                gateway: "stripe",
                message: "paid session has no payment intent".to_owned(),
            })?;
        self.promote(&session.id, &payment_intent, Some(user_id))
            .await
    }

    /// Handle a Razorpay webhook delivery.
    ///
    /// Returns the order when the event completed one. Events for unknown
    /// gateway orders are acknowledged and ignored.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Payment` if the signature does not verify.
    pub async fn razorpay_webhook(
        &self,
        body: &[u8],
        signature: &str,
    ) -> Result<Option<Order>, CheckoutError> {
        self.gateways
            .razorpay()?
            .verify_webhook_signature(body, signature)?;
        let Some(capture) = razorpay::capture_from_webhook(body)? else {
            return Ok(None);
        };
        self.promote_from_webhook(&capture.order_id, &capture.payment_id)
            .await
    }

    /// Handle a Stripe webhook delivery.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Payment` if the signature does not verify.
    pub async fn stripe_webhook(
        &self,
        body: &[u8],
        signature_header: &str,
    ) -> Result<Option<Order>, CheckoutError> {
        let event = self
            .gateways
            .stripe()?
            .verify_webhook(body, signature_header)?;
        let Some(session) = event.completed_session()? else {
            tracing::debug!(event_id = %event.id, kind = %event.kind, "Ignoring Stripe event");
            return Ok(None);
        };
        let Some(payment_intent) = session.payment_intent.as_deref().filter(|_| session.is_paid())
        else {
            return Ok(None);
        };
        self.promote_from_webhook(&session.id, payment_intent).await
    }

    /// A customer's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Repository` if the query fails.
    pub async fn orders(
        &self,
        user_id: UserId,
        pagination: Pagination,
    ) -> Result<Page<Order>, CheckoutError> {
        Ok(OrderRepository::new(self.pool)
            .list_for_user(user_id, pagination)
            .await?)
    }

    /// One order with its items; `owner` restricts it to that customer.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::OrderNotFound` if there is no such order.
    pub async fn detail(
        &self,
        id: OrderId,
        owner: Option<UserId>,
    ) -> Result<OrderDetail, CheckoutError> {
        OrderRepository::new(self.pool)
            .detail(id, owner)
            .await?
            .ok_or(CheckoutError::OrderNotFound)
    }

    /// Shipment state plus the courier's tracking history when an AWB exists.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::OrderNotFound` if the order isn't the user's.
    pub async fn track(&self, user_id: UserId, id: OrderId) -> Result<OrderTracking, CheckoutError> {
        let order = self.owned_order(user_id, id).await?;
        let tracking = match order.awb_code.as_deref() {
            Some(awb) => match self.fulfillment.track(awb).await {
                Ok(tracking) => tracking,
                Err(e) => {
                    tracing::warn!(order_id = %id, error = %e, "Tracking lookup failed");
                    None
                }
            },
            None => None,
        };
        Ok(OrderTracking {
            order_id: order.id,
            status: order.status,
            awb_code: order.awb_code,
            courier_name: order.courier_name,
            tracking,
        })
    }

    /// Cancel an order that has not shipped yet, refunding prepaid payments.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::ReasonRequired` for a blank reason and
    /// `NotCancellable` once the order has shipped.
    #[tracing::instrument(skip(self, reason))]
    pub async fn cancel(
        &self,
        user_id: UserId,
        id: OrderId,
        reason: &str,
    ) -> Result<Order, CheckoutError> {
        let reason = required_reason(reason)?;
        let order = self.owned_order(user_id, id).await?;
        if !order.status.is_cancellable_by_customer() {
            return Err(CheckoutError::NotCancellable(order.status));
        }
        let order = OrderRepository::new(self.pool)
            .transition(
                id,
                OrderStatus::Cancelled,
                &StatusChange {
                    cancel_reason: Some(reason),
                    ..StatusChange::default()
                },
            )
            .await?;
        tracing::info!(order_id = %id, "Order cancelled by customer");
        self.after_cancellation(order).await
    }

    /// Ask to return a delivered order.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::ReturnWindowClosed` outside the return window.
    #[tracing::instrument(skip(self, reason))]
    pub async fn request_return(
        &self,
        user_id: UserId,
        id: OrderId,
        reason: &str,
    ) -> Result<Order, CheckoutError> {
        let reason = required_reason(reason)?;
        let order = self.owned_order(user_id, id).await?;
        if order.status != OrderStatus::Delivered {
            return Err(CheckoutError::Conflict(format!(
                "only delivered orders can be returned, this one is {}",
                order.status
            )));
        }
        if !order.can_request_return(Utc::now()) {
            return Err(CheckoutError::ReturnWindowClosed);
        }
        let order = OrderRepository::new(self.pool)
            .transition(
                id,
                OrderStatus::ReturnRequested,
                &StatusChange {
                    return_reason: Some(reason),
                    ..StatusChange::default()
                },
            )
            .await?;
        self.fulfillment.spawn_status_email(order.id);
        Ok(order)
    }

    /// Move an order to a new status from the back-office.
    ///
    /// Shipping books the shipment if it isn't booked yet. Cancelling and
    /// completing a return refund prepaid payments.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Conflict` if the transition isn't allowed.
    #[tracing::instrument(skip(self, reason))]
    pub async fn admin_set_status(
        &self,
        id: OrderId,
        to: OrderStatus,
        reason: Option<&str>,
    ) -> Result<Order, CheckoutError> {
        let reason = reason.map(str::trim).filter(|r| !r.is_empty());
        let change = StatusChange {
            cancel_reason: reason.filter(|_| to == OrderStatus::Cancelled),
            ..StatusChange::default()
        };
        let order = OrderRepository::new(self.pool)
            .transition(id, to, &change)
            .await?;
        tracing::info!(order_id = %id, status = %to, "Order status changed");

        let order = match to {
            OrderStatus::Cancelled => return self.after_cancellation(order).await,
            OrderStatus::Shipped if order.awb_code.is_none() => {
                match self.fulfillment.book_shipment(id).await {
                    Ok(order) => order,
                    Err(e) => {
                        tracing::warn!(order_id = %id, error = %e, "Shipment booking failed, order marked shipped without AWB");
                        order
                    }
                }
            }
            OrderStatus::Returned => {
                if self.refund_order(&order).await {
                    self.reload(id).await?
                } else {
                    order
                }
            }
            _ => order,
        };
        self.fulfillment.spawn_status_email(order.id);
        Ok(order)
    }

    /// Book the shipment again after an earlier failure.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::ShippingNotConfigured` or a Shiprocket error.
    pub async fn retry_shipment(&self, id: OrderId) -> Result<Order, CheckoutError> {
        self.fulfillment.book_shipment(id).await
    }

    /// Refund a captured gateway payment.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Payment` if the gateway refuses.
    pub async fn refund(&self, method: PaymentMethod, payment_id: &str) -> Result<(), CheckoutError> {
        match method {
            PaymentMethod::Cod => {}
            PaymentMethod::Razorpay => {
                self.gateways.razorpay()?.refund(payment_id).await?;
            }
            PaymentMethod::Paypal => {
                self.gateways.paypal()?.refund_capture(payment_id).await?;
            }
            PaymentMethod::Stripe => {
                self.gateways
                    .stripe()?
                    .refund_payment_intent(payment_id)
                    .await?;
            }
        }
        tracing::info!(%method, payment_id, "Payment refunded");
        Ok(())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn prepare(
        &self,
        user_id: UserId,
        coupon_code: Option<&str>,
        method: PaymentMethod,
    ) -> Result<PreparedCheckout, CheckoutError> {
        let cart = CartRepository::new(self.pool).lines(user_id).await?;
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        if let Some(line) = cart.iter().find(|l| !l.is_available()) {
            return Err(CheckoutError::OutOfStock(line.product.name.clone()));
        }

        let offers = OfferRepository::new(self.pool).list_running().await?;
        let coupon = self.load_coupon(user_id, coupon_code).await?;
        let now = Utc::now();

        let priced: Vec<PricedLine> = cart.iter().map(PricedLine::from).collect();
        let applied = coupon.as_ref().map(|(coupon, already_redeemed)| AppliedCoupon {
            coupon,
            already_redeemed: *already_redeemed,
        });
        let quote = pricing::quote(&priced, &offers, applied, method, self.pricing, now)?;

        Ok(PreparedCheckout {
            lines: pricing::order_lines(&cart, &offers, now),
            quote,
            coupon: coupon.map(|(coupon, _)| coupon),
        })
    }

    async fn load_coupon(
        &self,
        user_id: UserId,
        code: Option<&str>,
    ) -> Result<Option<(Coupon, bool)>, CheckoutError> {
        let Some(code) = code.map(normalize_code).filter(|c| !c.is_empty()) else {
            return Ok(None);
        };
        let coupons = CouponRepository::new(self.pool);
        let coupon = coupons
            .get_by_code(&code)
            .await?
            .ok_or(CouponError::Unknown)?;
        let redeemed = coupons.has_redeemed(coupon.id, user_id).await?;
        Ok(Some((coupon, redeemed)))
    }

    async fn stage(
        &self,
        gateway_order_id: &str,
        method: PaymentMethod,
        user_id: UserId,
        shipping_address: &ShippingAddress,
        prepared: &PreparedCheckout,
    ) -> Result<OrderTemp, CheckoutError> {
        let temp = OrderTempRepository::new(self.pool)
            .create(&NewOrderTemp {
                gateway_order_id,
                payment_method: method,
                user_id,
                shipping_address,
                lines: &prepared.lines,
                quote: &prepared.quote,
                coupon_id: prepared.coupon.as_ref().map(|c| c.id),
                coupon_code: prepared.coupon.as_ref().map(|c| c.code.as_str()),
            })
            .await?;
        tracing::info!(gateway_order_id, %method, total = %prepared.quote.total, "Checkout staged");
        Ok(temp)
    }

    /// Promote a staged checkout into an order.
    ///
    /// The payment is already captured here, so a staged order that can no
    /// longer be honoured is refunded and discarded, and the reason comes
    /// back as the error.
    async fn promote(
        &self,
        gateway_order_id: &str,
        payment_id: &str,
        owner: Option<UserId>,
    ) -> Result<Order, CheckoutError> {
        match self.promote_staged(gateway_order_id, payment_id, owner).await? {
            Promoted::Placed(order) => Ok(order),
            Promoted::Refunded(reason) => Err(reason),
        }
    }

    async fn promote_staged(
        &self,
        gateway_order_id: &str,
        payment_id: &str,
        owner: Option<UserId>,
    ) -> Result<Promoted, CheckoutError> {
        let temps = OrderTempRepository::new(self.pool);
        let temp = temps.get(gateway_order_id).await?;
        if let (Some(owner), Some(temp)) = (owner, temp.as_ref())
            && temp.user_id != owner
        {
            return Err(CheckoutError::PaymentNotFound);
        }

        let err = match temps.promote(gateway_order_id, payment_id).await {
            Ok(Promotion::Created(order)) => {
                tracing::info!(order_id = %order.id, order_number = %order.order_number, gateway_order_id, "Prepaid order placed");
                self.fulfillment.spawn_after_placement(order.id);
                return Ok(Promoted::Placed(order));
            }
            Ok(Promotion::AlreadyPromoted(order)) => {
                if owner.is_some_and(|owner| owner != order.user_id) {
                    return Err(CheckoutError::PaymentNotFound);
                }
                return Ok(Promoted::Placed(order));
            }
            Err(RepositoryError::NotFound) => return Err(CheckoutError::PaymentNotFound),
            Err(e) => e,
        };

        // The temp is gone only if a concurrent call promoted it; nothing to refund.
        let Some(temp) = temp else {
            return Err(err.into());
        };

        tracing::warn!(gateway_order_id, payment_id, error = %err, "Captured payment cannot become an order, refunding");
        if let Err(e) = self.refund(temp.payment_method, payment_id).await {
            tracing::error!(gateway_order_id, payment_id, error = %e, "Refund after failed promotion failed, refund manually");
        }
        if let Err(e) = temps.delete(gateway_order_id).await {
            tracing::error!(gateway_order_id, error = %e, "Failed to discard staged checkout");
        }

        let reason = match err {
            RepositoryError::InsufficientStock(product_id) => CheckoutError::OutOfStock(
                temp.lines
                    .iter()
                    .find(|l| l.product_id == product_id)
                    .map_or_else(|| format!("product {product_id}"), |l| l.name.clone()),
            ),
            other => other.into(),
        };
        Ok(Promoted::Refunded(reason))
    }

    async fn promote_from_webhook(
        &self,
        gateway_order_id: &str,
        payment_id: &str,
    ) -> Result<Option<Order>, CheckoutError> {
        match self.promote_staged(gateway_order_id, payment_id, None).await {
            Ok(Promoted::Placed(order)) => Ok(Some(order)),
            Ok(Promoted::Refunded(reason)) => {
                tracing::info!(gateway_order_id, %reason, "Webhook payment refunded instead of placed");
                Ok(None)
            }
            Err(CheckoutError::PaymentNotFound) => {
                tracing::info!(gateway_order_id, "Webhook for an unknown gateway order, ignoring");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Cancel the shipment and refund, then notify the customer.
    async fn after_cancellation(&self, order: Order) -> Result<Order, CheckoutError> {
        self.fulfillment.cancel_shipment(&order).await;
        let order = if self.refund_order(&order).await {
            self.reload(order.id).await?
        } else {
            order
        };
        self.fulfillment.spawn_status_email(order.id);
        Ok(order)
    }

    /// Refund a paid gateway order and mark it refunded. Failures are logged
    /// for manual follow-up; returns whether the refund went through.
    async fn refund_order(&self, order: &Order) -> bool {
        if !order.is_refundable() {
            return false;
        }
        let Some(payment_id) = order.gateway_payment_id.as_deref() else {
            tracing::error!(order_id = %order.id, "Paid order has no gateway payment id, refund manually");
            return false;
        };
        if let Err(e) = self.refund(order.payment_method, payment_id).await {
            tracing::error!(order_id = %order.id, error = %e, "Refund failed, refund manually");
            return false;
        }
        match OrderRepository::new(self.pool)
            .set_payment_status(order.id, PaymentStatus::Refunded)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(order_id = %order.id, error = %e, "Refunded but failed to record it");
                false
            }
        }
    }

    async fn owned_order(&self, user_id: UserId, id: OrderId) -> Result<Order, CheckoutError> {
        OrderRepository::new(self.pool)
            .get(id)
            .await?
            .filter(|o| o.user_id == user_id)
            .ok_or(CheckoutError::OrderNotFound)
    }

    async fn reload(&self, id: OrderId) -> Result<Order, CheckoutError> {
        OrderRepository::new(self.pool)
            .get(id)
            .await?
            .ok_or(CheckoutError::OrderNotFound)
    }

    fn return_url(&self, gateway: &str) -> String {
        format!("{}/checkout/success?gateway={gateway}", self.base_url)
    }

    fn cancel_url(&self) -> String {
        format!("{}/checkout/cancelled", self.base_url)
    }
}

/// Receipt / reference sent to the gateway: `AUR-{user}-{millis}`.
fn checkout_reference(user_id: UserId, millis: i64) -> String {
    format!("AUR-{user_id}-{millis}")
}

fn required_reason(reason: &str) -> Result<&str, CheckoutError> {
    let reason = reason.trim();
    if reason.is_empty() {
        Err(CheckoutError::ReasonRequired)
    } else {
        Ok(reason)
    }
}

// =============================================================================
// Fulfillment
// =============================================================================

/// Post-order side effects: Shiprocket booking and customer emails.
///
/// Everything here runs after the order is committed; failures are logged
/// and never roll the order back.
#[derive(Clone)]
pub struct Fulfillment {
    pool: PgPool,
    shiprocket: Option<ShiprocketClient>,
    email: EmailService,
}

impl Fulfillment {
    #[must_use]
    pub const fn new(pool: PgPool, shiprocket: Option<ShiprocketClient>, email: EmailService) -> Self {
        Self {
            pool,
            shiprocket,
            email,
        }
    }

    /// Book the shipment and send the confirmation in the background.
    pub fn spawn_after_placement(&self, order_id: OrderId) {
        let this = self.clone();
        tokio::spawn(async move {
            if this.shiprocket.is_some()
                && let Err(e) = this.book_shipment(order_id).await
            {
                tracing::error!(order_id = %order_id, error = %e, "Shipment booking failed, retry from the admin");
            }
            match this.load_detail(order_id).await {
                Some(detail) => {
                    if let Err(e) = this.email.send_order_confirmation(&detail).await {
                        tracing::error!(order_id = %order_id, error = %e, "Failed to send order confirmation");
                    }
                }
                None => tracing::warn!(order_id = %order_id, "Order vanished before confirmation email"),
            }
        });
    }

    /// Email the customer the order's current status in the background.
    pub fn spawn_status_email(&self, order_id: OrderId) {
        let this = self.clone();
        tokio::spawn(async move {
            if let Some(detail) = this.load_detail(order_id).await
                && let Err(e) = this.email.send_order_status(&detail).await
            {
                tracing::error!(order_id = %order_id, error = %e, "Failed to send status email");
            }
        });
    }

    /// Create the Shiprocket order if needed, then assign an AWB.
    ///
    /// Each step is persisted as soon as it succeeds, so a retry resumes
    /// where the last attempt stopped.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::ShippingNotConfigured` without Shiprocket
    /// credentials, or the Shiprocket error that stopped the booking.
    #[tracing::instrument(skip(self))]
    pub async fn book_shipment(&self, order_id: OrderId) -> Result<Order, CheckoutError> {
        let client = self
            .shiprocket
            .as_ref()
            .ok_or(CheckoutError::ShippingNotConfigured)?;
        let orders = OrderRepository::new(&self.pool);
        let detail = orders
            .detail(order_id, None)
            .await?
            .ok_or(CheckoutError::OrderNotFound)?;
        if detail.order.status.is_terminal() {
            return Err(CheckoutError::Conflict(format!(
                "a {} order cannot be shipped",
                detail.order.status
            )));
        }

        let shipment_id = match detail.order.shiprocket_shipment_id {
            Some(shipment_id) if detail.order.has_shipment() => shipment_id,
            _ => {
                let created = client.create_order(&detail).await?;
                orders
                    .set_shipment(order_id, created.order_id, created.shipment_id)
                    .await?;
                created.shipment_id
            }
        };

        if detail.order.awb_code.is_none() {
            let awb = client.assign_awb(shipment_id).await?;
            orders
                .set_awb(
                    order_id,
                    &awb.awb_code,
                    awb.courier_name.as_deref().unwrap_or_default(),
                )
                .await?;
        }

        orders.get(order_id).await?.ok_or(CheckoutError::OrderNotFound)
    }

    /// Cancel the Shiprocket order, if one was booked. Best-effort.
    pub async fn cancel_shipment(&self, order: &Order) {
        let (Some(client), Some(shiprocket_order_id)) =
            (self.shiprocket.as_ref(), order.shiprocket_order_id)
        else {
            return;
        };
        if let Err(e) = client.cancel_orders(&[shiprocket_order_id]).await {
            tracing::warn!(order_id = %order.id, error = %e, "Failed to cancel Shiprocket order");
        }
    }

    /// Live tracking for an AWB; `None` when Shiprocket is not configured.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Shipping` if the lookup fails.
    pub async fn track(&self, awb_code: &str) -> Result<Option<Tracking>, CheckoutError> {
        match &self.shiprocket {
            Some(client) => Ok(Some(client.track(awb_code).await?)),
            None => Ok(None),
        }
    }

    async fn load_detail(&self, order_id: OrderId) -> Option<OrderDetail> {
        match OrderRepository::new(&self.pool).detail(order_id, None).await {
            Ok(detail) => detail,
            Err(e) => {
                tracing::error!(order_id = %order_id, error = %e, "Failed to load order");
                None
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use aurum_core::{CouponId, Money, ProductId};

    #[test]
    fn test_required_reason_trims() {
        assert_eq!(required_reason("  wrong size ").unwrap(), "wrong size");
        assert!(matches!(required_reason("   "), Err(CheckoutError::ReasonRequired)));
    }

    #[test]
    fn test_checkout_reference_format() {
        assert_eq!(
            checkout_reference(UserId::new(42), 1_700_000_000_000),
            "AUR-42-1700000000000"
        );
    }

    #[test]
    fn test_repository_errors_map_to_checkout_errors() {
        assert!(matches!(
            CheckoutError::from(RepositoryError::InsufficientStock(ProductId::new(3))),
            CheckoutError::OutOfStock(_)
        ));
        assert!(matches!(
            CheckoutError::from(RepositoryError::Conflict("order cannot move".into())),
            CheckoutError::Conflict(_)
        ));
        assert!(matches!(
            CheckoutError::from(RepositoryError::NotFound),
            CheckoutError::OrderNotFound
        ));
        assert!(matches!(
            CheckoutError::from(RepositoryError::CouponRedeemed(CouponId::new(7))),
            CheckoutError::Coupon(CouponError::AlreadyRedeemed)
        ));
        assert!(matches!(
            CheckoutError::from(RepositoryError::CouponExhausted(CouponId::new(7))),
            CheckoutError::Coupon(CouponError::UsageLimitReached)
        ));
    }

    #[test]
    fn test_outcome_is_tagged_by_next_step() {
        let outcome = CheckoutOutcome::Paypal {
            paypal_order_id: "5O190127TN364715T".into(),
            approve_url: "https://www.sandbox.paypal.com/checkoutnow?token=5O190127TN364715T".into(),
            quote: Quote {
                subtotal: Money::from_rupees(1000),
                total: Money::from_rupees(1000),
                ..Quote::default()
            },
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["next"], "paypal");
        assert_eq!(json["paypal_order_id"], "5O190127TN364715T");
        assert!(json["quote"]["total"].is_string());
    }
}
