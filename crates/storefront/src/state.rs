//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::StorefrontConfig;
use crate::payments::{Gateways, PaymentError, PaypalClient, RazorpayClient, StripeClient};
use crate::services::auth::{AuthService, OtpStore};
use crate::services::cart::CartService;
use crate::services::checkout::{CheckoutService, Fulfillment};
use crate::services::email::EmailService;
use crate::services::images::ImageStore;
use crate::shiprocket::{ShiprocketClient, ShiprocketError};

/// Error building the shared clients.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("email transport: {0}")]
    Email(#[from] lettre::transport::smtp::Error),
    #[error("payment client: {0}")]
    Payment(#[from] PaymentError),
    #[error("shiprocket client: {0}")]
    Shipping(#[from] ShiprocketError),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections, integration clients and
/// configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: PgPool,
    otp: OtpStore,
    email: EmailService,
    gateways: Gateways,
    fulfillment: Fulfillment,
    images: ImageStore,
}

impl AppState {
    /// Create a new application state.
    ///
    /// Integrations whose configuration is absent are left disabled.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured client cannot be built.
    pub fn new(config: StorefrontConfig, pool: PgPool) -> Result<Self, StateError> {
        let email = EmailService::new(config.email.as_ref(), &config.base_url)?;
        let gateways = Gateways {
            razorpay: config.razorpay.clone().map(RazorpayClient::new).transpose()?,
            paypal: config.paypal.clone().map(PaypalClient::new).transpose()?,
            stripe: config.stripe.clone().map(StripeClient::new).transpose()?,
        };
        let shiprocket = config
            .shiprocket
            .clone()
            .map(ShiprocketClient::new)
            .transpose()?;
        let fulfillment = Fulfillment::new(pool.clone(), shiprocket, email.clone());
        let images = ImageStore::new(
            config.cloudinary.clone(),
            config.upload_dir.clone(),
            &config.base_url,
        );
        let otp = OtpStore::new(config.otp_ttl);

        tracing::info!(
            gateways = ?gateways.enabled(),
            shipping = config.shiprocket.is_some(),
            smtp = config.email.is_some(),
            cloudinary = config.cloudinary.is_some(),
            "Integrations configured"
        );

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                otp,
                email,
                gateways,
                fulfillment,
                images,
            }),
        })
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    #[must_use]
    pub fn email(&self) -> &EmailService {
        &self.inner.email
    }

    #[must_use]
    pub fn gateways(&self) -> &Gateways {
        &self.inner.gateways
    }

    #[must_use]
    pub fn images(&self) -> &ImageStore {
        &self.inner.images
    }

    /// Registration, login and one-time codes.
    #[must_use]
    pub fn auth(&self) -> AuthService<'_> {
        AuthService::new(&self.inner.pool, &self.inner.otp, &self.inner.email)
    }

    /// Cart and wishlist for the current request.
    #[must_use]
    pub fn cart(&self) -> CartService<'_> {
        CartService::new(&self.inner.pool, &self.inner.config.pricing)
    }

    /// Checkout and order changes for the current request.
    #[must_use]
    pub fn checkout(&self) -> CheckoutService<'_> {
        CheckoutService::new(
            &self.inner.pool,
            &self.inner.config.pricing,
            &self.inner.config.base_url,
            &self.inner.gateways,
            &self.inner.fulfillment,
        )
    }
}
