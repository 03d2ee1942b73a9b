//! Shiprocket shipping API client.
//!
//! Shipments are booked after an order is placed: create an adhoc order,
//! then ask Shiprocket to assign a courier and AWB. Tracking is by AWB.
//!
//! # Architecture
//!
//! - Email/password login yields a bearer token valid for ten days
//! - The token is cached in memory and renewed shortly before expiry or
//!   after a 401
//! - Every call is best-effort from the order's point of view: failures are
//!   logged by the caller and never undo a placed order

pub mod client;
pub mod types;

pub use client::ShiprocketClient;
pub use types::{AssignedAwb, CreatedShipment, PickupLocation, Tracking, TrackingActivity};

use thiserror::Error;

/// Errors that can occur when interacting with the Shiprocket API.
#[derive(Debug, Error)]
pub enum ShiprocketError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Shiprocket answered with a non-success status.
    #[error("Shiprocket API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// Login rejected.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The response parsed but lacks what we asked for.
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// No courier could be assigned.
    #[error("AWB not assigned: {0}")]
    AwbNotAssigned(String),
}
