//! Aurum storefront library.
//!
//! The HTTP API, back-office, repositories and integrations live here so
//! the binary stays a thin bootstrap and the CLI can reuse the database
//! layer.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod payments;
pub mod routes;
pub mod services;
pub mod shiprocket;
pub mod state;
