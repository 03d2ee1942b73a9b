//! Aurum Core - Shared domain types.
//!
//! This crate provides the types used across all Aurum components:
//! - `storefront` - Customer-facing API and admin back-office
//! - `cli` - Command-line tools for migrations and maintenance
//!
//! # Architecture
//!
//! The core crate contains only types and validation - no I/O, no database
//! access, no HTTP clients. The optional `postgres` feature adds `sqlx`
//! encode/decode support so the same types can be bound in queries.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, email, phone, money, rating and status enums

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
