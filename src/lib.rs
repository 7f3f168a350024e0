//! Payment confirmation service for the storefront.
//!
//! Creates hosted payment links with the Moolre gateway, receives its webhook
//! callbacks, verifies payments when the shopper is redirected back, and
//! dispatches order notifications once an order is marked paid.

pub mod api;
pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod notifications;
pub mod payments;
pub mod rate_limit;
