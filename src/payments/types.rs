//! Payment gateway types and data structures

use serde::{Deserialize, Serialize};

/// Request for a hosted payment link
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentLinkRequest {
    /// Merchant order number the payment is for
    pub order_number: String,
    /// Per-attempt reference sent to the gateway, see `reference::attempt_reference`
    pub external_reference: String,
    pub amount: f64,
    /// Shopper's email, passed through as metadata
    pub customer_email: Option<String>,
    /// Where the gateway posts its webhook
    pub callback_url: String,
    /// Where the shopper lands after paying
    pub redirect_url: String,
}

/// Hosted payment link returned by the gateway
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentLink {
    pub authorization_url: String,
    /// Gateway's own reference for the link, when it returns one
    pub reference: Option<String>,
}

/// Gateway's answer to "has this order been paid?"
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GatewayStatus {
    Confirmed,
    Unconfirmed,
}

impl GatewayStatus {
    pub fn is_confirmed(self) -> bool {
        self == GatewayStatus::Confirmed
    }
}
