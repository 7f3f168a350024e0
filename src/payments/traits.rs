//! Payment gateway trait definitions

use crate::error::AppResult;
use crate::payments::types::{GatewayStatus, PaymentLink, PaymentLinkRequest};
use async_trait::async_trait;

/// Operations the payment flow needs from a hosted payment gateway
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Provider name used in logs and error messages
    fn name(&self) -> &str;

    /// Create a hosted payment page for an order
    ///
    /// Called once per attempt. Implementations must not retry: a failed
    /// attempt is surfaced and the shopper tries again.
    async fn create_payment_link(&self, request: PaymentLinkRequest) -> AppResult<PaymentLink>;

    /// Ask the gateway whether the order has been paid
    ///
    /// # Arguments
    /// * `order_number` - Merchant order number, without any attempt suffix
    async fn query_status(&self, order_number: &str) -> AppResult<GatewayStatus>;
}
