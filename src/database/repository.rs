use crate::database::error::DatabaseError;
use crate::database::order::Order;
use async_trait::async_trait;

/// Result of asking the store to mark an order paid
#[derive(Debug, Clone, PartialEq)]
pub enum MarkPaidOutcome {
    /// This call moved the order from unpaid to paid
    Transitioned(Order),
    /// Another caller got there first; nothing changed
    AlreadyPaid(Order),
    NotFound,
}

/// Result of recording a failed payment attempt
#[derive(Debug, Clone, PartialEq)]
pub enum MarkFailedOutcome {
    /// This call moved the order to failed
    Recorded(Order),
    /// The order had already failed; only its metadata was refreshed
    AlreadyFailed(Order),
    /// Paid orders are never downgraded
    AlreadyPaid,
    NotFound,
}

/// Order persistence used by the payment flow
///
/// Implementations must make `mark_paid` atomic: of any number of concurrent
/// calls for the same order, at most one reports `Transitioned`.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Find an order by its merchant order number
    async fn find_by_order_number(&self, order_number: &str)
        -> Result<Option<Order>, DatabaseError>;

    /// Idempotently mark the order paid, recording the gateway reference
    async fn mark_paid(
        &self,
        order_number: &str,
        gateway_reference: &str,
    ) -> Result<MarkPaidOutcome, DatabaseError>;

    /// Record a failed payment, merging the reference and reason into the
    /// order metadata. Paid orders are left untouched.
    async fn mark_failed(
        &self,
        order_number: &str,
        gateway_reference: &str,
        reason: &str,
    ) -> Result<MarkFailedOutcome, DatabaseError>;

    /// Bump the customer's order count and lifetime spend
    async fn update_customer_stats(&self, email: &str, order_total: f64)
        -> Result<(), DatabaseError>;

    /// Check the store is reachable
    async fn health_check(&self) -> Result<(), DatabaseError> {
        Ok(())
    }
}
