//! In-process order store
//!
//! Used by tests and by development runs without `DATABASE_URL`. A single
//! mutex guards the whole map, so `mark_paid` is a true check-and-set.

use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::database::order::{merge_metadata, FulfillmentStatus, Order, PaymentStatus};
use crate::database::repository::{MarkFailedOutcome, MarkPaidOutcome, OrderRepository};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CustomerStats {
    pub order_count: u32,
    pub total_spent: f64,
}

#[derive(Default)]
struct State {
    orders: HashMap<String, Order>,
    customers: HashMap<String, CustomerStats>,
}

#[derive(Default)]
pub struct InMemoryOrderRepository {
    state: Mutex<State>,
    unavailable: AtomicBool,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, order: Order) {
        let mut state = self.state.lock().await;
        state.orders.insert(order.order_number.clone(), order);
    }

    pub async fn get(&self, order_number: &str) -> Option<Order> {
        self.state.lock().await.orders.get(order_number).cloned()
    }

    pub async fn customer_stats(&self, email: &str) -> Option<CustomerStats> {
        self.state.lock().await.customers.get(email).cloned()
    }

    /// Make every write fail with a connection error
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), DatabaseError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DatabaseError::new(DatabaseErrorKind::Connection {
                message: "store marked unavailable".to_string(),
            }));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn find_by_order_number(
        &self,
        order_number: &str,
    ) -> Result<Option<Order>, DatabaseError> {
        Ok(self.get(order_number).await)
    }

    async fn mark_paid(
        &self,
        order_number: &str,
        gateway_reference: &str,
    ) -> Result<MarkPaidOutcome, DatabaseError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let Some(order) = state.orders.get_mut(order_number) else {
            return Ok(MarkPaidOutcome::NotFound);
        };

        if order.is_paid() {
            debug!(order_number, "order already paid");
            return Ok(MarkPaidOutcome::AlreadyPaid(order.clone()));
        }

        order.payment_status = PaymentStatus::Paid;
        if order.status == FulfillmentStatus::Pending {
            order.status = FulfillmentStatus::Processing;
        }
        merge_metadata(
            &mut order.metadata,
            serde_json::json!({ "moolre_reference": gateway_reference }),
        );
        Ok(MarkPaidOutcome::Transitioned(order.clone()))
    }

    async fn mark_failed(
        &self,
        order_number: &str,
        gateway_reference: &str,
        reason: &str,
    ) -> Result<MarkFailedOutcome, DatabaseError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let Some(order) = state.orders.get_mut(order_number) else {
            return Ok(MarkFailedOutcome::NotFound);
        };
        if order.is_paid() {
            return Ok(MarkFailedOutcome::AlreadyPaid);
        }

        let already_failed = order.payment_status == PaymentStatus::Failed;
        order.payment_status = PaymentStatus::Failed;
        merge_metadata(
            &mut order.metadata,
            serde_json::json!({
                "moolre_reference": gateway_reference,
                "failure_reason": reason,
            }),
        );

        if already_failed {
            Ok(MarkFailedOutcome::AlreadyFailed(order.clone()))
        } else {
            Ok(MarkFailedOutcome::Recorded(order.clone()))
        }
    }

    async fn update_customer_stats(
        &self,
        email: &str,
        order_total: f64,
    ) -> Result<(), DatabaseError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let stats = state.customers.entry(email.to_string()).or_default();
        stats.order_count += 1;
        stats.total_spent += order_total;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), DatabaseError> {
        self.check_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_mark_paid_transitions_once() {
        let repo = InMemoryOrderRepository::new();
        repo.insert(Order::new("ORD-1", 25.0)).await;

        let first = repo.mark_paid("ORD-1", "T1").await.unwrap();
        let second = repo.mark_paid("ORD-1", "T2").await.unwrap();

        let order = match first {
            MarkPaidOutcome::Transitioned(order) => order,
            other => panic!("expected first call to transition, got {:?}", other),
        };
        assert_eq!(order.status, FulfillmentStatus::Processing);
        assert_eq!(order.metadata["moolre_reference"], "T1");
        assert!(matches!(second, MarkPaidOutcome::AlreadyPaid(_)));

        let stored = repo.get("ORD-1").await.unwrap();
        assert_eq!(stored.metadata["moolre_reference"], "T1");
    }

    #[tokio::test]
    async fn test_concurrent_mark_paid_has_single_winner() {
        let repo = Arc::new(InMemoryOrderRepository::new());
        repo.insert(Order::new("ORD-2", 10.0)).await;

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let repo = repo.clone();
                tokio::spawn(async move { repo.mark_paid("ORD-2", &format!("T{}", i)).await })
            })
            .collect();

        let mut transitioned = 0;
        for handle in handles {
            if let MarkPaidOutcome::Transitioned(_) = handle.await.unwrap().unwrap() {
                transitioned += 1;
            }
        }
        assert_eq!(transitioned, 1);
    }

    #[tokio::test]
    async fn test_mark_failed_leaves_paid_orders_alone() {
        let repo = InMemoryOrderRepository::new();
        repo.insert(Order::new("ORD-3", 5.0)).await;
        repo.mark_paid("ORD-3", "T1").await.unwrap();

        let outcome = repo.mark_failed("ORD-3", "T9", "Payment Declined").await.unwrap();
        assert_eq!(outcome, MarkFailedOutcome::AlreadyPaid);
        assert_eq!(repo.get("ORD-3").await.unwrap().payment_status, PaymentStatus::Paid);
        assert_eq!(
            repo.mark_failed("ORD-404", "T9", "x").await.unwrap(),
            MarkFailedOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn test_mark_failed_reports_first_recording_only() {
        let repo = InMemoryOrderRepository::new();
        repo.insert(Order::new("ORD-5", 5.0)).await;

        let first = repo.mark_failed("ORD-5", "T1", "Payment Declined").await.unwrap();
        assert!(matches!(first, MarkFailedOutcome::Recorded(_)));

        let second = repo.mark_failed("ORD-5", "T2", "Insufficient funds").await.unwrap();
        let order = match second {
            MarkFailedOutcome::AlreadyFailed(order) => order,
            other => panic!("expected AlreadyFailed, got {:?}", other),
        };
        assert_eq!(order.payment_status, PaymentStatus::Failed);
        assert_eq!(order.metadata_str("moolre_reference"), Some("T2"));
        assert_eq!(order.metadata_str("failure_reason"), Some("Insufficient funds"));
    }

    #[tokio::test]
    async fn test_unavailable_store_rejects_writes() {
        let repo = InMemoryOrderRepository::new();
        repo.insert(Order::new("ORD-4", 5.0)).await;
        repo.set_unavailable(true);

        let err = repo.mark_paid("ORD-4", "T1").await.unwrap_err();
        assert!(err.is_retryable());
        assert!(repo.health_check().await.is_err());
    }
}
