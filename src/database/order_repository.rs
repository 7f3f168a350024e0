use crate::database::error::DatabaseError;
use crate::database::order::Order;
use crate::database::repository::{MarkFailedOutcome, MarkPaidOutcome, OrderRepository};
use async_trait::async_trait;
use sqlx::{FromRow, PgExecutor, PgPool};
use tracing::{debug, error as log_error, info};

const ORDER_COLUMNS: &str = "id::text AS id, order_number, email, phone, \
     shipping_address->>'firstName' AS customer_name, total::float8 AS total, \
     payment_status, status, COALESCE(metadata, '{}'::jsonb) AS metadata";

/// Raw `orders` row; statuses are free text in the table
#[derive(Debug, FromRow)]
struct OrderRow {
    id: String,
    order_number: String,
    email: Option<String>,
    phone: Option<String>,
    customer_name: Option<String>,
    total: f64,
    payment_status: String,
    status: String,
    metadata: serde_json::Value,
}

impl TryFrom<OrderRow> for Order {
    type Error = DatabaseError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let payment_status = row.payment_status.parse().map_err(|value: String| {
            DatabaseError::decode("payment_status", &value).with_context(row.order_number.clone())
        })?;
        let status = row.status.parse().map_err(|value: String| {
            DatabaseError::decode("status", &value).with_context(row.order_number.clone())
        })?;

        Ok(Order {
            id: row.id,
            order_number: row.order_number,
            email: row.email,
            phone: row.phone,
            customer_name: row.customer_name,
            total: row.total,
            payment_status,
            status,
            metadata: row.metadata,
        })
    }
}

/// Order store backed by the storefront's Postgres database
///
/// The paid transition goes through the `mark_order_paid` procedure, which
/// is idempotent by contract. It runs under a row lock so that concurrent
/// callers can tell which of them actually performed the transition.
pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_order<'e, E>(executor: E, order_number: &str) -> Result<Option<Order>, DatabaseError>
    where
        E: PgExecutor<'e>,
    {
        let sql = format!("SELECT {} FROM orders WHERE order_number = $1", ORDER_COLUMNS);
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(order_number)
            .fetch_optional(executor)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        row.map(Order::try_from).transpose()
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn find_by_order_number(
        &self,
        order_number: &str,
    ) -> Result<Option<Order>, DatabaseError> {
        Self::fetch_order(&self.pool, order_number).await
    }

    async fn mark_paid(
        &self,
        order_number: &str,
        gateway_reference: &str,
    ) -> Result<MarkPaidOutcome, DatabaseError> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            log_error!("Failed to begin transaction: {}", e);
            DatabaseError::from_sqlx(e)
        })?;

        let current: Option<String> = sqlx::query_scalar(
            "SELECT payment_status FROM orders WHERE order_number = $1 FOR UPDATE",
        )
        .bind(order_number)
        .fetch_optional(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        match current.as_deref() {
            None => {
                tx.rollback().await.map_err(DatabaseError::from_sqlx)?;
                return Ok(MarkPaidOutcome::NotFound);
            }
            Some("paid") => {
                let order = Self::fetch_order(&mut *tx, order_number).await?;
                tx.commit().await.map_err(DatabaseError::from_sqlx)?;
                debug!(order_number, "order already paid, skipping procedure");
                return Ok(order.map_or(MarkPaidOutcome::NotFound, MarkPaidOutcome::AlreadyPaid));
            }
            Some(_) => {}
        }

        let marked: Option<serde_json::Value> = sqlx::query_scalar(
            "SELECT mark_order_paid(order_ref => $1, moolre_ref => $2)::jsonb",
        )
        .bind(order_number)
        .bind(gateway_reference)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            log_error!("mark_order_paid failed for {}: {}", order_number, e);
            DatabaseError::from_sqlx(e)
        })?;

        if marked.map_or(true, |json| json.is_null()) {
            tx.rollback().await.map_err(DatabaseError::from_sqlx)?;
            return Ok(MarkPaidOutcome::NotFound);
        }

        let order = Self::fetch_order(&mut *tx, order_number).await?;
        tx.commit().await.map_err(|e| {
            log_error!("Failed to commit transaction: {}", e);
            DatabaseError::from_sqlx(e)
        })?;

        info!(order_number, gateway_reference, "order marked paid");
        Ok(order.map_or(MarkPaidOutcome::NotFound, MarkPaidOutcome::Transitioned))
    }

    async fn mark_failed(
        &self,
        order_number: &str,
        gateway_reference: &str,
        reason: &str,
    ) -> Result<MarkFailedOutcome, DatabaseError> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            log_error!("Failed to begin transaction: {}", e);
            DatabaseError::from_sqlx(e)
        })?;

        let current: Option<String> = sqlx::query_scalar(
            "SELECT payment_status FROM orders WHERE order_number = $1 FOR UPDATE",
        )
        .bind(order_number)
        .fetch_optional(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        let already_failed = match current.as_deref() {
            None => {
                tx.rollback().await.map_err(DatabaseError::from_sqlx)?;
                return Ok(MarkFailedOutcome::NotFound);
            }
            Some("paid") => {
                tx.rollback().await.map_err(DatabaseError::from_sqlx)?;
                return Ok(MarkFailedOutcome::AlreadyPaid);
            }
            Some(status) => status == "failed",
        };

        sqlx::query(
            "UPDATE orders
             SET payment_status = 'failed',
                 metadata = COALESCE(metadata, '{}'::jsonb)
                     || jsonb_build_object('moolre_reference', $2::text, 'failure_reason', $3::text)
             WHERE order_number = $1",
        )
        .bind(order_number)
        .bind(gateway_reference)
        .bind(reason)
        .execute(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        let order = Self::fetch_order(&mut *tx, order_number).await?;
        tx.commit().await.map_err(|e| {
            log_error!("Failed to commit transaction: {}", e);
            DatabaseError::from_sqlx(e)
        })?;

        Ok(match order {
            None => MarkFailedOutcome::NotFound,
            Some(order) if already_failed => MarkFailedOutcome::AlreadyFailed(order),
            Some(order) => MarkFailedOutcome::Recorded(order),
        })
    }

    async fn update_customer_stats(
        &self,
        email: &str,
        order_total: f64,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "SELECT update_customer_stats(p_customer_email => $1, p_order_total => $2::numeric)",
        )
        .bind(email)
        .bind(order_total)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(())
    }

    async fn health_check(&self) -> Result<(), DatabaseError> {
        super::health_check(&self.pool).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::order::{FulfillmentStatus, PaymentStatus};

    fn row(payment_status: &str, status: &str) -> OrderRow {
        OrderRow {
            id: "0b8f3c1e-5d1f-4c57-9a43-2b1d8f0a7e11".to_string(),
            order_number: "ORD-5".to_string(),
            email: Some("ama@example.com".to_string()),
            phone: None,
            customer_name: Some("Ama".to_string()),
            total: 120.5,
            payment_status: payment_status.to_string(),
            status: status.to_string(),
            metadata: serde_json::json!({}),
        }
    }

    #[test]
    fn test_row_conversion() {
        let order = Order::try_from(row("paid", "processing")).unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        assert_eq!(order.status, FulfillmentStatus::Processing);
        assert_eq!(order.customer_name.as_deref(), Some("Ama"));
    }

    #[test]
    fn test_row_conversion_rejects_unknown_status() {
        let err = Order::try_from(row("refunded", "pending")).unwrap_err();
        assert!(err.to_string().contains("refunded"));
        assert!(err.to_string().contains("ORD-5"));
    }

    #[tokio::test]
    #[ignore] // Requires database running
    async fn test_find_missing_order() {
        let url = std::env::var("DATABASE_URL").unwrap();
        let pool = crate::database::init_pool(&url, None).await.unwrap();
        let repo = PgOrderRepository::new(pool);
        assert!(repo.find_by_order_number("ORD-DOES-NOT-EXIST").await.unwrap().is_none());
    }
}
