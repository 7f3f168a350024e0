use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Whether the shopper's money has been received
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(other.to_string()),
        }
    }
}

/// Where the order is in the shipping pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FulfillmentStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl FulfillmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FulfillmentStatus::Pending => "pending",
            FulfillmentStatus::Processing => "processing",
            FulfillmentStatus::Shipped => "shipped",
            FulfillmentStatus::Delivered => "delivered",
            FulfillmentStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for FulfillmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FulfillmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(FulfillmentStatus::Pending),
            "processing" => Ok(FulfillmentStatus::Processing),
            "shipped" => Ok(FulfillmentStatus::Shipped),
            "delivered" => Ok(FulfillmentStatus::Delivered),
            "cancelled" => Ok(FulfillmentStatus::Cancelled),
            other => Err(other.to_string()),
        }
    }
}

/// Order entity as seen by the payment flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    /// Merchant-assigned, unique order number (e.g. `ORD-1770330034217-441`)
    pub order_number: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub customer_name: Option<String>,
    pub total: f64,
    pub payment_status: PaymentStatus,
    pub status: FulfillmentStatus,
    /// Free-form JSON object: gateway reference, failure reason, tracking number...
    pub metadata: serde_json::Value,
}

impl Order {
    /// A fresh unpaid order, mostly useful for seeding stores
    pub fn new(order_number: impl Into<String>, total: f64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            order_number: order_number.into(),
            email: None,
            phone: None,
            customer_name: None,
            total,
            payment_status: PaymentStatus::Pending,
            status: FulfillmentStatus::Pending,
            metadata: serde_json::json!({}),
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn is_paid(&self) -> bool {
        self.payment_status == PaymentStatus::Paid
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }
}

/// Merge `patch` into `target`, treating non-objects as empty
pub fn merge_metadata(target: &mut serde_json::Value, patch: serde_json::Value) {
    if !target.is_object() {
        *target = serde_json::json!({});
    }
    if let (Some(target), serde_json::Value::Object(patch)) = (target.as_object_mut(), patch) {
        for (key, value) in patch {
            target.insert(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_through_text() {
        for status in [PaymentStatus::Pending, PaymentStatus::Paid, PaymentStatus::Failed] {
            assert_eq!(status.as_str().parse::<PaymentStatus>(), Ok(status));
        }
        assert_eq!("refunded".parse::<PaymentStatus>(), Err("refunded".to_string()));
        assert_eq!(
            "shipped".parse::<FulfillmentStatus>(),
            Ok(FulfillmentStatus::Shipped)
        );
    }

    #[test]
    fn test_merge_metadata_keeps_existing_keys() {
        let mut metadata = serde_json::json!({ "payment_method": "moolre" });
        merge_metadata(
            &mut metadata,
            serde_json::json!({ "failure_reason": "Payment Declined" }),
        );
        assert_eq!(metadata["payment_method"], "moolre");
        assert_eq!(metadata["failure_reason"], "Payment Declined");

        let mut not_an_object = serde_json::Value::Null;
        merge_metadata(&mut not_an_object, serde_json::json!({ "a": 1 }));
        assert_eq!(not_an_object, serde_json::json!({ "a": 1 }));
    }
}
