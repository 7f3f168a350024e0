//! Payment confirmation flow
//!
//! Three entry points share one rule: an order moves from unpaid to paid at
//! most once, and only the caller that performed the move runs the side
//! effects (customer stats, confirmation notifications). Everyone else sees
//! an idempotent success.

use crate::cache::cache::ttl;
use crate::cache::keys::payment::GatewayStatusKey;
use crate::cache::Cache;
use crate::database::{
    FulfillmentStatus, MarkFailedOutcome, MarkPaidOutcome, Order, OrderRepository, PaymentStatus,
};
use crate::error::{AppError, AppResult, DomainError, InfrastructureError};
use crate::notifications::NotificationDispatcher;
use crate::payments::callback::{secret_matches, CallbackNotice, CallbackOutcome};
use crate::payments::reference::new_attempt_reference;
use crate::payments::traits::PaymentGateway;
use crate::payments::types::{GatewayStatus, PaymentLinkRequest};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Gateway reference recorded when the status query confirmed payment
pub const GATEWAY_VERIFIED_REFERENCE: &str = "moolre-api";
/// Gateway reference recorded when the redirect alone confirmed payment
pub const REDIRECT_VERIFIED_REFERENCE: &str = "redirect-verification";

/// Largest difference between paid amount and order total treated as equal
const AMOUNT_TOLERANCE: f64 = 0.01;

pub const CALLBACK_PATH: &str = "/api/payment/moolre/callback";

#[derive(Debug, Clone)]
pub struct PaymentSettings {
    /// Shared secret the gateway includes in callbacks
    pub callback_secret: Option<String>,
    /// Accept `fromRedirect` as proof of payment when the gateway can't confirm
    pub trust_redirect_fallback: bool,
    /// How long gateway status answers are reused
    pub status_cache_ttl: Duration,
}

impl Default for PaymentSettings {
    fn default() -> Self {
        Self {
            callback_secret: None,
            trust_redirect_fallback: false,
            status_cache_ttl: ttl::GATEWAY_STATUS,
        }
    }
}

/// Input for a new payment link
#[derive(Debug, Clone, Default)]
pub struct InitiatePayment {
    pub order_id: Option<String>,
    pub amount: Option<f64>,
    pub customer_email: Option<String>,
    /// Also send the link to the order's contacts
    pub send_link: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentLinkCreated {
    pub success: bool,
    pub url: String,
    pub reference: Option<String>,
}

/// Body returned to the gateway for a callback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackAck {
    pub success: bool,
    pub message: String,
}

impl CallbackAck {
    fn new(success: bool, message: &str) -> Self {
        Self {
            success,
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub success: bool,
    pub status: FulfillmentStatus,
    pub payment_status: PaymentStatus,
    pub message: String,
}

impl VerificationResult {
    fn from_order(success: bool, order: &Order, message: &str) -> Self {
        Self {
            success,
            status: order.status,
            payment_status: order.payment_status,
            message: message.to_string(),
        }
    }
}

#[derive(Clone)]
pub struct PaymentService {
    orders: Arc<dyn OrderRepository>,
    gateway: Option<Arc<dyn PaymentGateway>>,
    notifications: NotificationDispatcher,
    status_cache: Arc<dyn Cache<GatewayStatus>>,
    settings: PaymentSettings,
}

impl PaymentService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        gateway: Option<Arc<dyn PaymentGateway>>,
        notifications: NotificationDispatcher,
        status_cache: Arc<dyn Cache<GatewayStatus>>,
        settings: PaymentSettings,
    ) -> Self {
        Self {
            orders,
            gateway,
            notifications,
            status_cache,
            settings,
        }
    }

    pub fn gateway_configured(&self) -> bool {
        self.gateway.is_some()
    }

    pub fn orders(&self) -> &Arc<dyn OrderRepository> {
        &self.orders
    }

    /// Create a hosted payment link for an order
    ///
    /// `base_url` is the public origin of this service; callback and
    /// redirect URLs are built from it.
    pub async fn initiate_payment(
        &self,
        request: InitiatePayment,
        base_url: &str,
    ) -> AppResult<PaymentLinkCreated> {
        let order_id = request
            .order_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty());
        let amount = request.amount.filter(|a| a.is_finite() && *a > 0.0);
        let (order_id, amount) = match (order_id, amount) {
            (Some(order_id), Some(amount)) => (order_id.to_string(), amount),
            _ => return Err(AppError::missing_field("orderId or amount")),
        };

        let gateway = self.gateway.as_ref().ok_or_else(|| {
            error!("Payment gateway credentials are not configured");
            AppError::from(InfrastructureError::GatewayNotConfigured)
        })?;

        let base_url = base_url.trim_end_matches('/');
        let encoded_order: String =
            url::form_urlencoded::byte_serialize(order_id.as_bytes()).collect();

        let link = gateway
            .create_payment_link(PaymentLinkRequest {
                order_number: order_id.clone(),
                external_reference: new_attempt_reference(&order_id),
                amount,
                customer_email: request.customer_email.clone(),
                callback_url: format!("{}{}", base_url, CALLBACK_PATH),
                redirect_url: format!(
                    "{}/order-success?order={}&payment_success=true",
                    base_url, encoded_order
                ),
            })
            .await?;

        if request.send_link {
            self.send_payment_link(&order_id, &link.authorization_url).await;
        }

        Ok(PaymentLinkCreated {
            success: true,
            url: link.authorization_url,
            reference: link.reference,
        })
    }

    async fn send_payment_link(&self, order_number: &str, url: &str) {
        match self.orders.find_by_order_number(order_number).await {
            Ok(Some(order)) => {
                self.notifications.payment_link(&order, url).await;
            }
            Ok(None) => warn!(order_number, "Cannot send payment link: order not found"),
            Err(e) => warn!(order_number, "Cannot send payment link: {}", e),
        }
    }

    /// Apply a gateway callback to its order
    pub async fn handle_callback(&self, body: &Value) -> AppResult<CallbackAck> {
        let notice = CallbackNotice::from_body(body).map_err(|e| {
            let keys: Vec<&str> = body
                .as_object()
                .map(|map| map.keys().map(String::as_str).collect())
                .unwrap_or_default();
            warn!(?keys, "Callback without order reference");
            e
        })?;

        if let Some(expected) = self.settings.callback_secret.as_deref() {
            if !secret_matches(expected, notice.secret.as_deref()) {
                warn!(
                    order_number = %notice.order_number,
                    "Callback secret mismatch, rejecting"
                );
                return Err(AppError::from(DomainError::InvalidCallbackSecret));
            }
        }

        info!(
            order_number = %notice.order_number,
            gateway_reference = %notice.gateway_reference,
            success = notice.is_success(),
            "Processing payment callback"
        );

        let order = self
            .orders
            .find_by_order_number(&notice.order_number)
            .await?
            .ok_or_else(|| AppError::order_not_found(&notice.order_number))?;

        if order.is_paid() {
            info!(order_number = %order.order_number, "Order already paid, skipping");
            return Ok(CallbackAck::new(true, "Order already processed"));
        }

        if amount_mismatch(order.total, notice.amount) {
            warn!(
                order_number = %order.order_number,
                expected = order.total,
                received = ?notice.amount,
                "Callback amount does not match order total"
            );
        }

        match &notice.outcome {
            CallbackOutcome::Succeeded => {
                match self
                    .confirm_payment(&notice.order_number, &notice.gateway_reference)
                    .await?
                {
                    MarkPaidOutcome::Transitioned(_) => {
                        Ok(CallbackAck::new(true, "Payment verified and Order Updated"))
                    }
                    MarkPaidOutcome::AlreadyPaid(_) => {
                        Ok(CallbackAck::new(true, "Order already processed"))
                    }
                    MarkPaidOutcome::NotFound => {
                        Err(AppError::order_not_found(&notice.order_number))
                    }
                }
            }
            CallbackOutcome::Failed { reason } => {
                let outcome = self
                    .orders
                    .mark_failed(&notice.order_number, &notice.gateway_reference, reason)
                    .await?;

                match outcome {
                    MarkFailedOutcome::Recorded(failed) => {
                        info!(
                            order_number = %failed.order_number,
                            reason = %reason,
                            "Payment failed"
                        );
                        self.notifications
                            .status_update(&failed, "payment was not successful")
                            .await;
                    }
                    MarkFailedOutcome::AlreadyFailed(_) => {
                        debug!(order_number = %order.order_number, "Repeated failure callback");
                    }
                    MarkFailedOutcome::AlreadyPaid => {
                        // Paid between our read and the update
                        info!(order_number = %order.order_number, "Order paid concurrently, ignoring failure");
                        return Ok(CallbackAck::new(true, "Order already processed"));
                    }
                    MarkFailedOutcome::NotFound => {
                        return Err(AppError::order_not_found(&notice.order_number));
                    }
                }

                Ok(CallbackAck::new(false, "Payment not successful"))
            }
        }
    }

    /// Confirm payment after the shopper is redirected back from the gateway
    pub async fn verify_payment(
        &self,
        order_number: &str,
        from_redirect: bool,
    ) -> AppResult<VerificationResult> {
        let order_number = order_number.trim();
        if order_number.is_empty() {
            return Err(AppError::missing_field("orderNumber"));
        }

        info!(order_number, from_redirect, "Verifying payment");

        let order = self
            .orders
            .find_by_order_number(order_number)
            .await?
            .ok_or_else(|| AppError::order_not_found(order_number))?;

        if order.is_paid() {
            return Ok(VerificationResult::from_order(true, &order, "Order already paid"));
        }

        let reference = if self.gateway_status(order_number).await.is_confirmed() {
            GATEWAY_VERIFIED_REFERENCE
        } else if from_redirect && self.settings.trust_redirect_fallback {
            warn!(
                order_number,
                "Gateway did not confirm payment, trusting redirect"
            );
            REDIRECT_VERIFIED_REFERENCE
        } else {
            if from_redirect {
                info!(order_number, "Redirect alone is not accepted as proof of payment");
            }
            return Ok(VerificationResult::from_order(
                false,
                &order,
                "Payment not yet confirmed",
            ));
        };

        info!(order_number, via = reference, "Marking order paid");
        match self.confirm_payment(order_number, reference).await? {
            MarkPaidOutcome::Transitioned(order) | MarkPaidOutcome::AlreadyPaid(order) => Ok(
                VerificationResult::from_order(true, &order, "Payment verified and order updated"),
            ),
            MarkPaidOutcome::NotFound => Err(AppError::order_not_found(order_number)),
        }
    }

    /// Mark the order paid; the caller that performs the transition runs the side effects
    async fn confirm_payment(
        &self,
        order_number: &str,
        gateway_reference: &str,
    ) -> AppResult<MarkPaidOutcome> {
        let outcome = self
            .orders
            .mark_paid(order_number, gateway_reference)
            .await
            .map_err(|e| {
                error!(order_number, "Failed to mark order paid: {}", e);
                AppError::from(e)
            })?;

        match &outcome {
            MarkPaidOutcome::Transitioned(order) => {
                info!(
                    order_number,
                    gateway_reference, "Order marked as paid"
                );
                self.after_payment(order).await;
            }
            MarkPaidOutcome::AlreadyPaid(_) => {
                debug!(order_number, "Order was already paid by another caller");
            }
            MarkPaidOutcome::NotFound => {}
        }

        Ok(outcome)
    }

    /// Best-effort follow-ups to a fresh payment
    async fn after_payment(&self, order: &Order) {
        if let Some(email) = order.email.as_deref().filter(|e| !e.trim().is_empty()) {
            if let Err(e) = self.orders.update_customer_stats(email, order.total).await {
                error!(
                    order_number = %order.order_number,
                    "Customer stats update failed: {}", e
                );
            }
        }

        let key = GatewayStatusKey::new(&order.order_number).to_string();
        if let Err(e) = self.status_cache.delete(&key).await {
            debug!("Failed to drop cached gateway status: {}", e);
        }

        self.notifications.order_confirmation(order).await;
    }

    /// Gateway's view of the order, reusing a recent answer if there is one
    ///
    /// Query failures read as unconfirmed and are not cached.
    async fn gateway_status(&self, order_number: &str) -> GatewayStatus {
        let Some(gateway) = self.gateway.as_ref() else {
            return GatewayStatus::Unconfirmed;
        };

        let key = GatewayStatusKey::new(order_number).to_string();
        match self.status_cache.get(&key).await {
            Ok(Some(status)) => {
                debug!(order_number, ?status, "Using cached gateway status");
                return status;
            }
            Ok(None) => {}
            Err(e) => debug!("Gateway status cache unavailable: {}", e),
        }

        match gateway.query_status(order_number).await {
            Ok(status) => {
                if let Err(e) = self
                    .status_cache
                    .set(&key, &status, Some(self.settings.status_cache_ttl))
                    .await
                {
                    debug!("Failed to cache gateway status: {}", e);
                }
                status
            }
            Err(e) => {
                warn!(order_number, "{} status check failed: {}", gateway.name(), e);
                GatewayStatus::Unconfirmed
            }
        }
    }
}

/// Whether a reported amount disagrees with the order total
///
/// Zero and missing amounts carry no information and are never compared.
fn amount_mismatch(order_total: f64, received: Option<f64>) -> bool {
    match received {
        Some(paid) if paid != 0.0 && !paid.is_nan() => {
            (paid - order_total).abs() > AMOUNT_TOLERANCE
        }
        _ => false,
    }
}
