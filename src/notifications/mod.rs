//! Customer notifications over email and SMS
//!
//! Delivery is best-effort: the dispatcher logs failures and never returns
//! them, so a broken channel cannot fail a payment. Nothing here guards
//! against duplicates; callers decide when a notification is due.

pub mod http;
pub mod recording;

pub use http::{EmailChannelConfig, HttpNotifier, NotifierConfig, SmsChannelConfig};
pub use recording::RecordingNotifier;

use crate::database::Order;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Sms,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Email => write!(f, "email"),
            Channel::Sms => write!(f, "sms"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    OrderConfirmation,
    StatusUpdate,
    PaymentLink,
}

/// One message to one recipient on one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub kind: NotificationKind,
    pub channel: Channel,
    pub order_number: String,
    /// Email address or phone number, depending on the channel
    pub recipient: String,
    /// Email only
    pub subject: Option<String>,
    pub body: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NotificationError {
    #[error("{0} channel is not configured")]
    ChannelNotConfigured(Channel),

    #[error("Delivery failed: {0}")]
    Transport(String),

    #[error("Provider rejected message (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },
}

pub type NotificationResult<T> = Result<T, NotificationError>;

/// A delivery mechanism for messages
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, message: &Message) -> NotificationResult<()>;
}

/// Outcome counts of one dispatch, for logging and tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Builds order messages and hands them to a `Notifier`
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
    currency: String,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, currency: impl Into<String>) -> Self {
        Self {
            notifier,
            currency: currency.into(),
        }
    }

    /// Payment received for the order
    pub async fn order_confirmation(&self, order: &Order) -> DispatchReport {
        let greeting = greeting(order);
        let email_body = format!(
            "{}\n\nWe have received your payment of {} {:.2} for order {}. \
             We will let you know as soon as it ships.\n\nThank you for shopping with us.",
            greeting, self.currency, order.total, order.order_number
        );
        let sms_body = format!(
            "Payment of {} {:.2} received for order {}. Thank you for shopping with us.",
            self.currency, order.total, order.order_number
        );

        self.dispatch(
            order,
            NotificationKind::OrderConfirmation,
            format!("Order {} confirmed", order.order_number),
            email_body,
            sms_body,
        )
        .await
    }

    /// Something changed on the order, described by `update`
    pub async fn status_update(&self, order: &Order, update: &str) -> DispatchReport {
        let email_body = format!(
            "{}\n\nYour order {} has been updated: {}.",
            greeting(order),
            order.order_number,
            update
        );
        let sms_body = format!("Order {} update: {}.", order.order_number, update);

        self.dispatch(
            order,
            NotificationKind::StatusUpdate,
            format!("Update on order {}", order.order_number),
            email_body,
            sms_body,
        )
        .await
    }

    /// Hosted payment page for an order the shopper has not paid yet
    pub async fn payment_link(&self, order: &Order, url: &str) -> DispatchReport {
        let email_body = format!(
            "{}\n\nComplete the payment of {} {:.2} for order {} here:\n{}",
            greeting(order),
            self.currency,
            order.total,
            order.order_number,
            url
        );
        let sms_body = format!(
            "Pay {} {:.2} for order {}: {}",
            self.currency, order.total, order.order_number, url
        );

        self.dispatch(
            order,
            NotificationKind::PaymentLink,
            format!("Payment link for order {}", order.order_number),
            email_body,
            sms_body,
        )
        .await
    }

    async fn dispatch(
        &self,
        order: &Order,
        kind: NotificationKind,
        subject: String,
        email_body: String,
        sms_body: String,
    ) -> DispatchReport {
        let mut messages = Vec::with_capacity(2);
        if let Some(email) = order.email.as_deref().filter(|e| !e.trim().is_empty()) {
            messages.push(Message {
                kind,
                channel: Channel::Email,
                order_number: order.order_number.clone(),
                recipient: email.to_string(),
                subject: Some(subject),
                body: email_body,
            });
        }
        if let Some(phone) = order.phone.as_deref().filter(|p| !p.trim().is_empty()) {
            messages.push(Message {
                kind,
                channel: Channel::Sms,
                order_number: order.order_number.clone(),
                recipient: phone.to_string(),
                subject: None,
                body: sms_body,
            });
        }

        let mut report = DispatchReport::default();
        for message in &messages {
            match self.notifier.deliver(message).await {
                Ok(()) => report.sent += 1,
                Err(NotificationError::ChannelNotConfigured(channel)) => {
                    debug!(
                        order_number = %order.order_number,
                        "Skipping {:?} notification: {} channel disabled",
                        kind, channel
                    );
                    report.skipped += 1;
                }
                Err(e) => {
                    warn!(
                        order_number = %order.order_number,
                        channel = %message.channel,
                        "Failed to send {:?} notification: {}",
                        kind, e
                    );
                    report.failed += 1;
                }
            }
        }

        info!(
            order_number = %order.order_number,
            sent = report.sent,
            failed = report.failed,
            skipped = report.skipped,
            "Dispatched {:?} notifications",
            kind
        );
        report
    }
}

fn greeting(order: &Order) -> String {
    match order.customer_name.as_deref().filter(|n| !n.trim().is_empty()) {
        Some(name) => format!("Hi {},", name.trim()),
        None => "Hi,".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order() -> Order {
        let mut order = Order::new("ORD-1", 25.5)
            .with_email("ama@example.com")
            .with_phone("0241234567");
        order.customer_name = Some("Ama".to_string());
        order
    }

    #[tokio::test]
    async fn test_confirmation_goes_to_every_contact() {
        let notifier = Arc::new(RecordingNotifier::new());
        let dispatcher = NotificationDispatcher::new(notifier.clone(), "GHS");

        let report = dispatcher.order_confirmation(&order()).await;
        assert_eq!(report.sent, 2);

        let sent = notifier.messages().await;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].channel, Channel::Email);
        assert_eq!(sent[0].subject.as_deref(), Some("Order ORD-1 confirmed"));
        assert!(sent[0].body.starts_with("Hi Ama,"));
        assert!(sent[0].body.contains("GHS 25.50"));
        assert_eq!(sent[1].channel, Channel::Sms);
        assert_eq!(sent[1].recipient, "0241234567");
    }

    #[tokio::test]
    async fn test_no_contacts_sends_nothing() {
        let notifier = Arc::new(RecordingNotifier::new());
        let dispatcher = NotificationDispatcher::new(notifier.clone(), "GHS");

        let report = dispatcher
            .status_update(&Order::new("ORD-2", 1.0), "payment failed")
            .await;
        assert_eq!(report, DispatchReport::default());
        assert!(notifier.messages().await.is_empty());
    }

    #[tokio::test]
    async fn test_failures_are_counted_not_returned() {
        let notifier = Arc::new(RecordingNotifier::failing_on(Channel::Sms));
        let dispatcher = NotificationDispatcher::new(notifier.clone(), "GHS");

        let report = dispatcher
            .payment_link(&order(), "https://pay.moolre.com/abc")
            .await;
        assert_eq!(report.sent, 1);
        assert_eq!(report.failed, 1);

        let sent = notifier.messages_of(NotificationKind::PaymentLink).await;
        assert_eq!(sent.len(), 1);
        assert!(sent[0].body.contains("https://pay.moolre.com/abc"));
    }
}
