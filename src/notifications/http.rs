//! HTTP delivery: a JSON email API and Moolre's SMS API

use super::{Channel, Message, NotificationError, NotificationResult, Notifier};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error};

const DEFAULT_SMS_API_URL: &str = "https://api.moolre.com/open/sms/send";
const DEFAULT_SENDER_ID: &str = "MyStore";

#[derive(Debug, Clone)]
pub struct EmailChannelConfig {
    pub api_url: String,
    pub api_key: String,
    /// Sender address, e.g. `Store <orders@example.com>`
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct SmsChannelConfig {
    pub api_url: String,
    /// Moolre VAS key
    pub api_key: String,
    pub sender_id: String,
}

/// Which channels are enabled; a channel without credentials is disabled
#[derive(Debug, Clone, Default)]
pub struct NotifierConfig {
    pub email: Option<EmailChannelConfig>,
    pub sms: Option<SmsChannelConfig>,
}

impl NotifierConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let email = match (var("EMAIL_API_URL"), var("EMAIL_API_KEY"), var("EMAIL_FROM")) {
            (Some(api_url), Some(api_key), Some(from)) => Some(EmailChannelConfig {
                api_url,
                api_key,
                from,
            }),
            _ => None,
        };

        let sms = var("SMS_API_KEY").map(|api_key| SmsChannelConfig {
            api_url: var("SMS_API_URL").unwrap_or_else(|| DEFAULT_SMS_API_URL.to_string()),
            api_key,
            sender_id: var("SMS_SENDER_ID").unwrap_or_else(|| DEFAULT_SENDER_ID.to_string()),
        });

        Self { email, sms }
    }

    pub fn enabled_channels(&self) -> Vec<Channel> {
        let mut channels = Vec::new();
        if self.email.is_some() {
            channels.push(Channel::Email);
        }
        if self.sms.is_some() {
            channels.push(Channel::Sms);
        }
        channels
    }
}

pub struct HttpNotifier {
    config: NotifierConfig,
    client: Client,
}

impl HttpNotifier {
    pub fn new(config: NotifierConfig) -> NotificationResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| NotificationError::Transport(e.to_string()))?;
        Ok(Self { config, client })
    }

    async fn send_email(
        &self,
        config: &EmailChannelConfig,
        message: &Message,
    ) -> NotificationResult<()> {
        let payload = json!({
            "from": config.from,
            "to": [message.recipient],
            "subject": message.subject.as_deref().unwrap_or_default(),
            "text": message.body,
        });

        let response = self
            .client
            .post(&config.api_url)
            .bearer_auth(&config.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotificationError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Email API returned HTTP {}", status);
            return Err(NotificationError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    async fn send_sms(&self, config: &SmsChannelConfig, message: &Message) -> NotificationResult<()> {
        let payload = json!({
            "type": 1,
            "senderid": config.sender_id,
            "messages": [{
                "recipient": format_phone(&message.recipient),
                "message": message.body,
            }],
        });

        let response = self
            .client
            .post(&config.api_url)
            .header("X-API-VASKEY", &config.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotificationError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let accepted = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("status").and_then(Value::as_i64))
            == Some(1);

        if !status.is_success() || !accepted {
            error!("SMS API rejected message (HTTP {})", status);
            return Err(NotificationError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn deliver(&self, message: &Message) -> NotificationResult<()> {
        match message.channel {
            Channel::Email => {
                let config = self
                    .config
                    .email
                    .as_ref()
                    .ok_or(NotificationError::ChannelNotConfigured(Channel::Email))?;
                self.send_email(config, message).await?;
            }
            Channel::Sms => {
                let config = self
                    .config
                    .sms
                    .as_ref()
                    .ok_or(NotificationError::ChannelNotConfigured(Channel::Sms))?;
                self.send_sms(config, message).await?;
            }
        }
        debug!(
            order_number = %message.order_number,
            channel = %message.channel,
            "Notification delivered"
        );
        Ok(())
    }
}

/// Normalize a Ghanaian phone number to `+233XXXXXXXXX`
///
/// Local numbers (`024...`) and bare subscriber numbers are prefixed with the
/// country code; anything else keeps its digits.
pub fn format_phone(phone: &str) -> String {
    let mut digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    if digits.starts_with('0') {
        digits = format!("233{}", &digits[1..]);
    }
    if !digits.starts_with("233") && digits.len() == 9 {
        digits = format!("233{}", digits);
    }
    format!("+{}", digits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::NotificationKind;
    use std::collections::HashMap;

    #[test]
    fn test_format_phone() {
        assert_eq!(format_phone("024 123 4567"), "+233241234567");
        assert_eq!(format_phone("241234567"), "+233241234567");
        assert_eq!(format_phone("+233 24 123 4567"), "+233241234567");
    }

    #[test]
    fn test_channels_enabled_by_credentials() {
        let vars = HashMap::from([
            ("EMAIL_API_URL", "https://mail.test/emails"),
            ("EMAIL_API_KEY", "key"),
            ("SMS_SENDER_ID", "Shop"),
        ]);
        let config = NotifierConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert!(config.email.is_none());
        assert!(config.sms.is_none());

        let vars = HashMap::from([
            ("EMAIL_API_URL", "https://mail.test/emails"),
            ("EMAIL_API_KEY", "key"),
            ("EMAIL_FROM", "orders@shop.test"),
            ("SMS_API_KEY", "vas"),
        ]);
        let config = NotifierConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.enabled_channels(), vec![Channel::Email, Channel::Sms]);
        let sms = config.sms.unwrap();
        assert_eq!(sms.api_url, DEFAULT_SMS_API_URL);
        assert_eq!(sms.sender_id, DEFAULT_SENDER_ID);
    }

    #[tokio::test]
    async fn test_disabled_channel_is_reported() {
        let notifier = HttpNotifier::new(NotifierConfig::default()).unwrap();
        let message = Message {
            kind: NotificationKind::OrderConfirmation,
            channel: Channel::Sms,
            order_number: "ORD-1".to_string(),
            recipient: "0241234567".to_string(),
            subject: None,
            body: "Paid".to_string(),
        };
        assert_eq!(
            notifier.deliver(&message).await,
            Err(NotificationError::ChannelNotConfigured(Channel::Sms))
        );
    }
}
