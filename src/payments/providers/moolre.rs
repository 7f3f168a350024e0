//! Moolre payment gateway implementation
//!
//! Hosted payment links (`/embed/link`) and payment status queries
//! (`/embed/status`) against Moolre's API, used for Ghana cedi (GHS)
//! payments via mobile money and card.

use crate::error::{AppError, AppErrorKind, AppResult, ExternalError, InfrastructureError};
use crate::payments::callback::is_one;
use crate::payments::traits::PaymentGateway;
use crate::payments::types::{GatewayStatus, PaymentLink, PaymentLinkRequest};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error, info, warn};

const PROVIDER: &str = "Moolre";

/// Status words the status endpoint uses for a completed payment
const CONFIRMED_STATUSES: [&str; 4] = ["success", "successful", "completed", "paid"];

/// Moolre gateway configuration
#[derive(Debug, Clone)]
pub struct MoolreConfig {
    pub api_user: String,
    pub api_pubkey: String,
    pub account_number: String,
    /// Moolre API base URL (defaults to https://api.moolre.com)
    pub base_url: String,
    /// Business email the links are created under
    pub merchant_email: String,
    pub currency: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for MoolreConfig {
    fn default() -> Self {
        Self {
            api_user: String::new(),
            api_pubkey: String::new(),
            account_number: String::new(),
            base_url: "https://api.moolre.com".to_string(),
            merchant_email: "admin@standardecom.com".to_string(),
            currency: "GHS".to_string(),
            timeout_secs: 30,
        }
    }
}

impl MoolreConfig {
    /// Create config from environment variables
    ///
    /// Returns `None` unless the API user, public key, and account number
    /// are all set. The gateway is then treated as not configured.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        let (api_user, api_pubkey, account_number) = match (
            var("MOOLRE_API_USER"),
            var("MOOLRE_API_PUBKEY"),
            var("MOOLRE_ACCOUNT_NUMBER"),
        ) {
            (Some(user), Some(pubkey), Some(account)) => (user, pubkey, account),
            _ => return None,
        };

        Some(Self {
            api_user,
            api_pubkey,
            account_number,
            base_url: var("MOOLRE_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            merchant_email: var("MOOLRE_MERCHANT_EMAIL").unwrap_or(defaults.merchant_email),
            currency: var("MOOLRE_CURRENCY").unwrap_or(defaults.currency),
            timeout_secs: var("MOOLRE_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.timeout_secs),
        })
    }
}

/// Moolre payment gateway
pub struct MoolreGateway {
    config: MoolreConfig,
    client: Client,
}

impl MoolreGateway {
    /// Create a new Moolre gateway instance
    pub fn new(config: MoolreConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                AppError::new(AppErrorKind::Infrastructure(
                    InfrastructureError::Configuration {
                        message: format!("Failed to create HTTP client: {}", e),
                    },
                ))
            })?;

        Ok(Self { config, client })
    }

    /// Create gateway from environment variables, if configured
    pub fn from_env() -> AppResult<Option<Self>> {
        MoolreConfig::from_env().map(Self::new).transpose()
    }

    /// Body sent to `/embed/link`
    fn link_payload(&self, request: &PaymentLinkRequest) -> Value {
        json!({
            "type": 1,
            "amount": request.amount.to_string(),
            "email": self.config.merchant_email,
            "externalref": request.external_reference,
            "callback": request.callback_url,
            "redirect": request.redirect_url,
            "reusable": "0",
            "currency": self.config.currency,
            "accountnumber": self.config.account_number,
            "metadata": {
                "customer_email": request.customer_email,
                "original_order_number": request.order_number,
            },
        })
    }

    /// Make an authenticated request to the Moolre API
    ///
    /// Single attempt. Any HTTP status is accepted as long as the body is
    /// Moolre's JSON envelope, whose `status` field carries the verdict.
    async fn make_request(&self, endpoint: &str, body: &Value) -> AppResult<MoolreResponse> {
        let url = format!("{}{}", self.config.base_url, endpoint);

        let response = self
            .client
            .post(&url)
            .header("X-API-USER", &self.config.api_user)
            .header("X-API-PUBKEY", &self.config.api_pubkey)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                error!("Moolre request to {} failed: {}", endpoint, e);
                unavailable(format!("Request failed: {}", e))
            })?;

        let status = response.status();
        let response_text = response.text().await.map_err(|e| {
            error!("Failed to read Moolre response: {}", e);
            unavailable(format!("Failed to read response: {}", e))
        })?;

        serde_json::from_str::<MoolreResponse>(&response_text).map_err(|e| {
            error!(
                "Failed to parse Moolre response (HTTP {}): {}",
                status, e
            );
            unavailable(format!("Invalid response format (HTTP {}): {}", status, e))
        })
    }
}

fn unavailable(message: String) -> AppError {
    AppError::new(AppErrorKind::External(ExternalError::ProviderUnavailable {
        provider: PROVIDER.to_string(),
        message,
    }))
}

/// Turn a link-creation envelope into a link or the gateway's refusal
fn link_from_response(response: MoolreResponse) -> AppResult<PaymentLink> {
    let authorization_url = response
        .data
        .as_ref()
        .and_then(|data| data.get("authorization_url"))
        .and_then(Value::as_str)
        .filter(|url| !url.is_empty());

    match authorization_url {
        Some(url) if is_one(&response.status) => Ok(PaymentLink {
            authorization_url: url.to_string(),
            reference: response
                .data
                .as_ref()
                .and_then(|data| data.get("reference"))
                .and_then(|reference| match reference {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                }),
        }),
        _ => {
            let message = response
                .message
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "Failed to generate payment link".to_string());
            warn!("Moolre refused payment link: {}", message);
            Err(AppError::new(AppErrorKind::External(
                ExternalError::PaymentProvider {
                    provider: PROVIDER.to_string(),
                    message,
                    is_retryable: false,
                },
            )))
        }
    }
}

/// Interpret a status-query envelope
fn status_from_response(response: &MoolreResponse) -> GatewayStatus {
    let data = response.data.as_ref().filter(|data| !data.is_null());

    let status_word = data
        .and_then(|data| data.get("status"))
        .and_then(|status| match status {
            Value::String(s) => Some(s.trim().to_lowercase()),
            Value::Null => None,
            other => Some(other.to_string()),
        })
        .filter(|word| !word.is_empty());

    // A payment status, when reported, is the only thing that counts
    let confirmed = match status_word {
        Some(word) => CONFIRMED_STATUSES.contains(&word.as_str()),
        None => is_one(&response.status) && data.is_some(),
    };

    if confirmed {
        GatewayStatus::Confirmed
    } else {
        GatewayStatus::Unconfirmed
    }
}

#[async_trait]
impl PaymentGateway for MoolreGateway {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn create_payment_link(&self, request: PaymentLinkRequest) -> AppResult<PaymentLink> {
        info!(
            order_number = %request.order_number,
            external_reference = %request.external_reference,
            amount = request.amount,
            callback = %request.callback_url,
            "Initiating Moolre payment link"
        );

        let payload = self.link_payload(&request);
        let response = self.make_request("/embed/link", &payload).await?;
        debug!(
            "Moolre link response status={} has_url={}",
            response.status,
            response
                .data
                .as_ref()
                .and_then(|d| d.get("authorization_url"))
                .is_some()
        );

        let link = link_from_response(response)?;
        info!(
            "Moolre payment link created: order_number={}",
            request.order_number
        );
        Ok(link)
    }

    async fn query_status(&self, order_number: &str) -> AppResult<GatewayStatus> {
        let payload = json!({ "externalref": order_number });
        let response = self.make_request("/embed/status", &payload).await?;
        let status = status_from_response(&response);

        info!(
            "Moolre status query: order_number={}, status={:?}",
            order_number, status
        );
        Ok(status)
    }
}

// Moolre API response envelope
#[derive(Debug, Deserialize)]
struct MoolreResponse {
    #[serde(default)]
    status: Value,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn test_config() -> MoolreConfig {
        MoolreConfig {
            api_user: "store_user".to_string(),
            api_pubkey: "pk_test".to_string(),
            account_number: "10203040".to_string(),
            ..MoolreConfig::default()
        }
    }

    fn envelope(body: Value) -> MoolreResponse {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_moolre_config_default() {
        let config = MoolreConfig::default();
        assert_eq!(config.base_url, "https://api.moolre.com");
        assert_eq!(config.currency, "GHS");
        assert_eq!(config.merchant_email, "admin@standardecom.com");
        assert_eq!(config.timeout_secs, 30);
    }

    #[test]
    fn test_moolre_config_requires_all_credentials() {
        let mut vars: HashMap<&str, &str> = HashMap::from([
            ("MOOLRE_API_USER", "user"),
            ("MOOLRE_API_PUBKEY", "pk"),
        ]);
        assert!(MoolreConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).is_none());

        vars.insert("MOOLRE_ACCOUNT_NUMBER", "  ");
        assert!(MoolreConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).is_none());

        vars.insert("MOOLRE_ACCOUNT_NUMBER", "123");
        vars.insert("MOOLRE_BASE_URL", "https://sandbox.moolre.test/");
        vars.insert("MOOLRE_TIMEOUT_SECS", "5");
        let config = MoolreConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.base_url, "https://sandbox.moolre.test");
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.currency, "GHS");
    }

    #[test]
    fn test_link_payload_shape() {
        let gateway = MoolreGateway::new(test_config()).unwrap();
        let payload = gateway.link_payload(&PaymentLinkRequest {
            order_number: "ORD-5".to_string(),
            external_reference: "ORD-5-R1700000000000".to_string(),
            amount: 2.0,
            customer_email: Some("ama@example.com".to_string()),
            callback_url: "https://shop.test/api/payment/moolre/callback".to_string(),
            redirect_url: "https://shop.test/order-success?order=ORD-5&payment_success=true"
                .to_string(),
        });

        assert_eq!(payload["type"], 1);
        assert_eq!(payload["amount"], "2");
        assert_eq!(payload["reusable"], "0");
        assert_eq!(payload["externalref"], "ORD-5-R1700000000000");
        assert_eq!(payload["accountnumber"], "10203040");
        assert_eq!(payload["email"], "admin@standardecom.com");
        assert_eq!(payload["metadata"]["original_order_number"], "ORD-5");
        assert_eq!(payload["metadata"]["customer_email"], "ama@example.com");
    }

    #[test]
    fn test_link_requires_status_and_url() {
        let link = link_from_response(envelope(json!({
            "status": 1,
            "data": { "authorization_url": "https://pay.moolre.com/x", "reference": "L1" }
        })))
        .unwrap();
        assert_eq!(link.authorization_url, "https://pay.moolre.com/x");
        assert_eq!(link.reference.as_deref(), Some("L1"));

        let refused = link_from_response(envelope(json!({
            "status": 0,
            "message": "Invalid account number"
        })))
        .unwrap_err();
        assert_eq!(refused.public_message(), "Invalid account number");
        assert_eq!(refused.status_code(), axum::http::StatusCode::BAD_REQUEST);

        let no_url = link_from_response(envelope(json!({ "status": 1, "data": {} }))).unwrap_err();
        assert_eq!(no_url.public_message(), "Failed to generate payment link");
    }

    #[test]
    fn test_status_vocabulary() {
        for word in ["SUCCESS", "Successful", "completed", "paid"] {
            let response = envelope(json!({ "status": 0, "data": { "status": word } }));
            assert_eq!(status_from_response(&response), GatewayStatus::Confirmed);
        }

        let pending = envelope(json!({ "status": 0, "data": { "status": "pending" } }));
        assert_eq!(status_from_response(&pending), GatewayStatus::Unconfirmed);

        let ok_with_data = envelope(json!({ "status": 1, "data": { "txstatus": 3 } }));
        assert_eq!(status_from_response(&ok_with_data), GatewayStatus::Confirmed);

        // The call succeeded but the payment has not
        for word in ["pending", "failed", "Processing", "1"] {
            let in_flight = envelope(json!({ "status": 1, "data": { "status": word } }));
            assert_eq!(status_from_response(&in_flight), GatewayStatus::Unconfirmed);
        }

        let blank_word = envelope(json!({ "status": 1, "data": { "status": "", "txstatus": 1 } }));
        assert_eq!(status_from_response(&blank_word), GatewayStatus::Confirmed);

        let ok_without_data = envelope(json!({ "status": 1, "data": null }));
        assert_eq!(status_from_response(&ok_without_data), GatewayStatus::Unconfirmed);
    }
}
