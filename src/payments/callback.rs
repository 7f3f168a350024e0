//! Normalization of gateway webhook payloads
//!
//! Moolre's callbacks are loosely shaped: the fields we need may sit at the
//! top level or under `data`, numbers may arrive as strings, and the body may
//! be JSON, form-encoded, or untyped text. Everything about that contract is
//! confined to this module. Handlers only ever see a `CallbackNotice`.
//!
//! A typical successful callback:
//!
//! ```json
//! {
//!   "status": 1,
//!   "code": "P01",
//!   "message": "Transaction Successful",
//!   "data": {
//!     "txtstatus": 1,
//!     "amount": "2",
//!     "transactionid": "42252702",
//!     "externalref": "ORD-1770330034217-441-R1770330040000",
//!     "thirdpartyref": "74658410493"
//!   },
//!   "secret": "c23bc2ab-...",
//!   "ts": "2026-02-05 22:21:16"
//! }
//! ```

use crate::error::{AppError, AppResult};
use crate::payments::reference::canonical_order_number;
use axum::body::{Body, Bytes};
use axum::extract::{FromRequest, Multipart, Request};
use axum::http::header;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

const SUCCESS_KEYWORDS: [&str; 4] = ["successful", "success", "completed", "paid"];

/// Gateway reference used when the callback carries none
pub const FALLBACK_GATEWAY_REFERENCE: &str = "callback";

/// Parse a callback body into a JSON object, whatever the content type
///
/// Never fails: anything unreadable becomes an empty object and the
/// missing fields are reported further down.
pub async fn parse_body(content_type: Option<&str>, body: Bytes) -> Value {
    let content_type = content_type.unwrap_or_default();
    let media_type = content_type.trim().to_ascii_lowercase();

    let parsed = if media_type.starts_with("application/json") {
        serde_json::from_slice(&body).unwrap_or_else(|e| {
            warn!("Callback body is not valid JSON: {}", e);
            Value::Null
        })
    } else if media_type.starts_with("multipart/form-data") {
        parse_multipart(content_type, body).await
    } else if media_type.starts_with("application/x-www-form-urlencoded") {
        parse_form(&body)
    } else {
        serde_json::from_slice(&body).unwrap_or_else(|_| parse_form(&body))
    };

    let mut object = match parsed {
        Value::Object(map) => map,
        other => {
            if !other.is_null() {
                warn!("Callback body is not an object, ignoring it");
            }
            Map::new()
        }
    };

    // Form posts can only carry `data` as an encoded JSON string
    if let Some(Value::String(raw)) = object.get("data") {
        if let Ok(Value::Object(data)) = serde_json::from_str::<Value>(raw) {
            object.insert("data".to_string(), Value::Object(data));
        }
    }

    Value::Object(object)
}

fn parse_form(body: &[u8]) -> Value {
    let map: Map<String, Value> = url::form_urlencoded::parse(body)
        .map(|(key, value)| (key.into_owned(), Value::String(value.into_owned())))
        .collect();
    Value::Object(map)
}

/// Text parts of a `multipart/form-data` body; file parts are skipped
///
/// Fields read before a malformed part are kept.
async fn parse_multipart(content_type: &str, body: Bytes) -> Value {
    let request = match Request::builder()
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body))
    {
        Ok(request) => request,
        Err(e) => {
            warn!("Callback content type is not a valid header: {}", e);
            return Value::Null;
        }
    };

    let mut multipart = match Multipart::from_request(request, &()).await {
        Ok(multipart) => multipart,
        Err(rejection) => {
            warn!("Callback multipart body rejected: {}", rejection);
            return Value::Null;
        }
    };

    let mut map = Map::new();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!("Malformed multipart callback body: {}", e);
                break;
            }
        };
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        if field.file_name().is_some() {
            continue;
        }
        match field.text().await {
            Ok(value) => {
                map.insert(name, Value::String(value));
            }
            Err(e) => {
                warn!(field = %name, "Unreadable multipart callback field: {}", e);
                break;
            }
        }
    }
    Value::Object(map)
}

/// Non-empty textual form of a scalar field
fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// The gateway's "yes": `1` or `"1"`
pub(crate) fn is_one(value: &Value) -> bool {
    match value {
        Value::Number(n) => n.as_f64() == Some(1.0),
        Value::String(s) => s.trim() == "1",
        _ => false,
    }
}

fn amount(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// First non-empty text found at `paths`, each path a list of object keys
fn first_text(body: &Value, paths: &[&[&str]]) -> Option<String> {
    paths.iter().find_map(|path| {
        path.iter()
            .try_fold(body, |value, key| value.get(key))
            .and_then(text)
    })
}

fn first_value<'a>(body: &'a Value, paths: &[&[&str]]) -> Option<&'a Value> {
    paths.iter().find_map(|path| {
        path.iter()
            .try_fold(body, |value, key| value.get(key))
            .filter(|value| !value.is_null())
    })
}

/// Every field of interest, as found, before any decision is made
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallbackFields {
    pub external_reference: Option<String>,
    pub metadata_order_number: Option<String>,
    pub gateway_reference: Option<String>,
    pub api_status: Option<Value>,
    pub transaction_status: Option<Value>,
    pub message: Option<String>,
    pub amount: Option<f64>,
    pub secret: Option<String>,
}

impl CallbackFields {
    pub fn extract(body: &Value) -> Self {
        Self {
            external_reference: first_text(
                body,
                &[
                    &["data", "externalref"],
                    &["data", "external_reference"],
                    &["data", "orderRef"],
                    &["externalref"],
                    &["orderRef"],
                    &["external_reference"],
                ],
            ),
            metadata_order_number: first_text(
                body,
                &[
                    &["data", "metadata", "original_order_number"],
                    &["metadata", "original_order_number"],
                ],
            ),
            gateway_reference: first_text(
                body,
                &[&["data", "transactionid"], &["data", "thirdpartyref"], &["reference"]],
            ),
            api_status: body.get("status").filter(|v| !v.is_null()).cloned(),
            transaction_status: first_value(body, &[&["data", "txtstatus"]]).cloned(),
            message: first_text(body, &[&["message"]]),
            amount: first_value(body, &[&["data", "amount"], &["amount"]]).and_then(amount),
            secret: first_text(body, &[&["secret"]]),
        }
    }

    /// Whether any of the gateway's success signals is present
    ///
    /// Keyword matching is a substring match, so a message such as
    /// "unsuccessful" reads as success when no status code says otherwise.
    pub fn signals_success(&self) -> bool {
        let status_ok = self.api_status.as_ref().map_or(false, is_one)
            || self.transaction_status.as_ref().map_or(false, is_one);
        if status_ok {
            return true;
        }

        let message = self.message.as_deref().unwrap_or_default().to_lowercase();
        SUCCESS_KEYWORDS.iter().any(|keyword| message.contains(keyword))
    }

    /// Decide what the callback says, or reject it for lacking an order reference
    pub fn resolve(self) -> AppResult<CallbackNotice> {
        let order_number = match (&self.external_reference, &self.metadata_order_number) {
            (Some(reference), _) => canonical_order_number(reference).to_string(),
            (None, Some(order_number)) => order_number.clone(),
            (None, None) => return Err(AppError::missing_field("order reference")),
        };

        let outcome = if self.signals_success() {
            CallbackOutcome::Succeeded
        } else {
            CallbackOutcome::Failed {
                reason: self
                    .message
                    .clone()
                    .unwrap_or_else(|| "Payment failed".to_string()),
            }
        };

        debug!(
            order_number = %order_number,
            api_status = ?self.api_status,
            transaction_status = ?self.transaction_status,
            message = ?self.message,
            "resolved callback"
        );

        Ok(CallbackNotice {
            order_number,
            gateway_reference: self
                .gateway_reference
                .unwrap_or_else(|| FALLBACK_GATEWAY_REFERENCE.to_string()),
            outcome,
            amount: self.amount,
            secret: self.secret,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CallbackOutcome {
    Succeeded,
    Failed { reason: String },
}

/// What a callback tells us, in our own terms
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackNotice {
    pub order_number: String,
    pub gateway_reference: String,
    pub outcome: CallbackOutcome,
    pub amount: Option<f64>,
    pub secret: Option<String>,
}

impl CallbackNotice {
    pub fn from_body(body: &Value) -> AppResult<Self> {
        CallbackFields::extract(body).resolve()
    }

    pub fn is_success(&self) -> bool {
        self.outcome == CallbackOutcome::Succeeded
    }
}

/// Constant-time comparison of a configured secret with the one provided
pub fn secret_matches(expected: &str, provided: Option<&str>) -> bool {
    let Some(provided) = provided else {
        return false;
    };

    // Hash first so lengths never leak through an early exit
    let expected = Sha256::digest(expected.as_bytes());
    let provided = Sha256::digest(provided.as_bytes());
    expected
        .iter()
        .zip(provided.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
