use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use super::{base_url, parse_json, rate_limit_headers, AppState};
use crate::error::AppResult;
use crate::payments::InitiatePayment;
use crate::rate_limit::limits;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PaymentLinkBody {
    pub order_id: Option<Value>,
    /// Number or numeric string
    pub amount: Option<Value>,
    pub customer_email: Option<String>,
    pub send_link: bool,
}

impl From<PaymentLinkBody> for InitiatePayment {
    fn from(body: PaymentLinkBody) -> Self {
        let order_id = body.order_id.and_then(|id| match id {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });
        let amount = body.amount.and_then(|amount| match amount {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        });

        Self {
            order_id,
            amount,
            customer_email: body.customer_email.filter(|e| !e.trim().is_empty()),
            send_link: body.send_link,
        }
    }
}

/// `POST /api/payment/moolre`: create a hosted payment link
pub async fn create_payment_link(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    let decision = state
        .rate_limiter
        .enforce("payment", &headers, limits::PAYMENT)
        .await?;

    let body: PaymentLinkBody = parse_json(&body)?;
    let base_url = base_url(&state, &headers);
    let created = state.payments.initiate_payment(body.into(), &base_url).await?;

    Ok((rate_limit_headers(&decision), Json(created)))
}
