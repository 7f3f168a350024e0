use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use super::{parse_json, rate_limit_headers, AppState};
use crate::error::AppResult;
use crate::rate_limit::limits;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VerifyBody {
    pub order_number: Option<String>,
    /// Only a JSON `true` counts
    pub from_redirect: Value,
}

/// `POST /api/payment/moolre/verify`: confirm payment after the gateway redirect
pub async fn verify_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    let decision = state
        .rate_limiter
        .enforce("verify", &headers, limits::VERIFICATION)
        .await?;

    let body: VerifyBody = parse_json(&body)?;
    let from_redirect = body.from_redirect == Value::Bool(true);
    let result = state
        .payments
        .verify_payment(body.order_number.as_deref().unwrap_or_default(), from_redirect)
        .await?;

    Ok((rate_limit_headers(&decision), Json(result)))
}
