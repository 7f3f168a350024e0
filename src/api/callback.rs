use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use super::{rate_limit_headers, AppState};
use crate::error::AppResult;
use crate::payments::callback::parse_body;
use crate::rate_limit::limits;

#[derive(Serialize)]
pub struct ReadyResponse {
    pub message: String,
    pub timestamp: String,
}

/// `POST /api/payment/moolre/callback`: gateway webhook
pub async fn receive_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    let decision = state
        .rate_limiter
        .enforce("callback", &headers, limits::CALLBACK)
        .await?;

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());
    let payload = parse_body(content_type, body).await;
    let ack = state.payments.handle_callback(&payload).await?;

    Ok((rate_limit_headers(&decision), Json(ack)))
}

/// `GET /api/payment/moolre/callback`: lets the gateway dashboard check the URL
pub async fn callback_ready(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<impl IntoResponse> {
    let decision = state
        .rate_limiter
        .enforce("default", &headers, limits::DEFAULT)
        .await?;

    let response = ReadyResponse {
        message: "Moolre callback endpoint ready".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };
    Ok((rate_limit_headers(&decision), Json(response)))
}
