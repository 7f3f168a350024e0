//! HTTP surface: router, shared state, and request helpers

pub mod callback;
pub mod health;
pub mod payment;
pub mod verify;

use crate::error::{AppError, AppResult, ValidationError};
use crate::payments::PaymentService;
use crate::rate_limit::{RateLimitDecision, RateLimiter};
use axum::http::{HeaderMap, HeaderValue};
use axum::routing::{get, post};
use axum::Router;
use serde::de::DeserializeOwned;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

// Application state
#[derive(Clone)]
pub struct AppState {
    pub payments: PaymentService,
    pub rate_limiter: RateLimiter,
    pub environment: String,
    /// Public origin; the request's own origin is used when unset
    pub app_url: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/payment/moolre", post(payment::create_payment_link))
        .route(
            "/api/payment/moolre/callback",
            post(callback::receive_callback).get(callback::callback_ready),
        )
        .route("/api/payment/moolre/verify", post(verify::verify_payment))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
        .with_state(state)
}

/// Decode a JSON request body, reporting garbage as a client error
pub(crate) fn parse_json<T: DeserializeOwned>(body: &[u8]) -> AppResult<T> {
    serde_json::from_slice(body).map_err(|e| {
        AppError::from(ValidationError::InvalidField {
            field: "request body".to_string(),
            message: e.to_string(),
        })
    })
}

/// Rate limit headers for an allowed request
pub(crate) fn rate_limit_headers(decision: &RateLimitDecision) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
    headers.insert("x-ratelimit-reset", HeaderValue::from(decision.reset_in_secs));
    headers
}

/// Public origin of this service as seen by the caller
pub(crate) fn base_url(state: &AppState, headers: &HeaderMap) -> String {
    if let Some(app_url) = &state.app_url {
        return app_url.trim_end_matches('/').to_string();
    }

    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    let host = header("x-forwarded-host")
        .or_else(|| header("host"))
        .unwrap_or("localhost");
    let scheme = header("x-forwarded-proto").unwrap_or("http");
    format!("{}://{}", scheme, host)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use crate::database::InMemoryOrderRepository;
    use crate::notifications::{NotificationDispatcher, RecordingNotifier};
    use crate::payments::PaymentSettings;
    use std::sync::Arc;

    fn state(app_url: Option<&str>) -> AppState {
        let cache = Arc::new(InMemoryCache::new());
        AppState {
            payments: PaymentService::new(
                Arc::new(InMemoryOrderRepository::new()),
                None,
                NotificationDispatcher::new(Arc::new(RecordingNotifier::new()), "GHS"),
                cache.clone(),
                PaymentSettings::default(),
            ),
            rate_limiter: RateLimiter::new(cache),
            environment: "development".to_string(),
            app_url: app_url.map(str::to_string),
        }
    }

    #[test]
    fn test_base_url_prefers_configured_origin() {
        let mut headers = HeaderMap::new();
        headers.insert("host", HeaderValue::from_static("internal:3000"));
        assert_eq!(
            base_url(&state(Some("https://shop.test/")), &headers),
            "https://shop.test"
        );
        assert_eq!(base_url(&state(None), &headers), "http://internal:3000");

        headers.insert("x-forwarded-proto", HeaderValue::from_static("https"));
        headers.insert("x-forwarded-host", HeaderValue::from_static("shop.test"));
        assert_eq!(base_url(&state(None), &headers), "https://shop.test");
    }

    #[test]
    fn test_parse_json_rejects_garbage() {
        let err = parse_json::<serde_json::Value>(b"{oops").unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    }
}
