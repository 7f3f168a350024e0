use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::AppState;

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub environment: String,
    pub gateway_configured: bool,
    pub database: String,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let version = env!("CARGO_PKG_VERSION").to_string();

    let database = match state.payments.orders().health_check().await {
        Ok(()) => "connected".to_string(),
        Err(e) => {
            warn!("Database health check failed: {}", e);
            "unavailable".to_string()
        }
    };

    let response = HealthResponse {
        status: if database == "connected" {
            "healthy".to_string()
        } else {
            "degraded".to_string()
        },
        version,
        environment: state.environment.clone(),
        gateway_configured: state.payments.gateway_configured(),
        database,
    };

    Json(response)
}
