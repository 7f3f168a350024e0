//! Application error taxonomy
//!
//! Every handler returns `AppResult<T>`. Errors carry a kind (validation,
//! domain, external, infrastructure) that decides the HTTP status and the
//! message returned to the caller.

use crate::cache::CacheError;
use crate::database::error::DatabaseError;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

pub type AppResult<T> = Result<T, AppError>;

/// Request input that cannot be acted upon
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing {field}")]
    MissingField { field: String },

    #[error("Invalid {field}: {message}")]
    InvalidField { field: String, message: String },
}

/// Business rule violations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("Order not found")]
    OrderNotFound { order_number: String },

    #[error("Invalid secret")]
    InvalidCallbackSecret,
}

/// Failures of third-party services
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExternalError {
    /// The provider answered but refused the request
    #[error("{message}")]
    PaymentProvider {
        provider: String,
        message: String,
        is_retryable: bool,
    },

    /// The provider could not be reached or answered garbage
    #[error("{provider} is unavailable: {message}")]
    ProviderUnavailable { provider: String, message: String },

    #[error("Too many requests. Please try again later.")]
    RateLimit {
        service: String,
        retry_after: Option<u64>,
    },
}

/// Failures of our own backing services
#[derive(Debug, Clone, Error)]
pub enum InfrastructureError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Payment gateway configuration error")]
    GatewayNotConfigured,
}

#[derive(Debug, Clone, Error)]
pub enum AppErrorKind {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    External(#[from] ExternalError),

    #[error(transparent)]
    Infrastructure(#[from] InfrastructureError),
}

#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub context: Option<String>,
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    pub fn with_context<S: Into<String>>(mut self, context: S) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn missing_field(field: &str) -> Self {
        Self::new(AppErrorKind::Validation(ValidationError::MissingField {
            field: field.to_string(),
        }))
    }

    pub fn order_not_found(order_number: &str) -> Self {
        Self::new(AppErrorKind::Domain(DomainError::OrderNotFound {
            order_number: order_number.to_string(),
        }))
    }

    pub fn status_code(&self) -> StatusCode {
        match &self.kind {
            AppErrorKind::Validation(_) => StatusCode::BAD_REQUEST,
            AppErrorKind::Domain(DomainError::OrderNotFound { .. }) => StatusCode::NOT_FOUND,
            AppErrorKind::Domain(DomainError::InvalidCallbackSecret) => StatusCode::FORBIDDEN,
            AppErrorKind::External(ExternalError::PaymentProvider { .. }) => StatusCode::BAD_REQUEST,
            AppErrorKind::External(ExternalError::ProviderUnavailable { .. }) => {
                StatusCode::BAD_GATEWAY
            }
            AppErrorKind::External(ExternalError::RateLimit { .. }) => {
                StatusCode::TOO_MANY_REQUESTS
            }
            AppErrorKind::Infrastructure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to the caller
    pub fn public_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Infrastructure(InfrastructureError::Database(_)) => {
                "Database update failed".to_string()
            }
            AppErrorKind::Infrastructure(InfrastructureError::GatewayNotConfigured) => {
                self.kind.to_string()
            }
            AppErrorKind::Infrastructure(_) => "Internal server error".to_string(),
            AppErrorKind::External(ExternalError::ProviderUnavailable { provider, .. }) => {
                format!("{} is unavailable", provider)
            }
            kind => kind.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self.kind,
            AppErrorKind::Domain(DomainError::OrderNotFound { .. })
        )
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(context) = &self.context {
            write!(f, "{} ({})", self.kind, context)
        } else {
            write!(f, "{}", self.kind)
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

impl From<AppErrorKind> for AppError {
    fn from(kind: AppErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        Self::new(AppErrorKind::Validation(err))
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        Self::new(AppErrorKind::Domain(err))
    }
}

impl From<ExternalError> for AppError {
    fn from(err: ExternalError) -> Self {
        Self::new(AppErrorKind::External(err))
    }
}

impl From<InfrastructureError> for AppError {
    fn from(err: InfrastructureError) -> Self {
        Self::new(AppErrorKind::Infrastructure(err))
    }
}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        Self::new(AppErrorKind::Infrastructure(InfrastructureError::Database(err)))
    }
}

impl From<CacheError> for AppError {
    fn from(err: CacheError) -> Self {
        Self::new(AppErrorKind::Infrastructure(InfrastructureError::Cache(err)))
    }
}

/// JSON body shared by every error response
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "request failed");
        } else {
            warn!(status = status.as_u16(), error = %self, "request rejected");
        }

        let body = ErrorBody {
            success: false,
            message: self.public_message(),
        };
        let mut response = (status, Json(body)).into_response();

        if let AppErrorKind::External(ExternalError::RateLimit {
            retry_after: Some(secs),
            ..
        }) = &self.kind
        {
            let headers = response.headers_mut();
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                headers.insert("retry-after", value.clone());
                headers.insert("x-ratelimit-reset", value);
            }
            headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
        }

        response
    }
}
