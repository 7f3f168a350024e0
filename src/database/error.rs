use thiserror::Error;

/// What went wrong talking to the order store
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DatabaseErrorKind {
    #[error("connection pool exhausted")]
    PoolExhausted,

    #[error("connection error: {message}")]
    Connection { message: String },

    #[error("query failed: {message}")]
    Query { message: String },

    /// A column held a value the order model cannot represent
    #[error("unexpected value '{value}' in column {column}")]
    Decode { column: String, value: String },

    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("{message}")]
    Other { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Order store {kind}{}", .context.as_deref().map(|c| format!(" ({})", c)).unwrap_or_default())]
pub struct DatabaseError {
    pub kind: DatabaseErrorKind,
    pub context: Option<String>,
}

impl DatabaseError {
    pub fn new(kind: DatabaseErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    /// Attach the order number (or other identifier) the failure concerns
    pub fn with_context<S: Into<String>>(mut self, context: S) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn decode(column: &str, value: &str) -> Self {
        Self::new(DatabaseErrorKind::Decode {
            column: column.to_string(),
            value: value.to_string(),
        })
    }

    /// Whether retrying the same operation later could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            DatabaseErrorKind::PoolExhausted | DatabaseErrorKind::Connection { .. }
        )
    }

    #[cfg(feature = "database")]
    pub fn from_sqlx(error: sqlx::Error) -> Self {
        let kind = match error {
            sqlx::Error::PoolTimedOut => DatabaseErrorKind::PoolExhausted,
            sqlx::Error::PoolClosed => DatabaseErrorKind::Connection {
                message: "pool is closed".to_string(),
            },
            sqlx::Error::Io(e) => DatabaseErrorKind::Connection {
                message: e.to_string(),
            },
            sqlx::Error::Configuration(e) => DatabaseErrorKind::Config {
                message: e.to_string(),
            },
            sqlx::Error::Database(e) => DatabaseErrorKind::Query {
                message: e.message().to_string(),
            },
            other => DatabaseErrorKind::Other {
                message: other.to_string(),
            },
        };
        Self::new(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(DatabaseError::new(DatabaseErrorKind::PoolExhausted).is_retryable());
        assert!(!DatabaseError::new(DatabaseErrorKind::Query {
            message: "syntax error".to_string()
        })
        .is_retryable());
        assert!(!DatabaseError::decode("status", "archived").is_retryable());
    }

    #[test]
    fn test_display_with_context() {
        let err = DatabaseError::decode("payment_status", "refunded").with_context("ORD-7");
        assert_eq!(
            err.to_string(),
            "Order store unexpected value 'refunded' in column payment_status (ORD-7)"
        );
        assert_eq!(
            DatabaseError::new(DatabaseErrorKind::PoolExhausted).to_string(),
            "Order store connection pool exhausted"
        );
    }
}
