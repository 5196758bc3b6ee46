//! Error types shared across all layers.

use thiserror::Error;

/// PostgreSQL SQLSTATE for `serialization_failure`
const SQLSTATE_SERIALIZATION_FAILURE: &str = "40001";
/// PostgreSQL SQLSTATE for `deadlock_detected`
const SQLSTATE_DEADLOCK_DETECTED: &str = "40P01";
/// PostgreSQL SQLSTATE for `unique_violation`
const SQLSTATE_UNIQUE_VIOLATION: &str = "23505";

/// Top-level application error
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("External service error: {0}")]
    ExternalService(#[from] ExternalServiceError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A requested seat is already booked. Recoverable: retry with other seats.
    #[error("Seat {label} is already booked")]
    SeatUnavailable { seat_id: String, label: String },

    /// Action attempted against an order whose payment window has closed
    #[error("Payment for order {0} has expired")]
    PaymentExpired(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Operation not supported: {0}")]
    NotSupported(String),

    #[error("Rate limit exceeded")]
    RateLimited,
}

impl AppError {
    /// Shorthand for a missing entity
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::Database(DatabaseError::NotFound(what.into()))
    }

    /// True for transaction races the store reported; safe to retry the whole unit of work.
    #[must_use]
    pub fn is_serialization_conflict(&self) -> bool {
        matches!(self, Self::Database(DatabaseError::SerializationConflict(_)))
    }

    /// True for failures of an unreliable upstream that should be retried later,
    /// never interpreted as a negative answer.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ExternalService(e) => e.is_transient(),
            Self::Database(DatabaseError::Connection(_)) => true,
            Self::Database(DatabaseError::SerializationConflict(_)) => true,
            _ => false,
        }
    }
}

/// Input validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("{0}")]
    Multiple(String),
}

/// Persistence errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate entry: {0}")]
    Duplicate(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    /// Concurrent transaction race detected by the store
    #[error("Serialization conflict: {0}")]
    SerializationConflict(String),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::NotFound(err.to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::Connection(err.to_string())
            }
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                Some(SQLSTATE_SERIALIZATION_FAILURE) | Some(SQLSTATE_DEADLOCK_DETECTED) => {
                    Self::SerializationConflict(db_err.message().to_string())
                }
                Some(SQLSTATE_UNIQUE_VIOLATION) => Self::Duplicate(db_err.message().to_string()),
                _ => Self::Query(err.to_string()),
            },
            _ => Self::Query(err.to_string()),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(DatabaseError::from(err))
    }
}

/// Errors from price feeds and ledger explorers
#[derive(Debug, Error)]
pub enum ExternalServiceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Service misconfigured: {0}")]
    Configuration(String),
}

impl ExternalServiceError {
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_)
            | Self::Timeout(_)
            | Self::ParseError(_)
            | Self::Unavailable(_)
            | Self::RateLimited(_) => true,
            Self::ApiError { status_code, .. } => *status_code >= 500 || *status_code == 429,
            Self::Configuration(_) => false,
        }
    }
}

impl From<reqwest::Error> for ExternalServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_decode() {
            Self::ParseError(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Startup configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization_conflict_is_retryable() {
        let err = AppError::Database(DatabaseError::SerializationConflict("race".to_string()));
        assert!(err.is_serialization_conflict());
        assert!(err.is_transient());
    }

    #[test]
    fn test_seat_unavailable_is_not_transient() {
        let err = AppError::SeatUnavailable {
            seat_id: "s1".to_string(),
            label: "A1".to_string(),
        };
        assert!(!err.is_transient());
        assert_eq!(err.to_string(), "Seat A1 is already booked");
    }

    #[test]
    fn test_external_service_transience() {
        assert!(ExternalServiceError::Timeout("t".into()).is_transient());
        assert!(
            ExternalServiceError::ApiError {
                status_code: 503,
                message: "down".into()
            }
            .is_transient()
        );
        assert!(
            !ExternalServiceError::ApiError {
                status_code: 404,
                message: "missing".into()
            }
            .is_transient()
        );
        assert!(!ExternalServiceError::Configuration("no key".into()).is_transient());
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err = DatabaseError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, DatabaseError::NotFound(_)));
    }
}
