//! Error types for the snoolens pipeline
//!
//! Each collaborator (content source, model endpoint, relational store,
//! fingerprint store) has its own error enum so callers can match on the
//! failure modes that drive control flow: tombstoning, skipping, aborting.

use thiserror::Error;

/// Errors returned by a content source (the Reddit API)
#[derive(Error, Debug)]
pub enum SourceError {
    /// Entity does not exist (HTTP 404 or an empty lookup)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Access denied (HTTP 403, private or quarantined content)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Account is suspended; profile fields are not available
    #[error("Account suspended: {0}")]
    Suspended(String),

    /// Rate limit exceeded (HTTP 429)
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Any other non-success response
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Authentication against the OAuth endpoint failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Transport error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body could not be decoded into the expected shape
    #[error("Decoding error: {0}")]
    Decode(String),
}

impl SourceError {
    /// Entity is permanently unavailable and must not be retried.
    pub fn is_gone(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::Forbidden(_) | Self::Suspended(_)
        )
    }

    /// Short machine-friendly kind, stored with error records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Forbidden(_) => "forbidden",
            Self::Suspended(_) => "suspended",
            Self::RateLimited => "rate_limited",
            Self::Api { .. } => "api",
            Self::Auth(_) => "auth",
            Self::Http(_) => "http",
            Self::Decode(_) => "decode",
        }
    }

    pub(crate) fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

/// Errors returned by the model inference endpoint
#[derive(Error, Debug)]
pub enum LlmError {
    /// Endpoint unreachable (connection refused, timeout)
    #[error("Model endpoint unreachable: {0}")]
    Connection(String),

    /// Endpoint answered with a non-success status
    #[error("Model API error {status}: {body}")]
    Api { status: u16, body: String },

    /// Response body could not be decoded
    #[error("Model response decoding error: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            Self::Connection(err.to_string())
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Api {
                status: err.status().map(|s| s.as_u16()).unwrap_or(0),
                body: err.to_string(),
            }
        }
    }
}

/// Errors returned by the relational store
#[derive(Error, Debug)]
pub enum StoreError {
    /// PostgreSQL driver error
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// Connection pool error
    #[error("Connection pool error: {0}")]
    Pool(String),

    /// SQLite driver error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Table or column name outside the known schema
    #[error("Unknown column {table}.{column}")]
    UnknownColumn { table: String, column: String },

    /// Row could not be converted
    #[error("Row conversion error: {0}")]
    Conversion(String),
}

impl From<deadpool_postgres::PoolError> for StoreError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}

/// Errors returned by the fingerprint store
#[derive(Error, Debug)]
pub enum FingerprintError {
    /// Redis command failed
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Could not obtain a pooled connection
    #[error("Connection pool error: {0}")]
    Pool(String),
}

impl From<deadpool_redis::PoolError> for FingerprintError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}

/// Errors from encrypting analysis text at rest
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Key file missing or unreadable
    #[error("Failed to read key file {path}: {source}")]
    KeyFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Key is not a valid url-safe base64 32-byte Fernet key
    #[error("Invalid Fernet key")]
    InvalidKey,

    /// Token could not be decrypted with the configured key
    #[error("Decryption failed")]
    Decrypt,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gone_errors() {
        assert!(SourceError::NotFound("u/x".into()).is_gone());
        assert!(SourceError::Suspended("x".into()).is_gone());
        assert!(SourceError::Forbidden("x".into()).is_gone());
        assert!(!SourceError::RateLimited.is_gone());
    }

    #[test]
    fn test_transient_errors() {
        assert!(SourceError::RateLimited.is_transient());
        assert!(SourceError::Api {
            status: 503,
            message: "unavailable".into()
        }
        .is_transient());
        assert!(!SourceError::Api {
            status: 400,
            message: "bad".into()
        }
        .is_transient());
        assert!(!SourceError::NotFound("t3_x".into()).is_transient());
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(SourceError::NotFound("x".into()).kind(), "not_found");
        assert_eq!(SourceError::Decode("x".into()).kind(), "decode");
    }
}
