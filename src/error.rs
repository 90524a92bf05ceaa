//! Unified error handling for the snoolens crate
//!
//! Domain-specific errors live in [`crate::utils::error`]; this module wraps
//! them in a single [`Error`] enum so engine operations can cross module
//! boundaries with `?` while still exposing the underlying failure.
//!
//! Every error has an [`ErrorCategory`]; the engines use it to decide whether a
//! failure stays local to one item or aborts the whole batch.

use std::io;
use thiserror::Error;

pub use crate::utils::error::{CryptoError, FingerprintError, LlmError, SourceError, StoreError};

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Content source errors (HTTP, rate limit, missing entities)
    Source,
    /// Model endpoint errors
    Llm,
    /// Relational storage errors
    Storage,
    /// Fingerprint store errors
    Fingerprint,
    /// Configuration, key and validation errors
    Config,
    /// Malformed payloads
    Data,
}

impl ErrorCategory {
    /// Label used in logs and error records
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Llm => "llm",
            Self::Storage => "storage",
            Self::Fingerprint => "fingerprint",
            Self::Config => "config",
            Self::Data => "data",
        }
    }

    /// Whether a failure of this category is confined to the item being processed.
    /// Source and payload errors skip one item; store, fingerprint and config
    /// errors abort the batch.
    pub fn is_item_scoped(&self) -> bool {
        matches!(self, Self::Source | Self::Data)
    }
}

/// Unified error type for the snoolens crate
#[derive(Error, Debug)]
pub enum Error {
    /// Content source errors
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Model endpoint errors
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// Relational store errors
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Fingerprint store errors
    #[error("Fingerprint store error: {0}")]
    Fingerprint(#[from] FingerprintError),

    /// Encryption errors
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Classification used for batch handling
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Source(_) => ErrorCategory::Source,
            Self::Llm(_) => ErrorCategory::Llm,
            Self::Store(_) | Self::Io(_) => ErrorCategory::Storage,
            Self::Fingerprint(_) => ErrorCategory::Fingerprint,
            Self::Crypto(_) | Self::Config(_) => ErrorCategory::Config,
            Self::Json(_) => ErrorCategory::Data,
        }
    }

    /// Short kind label stored alongside error records
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Source(e) => e.kind(),
            Self::Llm(LlmError::Connection(_)) => "llm_connection",
            Self::Llm(_) => "llm",
            Self::Store(_) => "storage",
            Self::Fingerprint(_) => "fingerprint",
            Self::Crypto(_) => "crypto",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
            Self::Config(_) => "config",
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
