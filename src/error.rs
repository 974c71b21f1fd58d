//! Error types for kvreplay
//!
//! This module defines the error taxonomy shared by the trace decoder, the
//! execution handler and the replay engine. Decode-time failures surface as
//! [`ReplayError::Corruption`] or [`ReplayError::NotSupported`]; anything the
//! target store reports travels through unchanged, either as one of the
//! status-like variants or inside the structured [`StoreError`] domain.

use thiserror::Error;

/// Result type alias for kvreplay operations
pub type Result<T> = std::result::Result<T, ReplayError>;

/// Structured store error domain
///
/// Store implementations use this for failures that have no dedicated
/// status variant (I/O trouble, injected faults, busy engines, ...).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{operation}: {detail}")]
    Operation { operation: String, detail: String },
    #[error("column family {cf_id}: {operation}: {detail}")]
    ColumnFamily {
        cf_id: u32,
        operation: String,
        detail: String,
    },
    #[error("{0}")]
    Message(String),
}

impl StoreError {
    pub fn operation(operation: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Operation {
            operation: operation.into(),
            detail: detail.into(),
        }
    }

    pub fn column_family(
        cf_id: u32,
        operation: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::ColumnFamily {
            cf_id,
            operation: operation.into(),
            detail: detail.into(),
        }
    }
}

impl From<String> for StoreError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

impl From<&str> for StoreError {
    fn from(value: &str) -> Self {
        Self::Message(value.to_string())
    }
}

/// Main error type for kvreplay
#[derive(Debug, Error)]
pub enum ReplayError {
    /// Malformed trace entry or a record referencing an unknown column family
    #[error("Corruption: {0}")]
    Corruption(String),

    /// Caller-supplied or record-supplied arguments are unusable
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Unrecognized trace version or record type
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// Key not present in the store
    #[error("Not found: {0}")]
    NotFound(String),

    /// API used out of order (e.g. `next` before `prepare`)
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Replay cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store error: {0}")]
    StoreDomain(#[from] StoreError),
}

impl ReplayError {
    // ========== Error Context Builders ==========

    /// Create a corruption error with operation context
    ///
    /// # Example
    /// ```ignore
    /// ReplayError::corruption("decode get", "key truncated")
    /// // produces: "Corruption: decode get: key truncated"
    /// ```
    pub fn corruption(operation: &str, detail: impl Into<String>) -> Self {
        ReplayError::Corruption(format!("{}: {}", operation, detail.into()))
    }

    /// Create a store error with operation context
    pub fn store(operation: &str, detail: impl Into<String>) -> Self {
        ReplayError::StoreDomain(StoreError::operation(operation, detail))
    }

    /// Create a store error scoped to a column family
    pub fn store_cf(cf_id: u32, operation: &str, detail: impl Into<String>) -> Self {
        ReplayError::StoreDomain(StoreError::column_family(cf_id, operation, detail))
    }

    /// Create a configuration error for a single setting
    pub fn config(setting: &str, reason: impl Into<String>) -> Self {
        ReplayError::Config(format!("{}: {}", setting, reason.into()))
    }

    /// Create a not-found error for a key
    pub fn not_found(key: &[u8]) -> Self {
        ReplayError::NotFound(format!("key {}", String::from_utf8_lossy(key)))
    }

    // ========== Predicates ==========

    pub fn is_not_found(&self) -> bool {
        matches!(self, ReplayError::NotFound(_))
    }

    pub fn is_corruption(&self) -> bool {
        matches!(self, ReplayError::Corruption(_))
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, ReplayError::InvalidArgument(_))
    }

    pub fn is_not_supported(&self) -> bool {
        matches!(self, ReplayError::NotSupported(_))
    }

    pub fn is_invalid_state(&self) -> bool {
        matches!(self, ReplayError::InvalidState(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ReplayError::Cancelled)
    }

    /// Whether this error ends the readable portion of a trace.
    ///
    /// Only decode-level failures are stream-fatal; execution failures are
    /// reported per record.
    pub fn is_stream_fatal(&self) -> bool {
        self.is_corruption() || self.is_not_supported()
    }
}
