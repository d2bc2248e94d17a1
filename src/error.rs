use thiserror::Error;

use crate::orderflow::types::WindowLabel;

/// Top-level error type for the order flow engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Initialization error: {0}")]
    Initialization(String),
}

/// Errors raised at the quote/analytics store boundary
#[derive(Error, Debug)]
pub enum StoreError {
    /// Store could not be reached or refused the request
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Backend rejected an operation
    #[error("Backend error: {0}")]
    Backend(String),

    /// A value could not be encoded for writing
    #[error("Codec error: {0}")]
    Codec(String),

    /// The blocking task running a backend call failed to join
    #[error("Storage task failed: {0}")]
    Task(String),
}

impl StoreError {
    /// Transient errors skip one ticker's cycle; the next tick retries
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Task(_))
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            StoreError::Unavailable(_) => "unavailable",
            StoreError::Backend(_) => "backend",
            StoreError::Codec(_) => "codec",
            StoreError::Task(_) => "task",
        }
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        StoreError::Task(err.to_string())
    }
}

#[cfg(feature = "rocksdb_store")]
impl From<rocksdb::Error> for StoreError {
    fn from(err: rocksdb::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

#[cfg(feature = "rocksdb_store")]
impl From<rmp_serde::encode::Error> for StoreError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        StoreError::Codec(err.to_string())
    }
}

/// Failure of a single ticker cycle
///
/// A cycle never propagates past its own ticker; the supervisor logs it and
/// moves on to the next tick.
#[derive(Error, Debug)]
pub enum CycleError {
    #[error("Failed to retrieve {window} quotes: {source}")]
    Retrieval {
        window: WindowLabel,
        #[source]
        source: StoreError,
    },
}

impl CycleError {
    pub fn is_transient(&self) -> bool {
        match self {
            CycleError::Retrieval { source, .. } => source.is_transient(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
