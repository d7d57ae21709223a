//! Error types for Fieldwake core library.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using Fieldwake Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for Fieldwake operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Request payload failed validation
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Waiter table is full
    #[error(transparent)]
    Rendezvous(#[from] RendezvousError),

    /// Durable write failed
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Reasons a device key is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceKeyError {
    #[error("device key is empty")]
    Empty,

    #[error("device key is {len} characters long, max is {max}")]
    TooLong { len: usize, max: usize },

    #[error("device key contains invalid character {0:?}")]
    InvalidChar(char),
}

/// Client-side input problems. Always surfaced as a 400.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid device_key: {0}")]
    InvalidDeviceKey(#[from] DeviceKeyError),

    #[error("malformed request body: {0}")]
    MalformedBody(String),

    #[error("malformed query string: {0}")]
    MalformedQuery(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RendezvousError {
    #[error("waiter table is full ({capacity} pending), retry later")]
    CapacityExceeded { capacity: usize },
}

/// The event log could not be made durable.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize event log: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("event log task failed: {0}")]
    Task(String),
}

impl PersistenceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
