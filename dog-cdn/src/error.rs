use std::sync::Arc;
use thiserror::Error;

/// Result type for CDN operations
pub type CdnResult<T> = Result<T, CdnError>;

/// Closed set of failure classes a store adapter reports to the retry core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// The destination bucket/container does not exist yet
    ContainerMissing,
    /// Anything that may go away on its own; consumes one retry
    Transient,
    /// Retrying cannot help, e.g. an unreadable source
    Fatal,
}

/// Error reported by a store adapter for a single operation
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct StoreError {
    kind: StoreErrorKind,
    message: String,
    #[source]
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl StoreError {
    pub fn new<S: Into<String>>(kind: StoreErrorKind, message: S) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn container_missing<S: Into<String>>(message: S) -> Self {
        Self::new(StoreErrorKind::ContainerMissing, message)
    }

    pub fn transient<S: Into<String>>(message: S) -> Self {
        Self::new(StoreErrorKind::Transient, message)
    }

    pub fn fatal<S: Into<String>>(message: S) -> Self {
        Self::new(StoreErrorKind::Fatal, message)
    }

    /// Attach the backend-native error this one was mapped from
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Arc::new(source));
        self
    }

    pub fn kind(&self) -> StoreErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_container_missing(&self) -> bool {
        self.kind == StoreErrorKind::ContainerMissing
    }
}

/// Errors surfaced to callers of the CDN handle
#[derive(Error, Debug)]
pub enum CdnError {
    #[error("Max retries exhausted after {attempts} attempts")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Option<StoreError>,
    },

    #[error("Failed to initialize container {bucket}: {source}")]
    Init {
        bucket: String,
        #[source]
        source: StoreError,
    },

    #[error("Storage backend error: {0}")]
    Store(#[from] StoreError),

    #[error("Upload cancelled")]
    Cancelled,

    #[error("Invalid URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Invalid configuration: {message}")]
    Config { message: String },

    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },
}

impl CdnError {
    /// Create an invalid configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn invalid_url<S: Into<String>>(url: S, source: url::ParseError) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            source,
        }
    }
}
