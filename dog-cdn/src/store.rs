use std::collections::BTreeMap;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_core::Stream;

use crate::{StoreError, StoreErrorKind};

/// Stream of bytes for object content
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Object storage operations the CDN handle depends on
#[async_trait]
pub trait CdnStore: Send + Sync {
    /// Write one object; a single attempt, no retries
    async fn put(&self, request: WriteRequest, body: ByteStream) -> Result<PutResult, StoreError>;

    /// Create the bucket/container
    async fn create_container(&self, container: &str) -> Result<(), StoreError>;

    /// Protocol and host used when no public base URL is configured
    fn endpoint(&self) -> StoreEndpoint;
}

/// Write options for a single attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    pub acl: String,
    pub container: String,
    pub remote: String,
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    /// Caller-supplied upload options, passed through verbatim
    pub options: BTreeMap<String, String>,
}

impl WriteRequest {
    pub fn new<A, C, R>(acl: A, container: C, remote: R) -> Self
    where
        A: Into<String>,
        C: Into<String>,
        R: Into<String>,
    {
        Self {
            acl: acl.into(),
            container: container.into(),
            remote: remote.into(),
            content_type: None,
            content_encoding: None,
            options: BTreeMap::new(),
        }
    }

    pub fn with_content_type<S: Into<String>>(mut self, content_type: S) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_content_encoding<S: Into<String>>(mut self, encoding: S) -> Self {
        self.content_encoding = Some(encoding.into());
        self
    }

    pub fn with_options(mut self, options: BTreeMap<String, String>) -> Self {
        self.options.extend(options);
        self
    }
}

/// Result of a successful write
#[derive(Debug, Clone, Default)]
pub struct PutResult {
    pub etag: Option<String>,
    pub size_bytes: u64,
}

/// Where the store lives, e.g. `https://` + `s3.amazonaws.com`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEndpoint {
    pub protocol: String,
    pub host: String,
}

impl StoreEndpoint {
    pub fn new<P: Into<String>, H: Into<String>>(protocol: P, host: H) -> Self {
        Self {
            protocol: protocol.into(),
            host: host.into(),
        }
    }

    /// Split `scheme://host[:port][/...]` into protocol and host
    pub fn parse(endpoint: &str) -> Option<Self> {
        let parsed = url::Url::parse(endpoint).ok()?;
        let host = parsed.host_str()?;
        let host = match parsed.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        Some(Self::new(format!("{}://", parsed.scheme()), host))
    }
}

/// Maps textual backend errors onto [`StoreErrorKind`].
///
/// Matching is a case-sensitive substring test against the container-missing
/// signature; everything else is transient.
#[derive(Debug, Clone)]
pub struct SignatureClassifier {
    container_missing: String,
}

impl SignatureClassifier {
    pub const S3_NO_SUCH_BUCKET: &'static str = "NoSuchBucket";

    pub fn new<S: Into<String>>(container_missing: S) -> Self {
        Self {
            container_missing: container_missing.into(),
        }
    }

    pub fn kind_of(&self, description: &str) -> StoreErrorKind {
        if description.contains(&self.container_missing) {
            StoreErrorKind::ContainerMissing
        } else {
            StoreErrorKind::Transient
        }
    }

    pub fn classify<S: Into<String>>(&self, description: S) -> StoreError {
        let description = description.into();
        StoreError::new(self.kind_of(&description), description)
    }
}

impl Default for SignatureClassifier {
    fn default() -> Self {
        Self::new(Self::S3_NO_SUCH_BUCKET)
    }
}
