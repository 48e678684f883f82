//! # dog-cdn: upload files to object storage and get their public URLs
//!
//! `dog-cdn` writes files into a bucket of an S3-compatible store and hands
//! back the URL the object is served from. Uploads are retried with
//! exponential backoff, and a missing bucket is created on first use.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dog_cdn::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() -> CdnResult<()> {
//! let store = dog_cdn::S3CdnStore::from_env().await?;
//! let config = CdnConfig::new("my-assets")
//!     .with_url("https://cdn.example.com/")
//!     .with_upload_opt("cacheControl", "max-age=31536000");
//!
//! let cdn = Cdn::new(store, config)?;
//! let url = cdn.upload(UploadSource::path("dist/app.js.gz"), "v1/app.js.gz").await?;
//! println!("uploaded to {}", url);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │         Cdn         │  ← URLs, content detection, bucket init
//! ├─────────────────────┤
//! │  RetryingUploader   │  ← retry budget, backoff, cancellation
//! ├─────────────────────┤
//! │      CdnStore       │  ← S3, memory, custom backends
//! └─────────────────────┘
//! ```
//!
//! Store adapters report failures as a [`StoreErrorKind`]: `ContainerMissing`
//! provisions the bucket and retries for free, `Transient` spends one retry,
//! `Fatal` stops immediately.

mod cdn;
mod config;
mod content;
mod error;
mod init;
mod memory_store;
pub mod retry;
mod s3_store;
mod source;
pub mod store;

// Re-export main types for clean API
pub use cdn::Cdn;
pub use config::{CdnConfig, RetryConfig};
pub use content::{ContentClassifier, ContentDecision};
pub use error::{CdnError, CdnResult, StoreError, StoreErrorKind};
pub use init::{ContainerInit, ContainerInitGuard};
pub use memory_store::{MemoryCdnStore, StoredObject};
pub use retry::{Backoff, RetryingUploader};
pub use s3_store::{S3CdnStore, S3Config};
pub use source::UploadSource;
pub use store::{ByteStream, CdnStore, PutResult, SignatureClassifier, StoreEndpoint, WriteRequest};

pub use tokio_util::sync::CancellationToken;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        Cdn, CdnConfig, CdnError, CdnResult, CdnStore, RetryConfig, StoreError, StoreErrorKind,
        UploadSource,
    };
}
