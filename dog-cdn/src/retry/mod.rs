//! Retry and backoff for uploads.
//!
//! [`RetryingUploader`] owns the retry budget and the [`Backoff`] schedule of
//! one logical upload; store adapters decide the failure class through
//! [`StoreErrorKind`](crate::StoreErrorKind).

mod backoff;
mod run;

pub use backoff::Backoff;
pub use run::RetryingUploader;
