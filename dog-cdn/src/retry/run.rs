use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::Backoff;
use crate::{CdnError, CdnResult, ContainerInit, RetryConfig, StoreError, StoreErrorKind};

/// Drives one logical upload to a single terminal outcome.
///
/// Attempts are strictly sequential. A `ContainerMissing` failure provisions
/// the container and retries without touching the budget; a transient failure
/// consumes one retry and waits for the next backoff delay; a fatal failure
/// ends the run at once.
///
/// An init that keeps reporting success while the store keeps reporting the
/// container as missing loops until cancelled.
pub struct RetryingUploader<'a> {
    retries: u32,
    attempts: u32,
    backoff: Backoff,
    immediate: bool,
    init: &'a dyn ContainerInit,
    cancel: CancellationToken,
}

impl<'a> RetryingUploader<'a> {
    pub fn new(config: &RetryConfig, init: &'a dyn ContainerInit) -> Self {
        Self {
            retries: config.retries,
            attempts: 0,
            backoff: Backoff::from_config(config),
            immediate: config.immediate,
            init,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Retries left in the budget
    pub fn remaining(&self) -> u32 {
        self.retries
    }

    /// Number of times the action has been invoked
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub async fn run<F, Fut, T>(&mut self, mut action: F) -> CdnResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut last: Option<StoreError> = None;

        loop {
            if self.retries == 0 {
                return Err(CdnError::RetriesExhausted {
                    attempts: self.attempts,
                    last,
                });
            }

            self.attempts += 1;
            debug!(attempt = self.attempts, remaining = self.retries, "starting upload attempt");

            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(CdnError::Cancelled),
                outcome = action() => outcome,
            };

            let err = match outcome {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            match err.kind() {
                StoreErrorKind::ContainerMissing => {
                    debug!(error = %err, "container missing, provisioning before retry");
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return Err(CdnError::Cancelled),
                        init = self.init.init() => init?,
                    }
                }
                StoreErrorKind::Fatal => return Err(CdnError::Store(err)),
                StoreErrorKind::Transient => {
                    self.retries -= 1;
                    if self.retries == 0 {
                        warn!(attempts = self.attempts, error = %err, "upload failed, no retries left");
                        return Err(CdnError::RetriesExhausted {
                            attempts: self.attempts,
                            last: Some(err),
                        });
                    }

                    let delay = self.next_delay();
                    warn!(
                        error = %err,
                        remaining = self.retries,
                        delay_ms = delay.as_millis() as u64,
                        "upload attempt failed, retrying"
                    );
                    last = Some(err);
                    self.sleep(delay).await?;
                }
            }
        }
    }

    fn next_delay(&mut self) -> Duration {
        if self.immediate {
            Duration::ZERO
        } else {
            self.backoff.next_delay()
        }
    }

    async fn sleep(&self, delay: Duration) -> CdnResult<()> {
        if delay.is_zero() {
            return if self.cancel.is_cancelled() {
                Err(CdnError::Cancelled)
            } else {
                Ok(())
            };
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(CdnError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}
