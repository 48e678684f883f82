use std::future::Future;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::{CdnResult, StoreError};

/// Capability to provision the destination container
#[async_trait]
pub trait ContainerInit: Send + Sync {
    async fn init(&self) -> CdnResult<()>;
}

type InitOutcome = Result<(), StoreError>;

/// Single-flight slot for container creation.
///
/// The first caller runs the creation future; callers arriving while it is in
/// flight wait for the same outcome. The slot is emptied once the outcome is
/// known, so a later call starts a fresh creation.
#[derive(Debug, Default)]
pub struct ContainerInitGuard {
    waiters: Mutex<Option<Vec<oneshot::Sender<InitOutcome>>>>,
}

enum Role {
    Leader,
    Follower(oneshot::Receiver<InitOutcome>),
}

/// Empties the slot when the leader finishes or is dropped mid-flight
struct Flight<'a> {
    guard: &'a ContainerInitGuard,
    done: bool,
}

impl Flight<'_> {
    fn resolve(mut self, outcome: &InitOutcome) {
        self.done = true;
        let waiters = self.guard.waiters.lock().take().unwrap_or_default();
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        if !self.done {
            // Dropping the senders wakes every follower with a RecvError.
            self.guard.waiters.lock().take();
        }
    }
}

impl ContainerInitGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a creation call is in flight
    pub fn in_flight(&self) -> bool {
        self.waiters.lock().is_some()
    }

    pub async fn run<F, Fut>(&self, create: F) -> InitOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = InitOutcome>,
    {
        let role = {
            let mut slot = self.waiters.lock();
            match slot.as_mut() {
                Some(waiters) => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    Role::Follower(rx)
                }
                None => {
                    *slot = Some(Vec::new());
                    Role::Leader
                }
            }
        };

        match role {
            Role::Leader => {
                let flight = Flight {
                    guard: self,
                    done: false,
                };
                let outcome = create().await;
                flight.resolve(&outcome);
                outcome
            }
            Role::Follower(rx) => rx.await.unwrap_or_else(|_| {
                Err(StoreError::transient("container initialization abandoned"))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_callers_share_one_creation() {
        let guard = Arc::new(ContainerInitGuard::new());
        let calls = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let guard = guard.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                guard
                    .run(|| async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok(())
                    })
                    .await
            }));
        }

        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!guard.in_flight());
    }

    #[tokio::test]
    async fn test_followers_observe_leader_failure() {
        let guard = ContainerInitGuard::new();

        let leader = guard.run(|| async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Err(StoreError::transient("AccessDenied"))
        });
        let follower = guard.run(|| async { Ok(()) });

        let (a, b) = tokio::join!(leader, follower);
        assert_eq!(a.unwrap_err().message(), "AccessDenied");
        assert_eq!(b.unwrap_err().message(), "AccessDenied");
    }

    #[tokio::test]
    async fn test_slot_resets_after_resolution() {
        let guard = ContainerInitGuard::new();
        let calls = AtomicU32::new(0);

        let first = guard
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(StoreError::transient("throttled"))
            })
            .await;
        let second = guard
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert!(first.is_err());
        assert!(second.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_dropped_leader_releases_followers() {
        let guard = ContainerInitGuard::new();

        let leader = guard.run(|| std::future::pending::<InitOutcome>());
        let follower = guard.run(|| async { Ok(()) });
        tokio::pin!(follower);

        tokio::select! {
            biased;
            _ = leader => unreachable!("pending creation cannot finish"),
            _ = &mut follower => unreachable!("follower waits on the leader"),
            _ = tokio::time::sleep(Duration::from_millis(20)) => {}
        }

        assert!(!guard.in_flight());
        let outcome = follower.await;
        assert_eq!(outcome.unwrap_err().message(), "container initialization abandoned");
    }
}
