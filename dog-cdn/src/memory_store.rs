use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use parking_lot::RwLock;

use crate::{ByteStream, CdnStore, PutResult, StoreEndpoint, StoreError, WriteRequest};

/// An object held by [`MemoryCdnStore`]
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Bytes,
    pub request: WriteRequest,
}

#[derive(Debug, Default)]
struct State {
    containers: HashMap<String, HashMap<String, StoredObject>>,
    faults: VecDeque<StoreError>,
}

/// In-process store.
///
/// Writing into a container that was never created fails with
/// `ContainerMissing`, like a real bucket store. Faults queued with
/// [`fail_next`](Self::fail_next) are returned by the next writes in order.
#[derive(Debug, Clone)]
pub struct MemoryCdnStore {
    state: Arc<RwLock<State>>,
    endpoint: StoreEndpoint,
    init_latency: Duration,
    puts: Arc<AtomicU64>,
    creates: Arc<AtomicU64>,
}

impl MemoryCdnStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(State::default())),
            endpoint: StoreEndpoint::new("http://", "localhost:4572"),
            init_latency: Duration::ZERO,
            puts: Arc::new(AtomicU64::new(0)),
            creates: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_endpoint(mut self, endpoint: StoreEndpoint) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// Delay every `create_container` call
    pub fn with_init_latency(mut self, latency: Duration) -> Self {
        self.init_latency = latency;
        self
    }

    /// Create a container up front
    pub fn with_container<S: Into<String>>(self, container: S) -> Self {
        self.state.write().containers.entry(container.into()).or_default();
        self
    }

    /// Queue a failure for the next write
    pub fn fail_next(&self, error: StoreError) {
        self.state.write().faults.push_back(error);
    }

    pub fn put_calls(&self) -> u64 {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> u64 {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn has_container(&self, container: &str) -> bool {
        self.state.read().containers.contains_key(container)
    }

    pub fn object(&self, container: &str, remote: &str) -> Option<StoredObject> {
        self.state
            .read()
            .containers
            .get(container)
            .and_then(|objects| objects.get(remote))
            .cloned()
    }

    /// Keys stored in a container, sorted
    pub fn keys(&self, container: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .state
            .read()
            .containers
            .get(container)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }
}

impl Default for MemoryCdnStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CdnStore for MemoryCdnStore {
    async fn put(&self, request: WriteRequest, mut body: ByteStream) -> Result<PutResult, StoreError> {
        self.puts.fetch_add(1, Ordering::SeqCst);

        let fault = self.state.write().faults.pop_front();
        if let Some(fault) = fault {
            return Err(fault);
        }
        if !self.has_container(&request.container) {
            return Err(StoreError::container_missing(format!(
                "NoSuchBucket: The specified bucket does not exist: {}",
                request.container
            )));
        }

        let mut data = Vec::new();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| StoreError::transient(format!("read failed: {}", e)).with_source(e))?;
            data.extend_from_slice(&chunk);
        }

        let size_bytes = data.len() as u64;
        let mut state = self.state.write();
        let objects = state
            .containers
            .get_mut(&request.container)
            .ok_or_else(|| StoreError::container_missing(format!("NoSuchBucket: {}", request.container)))?;
        objects.insert(
            request.remote.clone(),
            StoredObject {
                data: Bytes::from(data),
                request,
            },
        );

        Ok(PutResult {
            etag: None,
            size_bytes,
        })
    }

    async fn create_container(&self, container: &str) -> Result<(), StoreError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if !self.init_latency.is_zero() {
            tokio::time::sleep(self.init_latency).await;
        }
        self.state.write().containers.entry(container.to_string()).or_default();
        Ok(())
    }

    fn endpoint(&self) -> StoreEndpoint {
        self.endpoint.clone()
    }
}
