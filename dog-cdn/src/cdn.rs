use std::sync::Arc;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};
use url::Url;

use crate::{
    CdnConfig, CdnError, CdnResult, CdnStore, ContainerInit, ContainerInitGuard, ContentClassifier,
    ContentDecision, RetryingUploader, UploadSource, WriteRequest,
};

/// Handle for uploading files to one bucket and building their public URLs.
///
/// Cloning is cheap; clones share the store and the container-init guard.
#[derive(Clone)]
pub struct Cdn {
    store: Arc<dyn CdnStore>,
    config: Arc<CdnConfig>,
    classifier: Arc<ContentClassifier>,
    init_guard: Arc<ContainerInitGuard>,
}

impl Cdn {
    pub fn new<S: CdnStore + 'static>(store: S, config: CdnConfig) -> CdnResult<Self> {
        Self::from_arc(Arc::new(store), config)
    }

    pub fn from_arc(store: Arc<dyn CdnStore>, config: CdnConfig) -> CdnResult<Self> {
        config.validate()?;
        Ok(Self {
            store,
            classifier: Arc::new(ContentClassifier::with_overrides(config.mime.clone())),
            config: Arc::new(config),
            init_guard: Arc::new(ContainerInitGuard::new()),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.config.bucket
    }

    pub fn acl(&self) -> &str {
        &self.config.acl
    }

    pub fn config(&self) -> &CdnConfig {
        &self.config
    }

    /// Content type/encoding the object `name` is written with
    pub fn content_for(&self, name: &str) -> ContentDecision {
        self.classifier.classify(name)
    }

    /// Create the bucket. Concurrent callers share a single creation call.
    pub async fn init(&self) -> CdnResult<()> {
        let bucket = self.config.bucket.clone();
        let store = self.store.clone();

        self.init_guard
            .run(|| async move {
                info!(bucket = %bucket, "initializing container");
                store.create_container(&bucket).await
            })
            .await
            .map_err(|source| CdnError::Init {
                bucket: self.config.bucket.clone(),
                source,
            })
    }

    /// Upload `source` as `name` and return its public URL
    pub async fn upload(&self, source: UploadSource, name: &str) -> CdnResult<String> {
        self.upload_with_cancel(source, name, CancellationToken::new()).await
    }

    #[instrument(skip(self, source, cancel), fields(bucket = %self.config.bucket))]
    pub async fn upload_with_cancel(
        &self,
        source: UploadSource,
        name: &str,
        cancel: CancellationToken,
    ) -> CdnResult<String> {
        let request = self.write_request(name);
        let mut uploader = RetryingUploader::new(&self.config.retry, self).with_cancellation(cancel);

        uploader
            .run(|| {
                let request = request.clone();
                let source = &source;
                let store = &self.store;
                async move {
                    debug!(remote = %request.remote, "attempting to write file to cdn");
                    let body = source.open().await?;
                    store.put(request, body).await
                }
            })
            .await?;

        self.object_url(name)
    }

    /// Public URL of an object key
    pub fn object_url(&self, name: &str) -> CdnResult<String> {
        let root = self.url()?;
        let base = Url::parse(&root).map_err(|e| CdnError::invalid_url(root.clone(), e))?;
        let joined = base.join(name).map_err(|e| CdnError::invalid_url(name, e))?;
        Ok(joined.to_string())
    }

    /// Base URL objects are served from; always ends with `/`.
    ///
    /// With sharding a random configured URL is chosen on every call. Without
    /// configured URLs the store endpoint is used, prefixed with the bucket
    /// when `subdomain` is set.
    pub fn url(&self) -> CdnResult<String> {
        let configured = if self.config.sharding {
            self.config.urls.choose(&mut rand::thread_rng())
        } else {
            self.config.urls.first()
        };

        let prefix = match configured {
            Some(url) => url.clone(),
            None => {
                let endpoint = self.store.endpoint();
                let subdomain = if self.config.subdomain {
                    format!("{}.", self.config.bucket)
                } else {
                    String::new()
                };
                format!("{}{}{}", endpoint.protocol, subdomain, endpoint.host)
            }
        };

        let mut root = if self.config.subdomain {
            prefix
        } else {
            let base = Url::parse(&prefix).map_err(|e| CdnError::invalid_url(prefix.clone(), e))?;
            base.join(&self.config.bucket)
                .map_err(|e| CdnError::invalid_url(self.config.bucket.clone(), e))?
                .to_string()
        };

        if !root.ends_with('/') {
            root.push('/');
        }
        Ok(root)
    }

    /// Rewrite `file` onto the configured check URL, keeping its path
    pub fn check_url(&self, file: &str) -> CdnResult<String> {
        let Some(check) = &self.config.check else {
            return Ok(file.to_string());
        };

        let parsed = Url::parse(file).map_err(|e| CdnError::invalid_url(file, e))?;
        let check = check.strip_suffix('/').unwrap_or(check);
        Ok(format!("{}{}", check, parsed.path()))
    }

    fn write_request(&self, name: &str) -> WriteRequest {
        let content = self.classifier.classify(name);
        let mut request = WriteRequest::new(&self.config.acl, &self.config.bucket, name)
            .with_content_type(content.content_type)
            .with_options(self.config.upload_opts.clone());
        if let Some(encoding) = content.encoding {
            request = request.with_content_encoding(encoding);
        }
        request
    }
}

#[async_trait]
impl ContainerInit for Cdn {
    async fn init(&self) -> CdnResult<()> {
        Cdn::init(self).await
    }
}

impl std::fmt::Debug for Cdn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cdn")
            .field("bucket", &self.config.bucket)
            .field("urls", &self.config.urls)
            .field("subdomain", &self.config.subdomain)
            .finish()
    }
}
