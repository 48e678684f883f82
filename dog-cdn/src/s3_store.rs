use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream as AwsByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration, ObjectCannedAcl};
use aws_sdk_s3::Client;
use futures::StreamExt;
use tracing::debug;

use crate::{
    ByteStream, CdnError, CdnResult, CdnStore, PutResult, SignatureClassifier, StoreEndpoint, StoreError,
    WriteRequest,
};

const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_ENDPOINT: &str = "https://s3.amazonaws.com";
const ALREADY_OWNED: &str = "BucketAlreadyOwnedByYou";

/// Connection settings for an S3-compatible backend
#[derive(Debug, Clone)]
pub struct S3Config {
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Custom endpoint such as `http://localhost:4572`; AWS when absent
    pub endpoint_url: Option<String>,
    /// Address buckets as `endpoint/bucket` instead of `bucket.endpoint`
    pub force_path_style: bool,
}

impl S3Config {
    /// Read `AWS_REGION`, `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`,
    /// `AWS_ENDPOINT_URL` and `S3_FORCE_PATH_STYLE`
    pub fn from_env() -> CdnResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> CdnResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key).ok_or_else(|| CdnError::config(format!("{} environment variable required", key)))
        };

        Ok(Self {
            region: lookup("AWS_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
            access_key_id: required("AWS_ACCESS_KEY_ID")?,
            secret_access_key: required("AWS_SECRET_ACCESS_KEY")?,
            endpoint_url: lookup("AWS_ENDPOINT_URL").filter(|v| !v.is_empty()),
            force_path_style: lookup("S3_FORCE_PATH_STYLE")
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        })
    }

    fn endpoint(&self) -> StoreEndpoint {
        self.endpoint_url
            .as_deref()
            .and_then(StoreEndpoint::parse)
            .or_else(|| StoreEndpoint::parse(DEFAULT_ENDPOINT))
            .unwrap_or_else(|| StoreEndpoint::new("https://", "s3.amazonaws.com"))
    }
}

/// S3-compatible store using the AWS SDK
#[derive(Clone)]
pub struct S3CdnStore {
    client: Client,
    region: String,
    endpoint: StoreEndpoint,
    classifier: SignatureClassifier,
}

impl S3CdnStore {
    pub async fn new(config: S3Config) -> Self {
        let endpoint = config.endpoint();
        let region = config.region.clone();
        let client = Self::create_client(config).await;
        Self::from_client(client, region, endpoint)
    }

    pub async fn from_env() -> CdnResult<Self> {
        Ok(Self::new(S3Config::from_env()?).await)
    }

    pub fn from_client<S: Into<String>>(client: Client, region: S, endpoint: StoreEndpoint) -> Self {
        Self {
            client,
            region: region.into(),
            endpoint,
            classifier: SignatureClassifier::default(),
        }
    }

    /// Replace the container-missing signature for providers that word it differently
    pub fn with_classifier(mut self, classifier: SignatureClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    async fn create_client(config: S3Config) -> Client {
        let credentials = Credentials::new(
            config.access_key_id,
            config.secret_access_key,
            None,
            None,
            "dog-cdn",
        );

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region))
            .credentials_provider(credentials);
        if let Some(endpoint_url) = config.endpoint_url {
            loader = loader.endpoint_url(endpoint_url);
        }
        let aws_config = loader.load().await;

        Client::from_conf(
            aws_sdk_s3::config::Builder::from(&aws_config)
                .force_path_style(config.force_path_style)
                .build(),
        )
    }

    async fn collect_stream(mut stream: ByteStream) -> Result<Vec<u8>, StoreError> {
        let mut data = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| StoreError::transient(format!("reading upload body: {}", e)).with_source(e))?;
            data.extend_from_slice(&chunk);
        }
        Ok(data)
    }

    fn map_sdk_error<E, R>(&self, err: SdkError<E, R>) -> StoreError
    where
        E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
        R: std::fmt::Debug + Send + Sync + 'static,
    {
        let description = match err.code() {
            Some(code) => format!("{}: {}", code, err.message().unwrap_or("")),
            None => DisplayErrorContext(&err).to_string(),
        };
        self.classifier.classify(description).with_source(err)
    }

    /// Known passthrough keys map onto request fields, the rest become metadata
    fn apply_options(
        mut put: aws_sdk_s3::operation::put_object::builders::PutObjectFluentBuilder,
        request: &WriteRequest,
    ) -> aws_sdk_s3::operation::put_object::builders::PutObjectFluentBuilder {
        for (key, value) in &request.options {
            put = match key.as_str() {
                "cacheControl" => put.cache_control(value),
                "contentDisposition" => put.content_disposition(value),
                "contentLanguage" => put.content_language(value),
                _ => put.metadata(key, value),
            };
        }
        put
    }
}

#[async_trait]
impl CdnStore for S3CdnStore {
    async fn put(&self, request: WriteRequest, body: ByteStream) -> Result<PutResult, StoreError> {
        let data = Self::collect_stream(body).await?;
        let size_bytes = data.len() as u64;

        let mut put = self
            .client
            .put_object()
            .bucket(&request.container)
            .key(&request.remote)
            .acl(ObjectCannedAcl::from(request.acl.as_str()))
            .body(AwsByteStream::from(data));
        if let Some(content_type) = &request.content_type {
            put = put.content_type(content_type);
        }
        if let Some(encoding) = &request.content_encoding {
            put = put.content_encoding(encoding);
        }
        put = Self::apply_options(put, &request);

        let output = put.send().await.map_err(|e| self.map_sdk_error(e))?;

        Ok(PutResult {
            etag: output.e_tag().map(str::to_string),
            size_bytes,
        })
    }

    async fn create_container(&self, container: &str) -> Result<(), StoreError> {
        let mut create = self.client.create_bucket().bucket(container);
        if self.region != DEFAULT_REGION {
            create = create.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        match create.send().await {
            Ok(_) => Ok(()),
            Err(err) if err.code() == Some(ALREADY_OWNED) => {
                debug!(bucket = container, "bucket already owned by us");
                Ok(())
            }
            Err(err) => Err(self.map_sdk_error(err)),
        }
    }

    fn endpoint(&self) -> StoreEndpoint {
        self.endpoint.clone()
    }
}
