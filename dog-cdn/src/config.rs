use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use serde::Deserialize;

use crate::{CdnError, CdnResult};

/// Configuration for a CDN handle
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CdnConfig {
    /// Bucket/container the objects are written to
    pub bucket: String,

    /// Public base URL(s) the returned object URLs are built on
    pub urls: Vec<String>,

    /// Pick a random entry of `urls` for every URL (DNS sharding)
    pub sharding: bool,

    /// Address the bucket as a subdomain (`bucket.endpoint`) instead of a path
    pub subdomain: bool,

    /// Base URL used by `check_url` when the public URL is unreachable locally
    pub check: Option<String>,

    /// Access control applied to every object
    pub acl: String,

    /// Extension (with leading dot) to content type overrides
    pub mime: HashMap<String, String>,

    /// Extra options merged verbatim into every write
    pub upload_opts: BTreeMap<String, String>,

    pub retry: RetryConfig,
}

impl Default for CdnConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            urls: Vec::new(),
            sharding: false,
            subdomain: false,
            check: None,
            acl: "public-read".to_string(),
            mime: HashMap::new(),
            upload_opts: BTreeMap::new(),
            retry: RetryConfig::default(),
        }
    }
}

/// Retry budget and backoff schedule for one upload
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryConfig {
    /// Transient failures tolerated before giving up
    pub retries: u32,

    #[serde(with = "humantime_serde")]
    pub min_delay: Duration,

    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,

    pub factor: f64,

    /// Share of each delay randomly added or removed (0.0..=1.0)
    pub jitter: f64,

    /// Retry without waiting
    pub immediate: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retries: 5,
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(20_000),
            factor: 2.0,
            jitter: 0.0,
            immediate: false,
        }
    }
}

impl CdnConfig {
    /// Create a new config for a bucket with defaults
    pub fn new<S: Into<String>>(bucket: S) -> Self {
        Self {
            bucket: bucket.into(),
            ..Self::default()
        }
    }

    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json_str(json: &str) -> CdnResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `{prefix}__BUCKET`, `{prefix}__URLS` (comma separated),
    /// `{prefix}__SHARDING`, `{prefix}__SUBDOMAIN`, `{prefix}__CHECK`,
    /// `{prefix}__ACL` and `{prefix}__RETRIES`.
    pub fn from_env(prefix: &str) -> CdnResult<Self> {
        Self::from_vars(prefix, std::env::vars())
    }

    pub(crate) fn from_vars<I>(prefix: &str, vars: I) -> CdnResult<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut config = Self::default();
        let head = format!("{}__", prefix);

        for (key, value) in vars {
            let Some(field) = key.strip_prefix(&head) else {
                continue;
            };
            match field {
                "BUCKET" => config.bucket = value,
                "URLS" | "URL" => {
                    config.urls = value
                        .split(',')
                        .map(str::trim)
                        .filter(|u| !u.is_empty())
                        .map(String::from)
                        .collect();
                }
                "SHARDING" => config.sharding = parse_flag(&key, &value)?,
                "SUBDOMAIN" => config.subdomain = parse_flag(&key, &value)?,
                "CHECK" => config.check = Some(value).filter(|v| !v.is_empty()),
                "ACL" => config.acl = value,
                "RETRIES" => {
                    config.retry.retries = value
                        .parse()
                        .map_err(|_| CdnError::config(format!("{} must be a number, got {:?}", key, value)))?;
                }
                _ => {}
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CdnResult<()> {
        if self.bucket.is_empty() {
            return Err(CdnError::config("bucket is required"));
        }
        if self.retry.min_delay > self.retry.max_delay {
            return Err(CdnError::config("retry.minDelay must not exceed retry.maxDelay"));
        }
        Ok(())
    }

    /// Add a public base URL
    pub fn with_url<S: Into<String>>(mut self, url: S) -> Self {
        self.urls.push(url.into());
        self
    }

    /// Spread URLs over all configured base URLs
    pub fn with_sharding(mut self) -> Self {
        self.sharding = true;
        self
    }

    /// Address the bucket as a subdomain of the endpoint
    pub fn with_subdomain(mut self) -> Self {
        self.subdomain = true;
        self
    }

    pub fn with_check<S: Into<String>>(mut self, check: S) -> Self {
        self.check = Some(check.into());
        self
    }

    pub fn with_acl<S: Into<String>>(mut self, acl: S) -> Self {
        self.acl = acl.into();
        self
    }

    /// Override the content type for an extension such as `".svg"`
    pub fn with_mime<E: Into<String>, T: Into<String>>(mut self, ext: E, content_type: T) -> Self {
        self.mime.insert(ext.into(), content_type.into());
        self
    }

    pub fn with_upload_opt<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.upload_opts.insert(key.into(), value.into());
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero-delay retries, for tests and local stores
    pub fn immediate() -> Self {
        Self {
            immediate: true,
            ..Self::default()
        }
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_delays(mut self, min: Duration, max: Duration) -> Self {
        self.min_delay = min;
        self.max_delay = max;
        self
    }

    pub fn with_factor(mut self, factor: f64) -> Self {
        self.factor = factor;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }
}

fn parse_flag(key: &str, value: &str) -> CdnResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(CdnError::config(format!("{} must be a boolean, got {:?}", key, value))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = CdnConfig::new("assets");

        assert_eq!(config.acl, "public-read");
        assert_eq!(config.retry.retries, 5);
        assert_eq!(config.retry.min_delay, Duration::from_millis(100));
        assert_eq!(config.retry.max_delay, Duration::from_secs(20));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json() {
        let config = CdnConfig::from_json_str(
            r#"{
                "bucket": "test-cdnup",
                "urls": ["https://a.cdn.test", "https://b.cdn.test"],
                "sharding": true,
                "check": "http://localhost:4572/test-cdnup/",
                "mime": { ".svgs": "text/plain" },
                "uploadOpts": { "cacheControl": "max-age=10" },
                "retry": { "retries": 2, "minDelay": "10ms", "maxDelay": "1s" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.bucket, "test-cdnup");
        assert_eq!(config.urls.len(), 2);
        assert!(config.sharding);
        assert_eq!(config.acl, "public-read");
        assert_eq!(config.upload_opts.get("cacheControl").map(String::as_str), Some("max-age=10"));
        assert_eq!(config.retry.retries, 2);
        assert_eq!(config.retry.min_delay, Duration::from_millis(10));
        assert_eq!(config.retry.factor, 2.0);
    }

    #[test]
    fn test_from_vars() {
        let config = CdnConfig::from_vars(
            "CDNUP",
            vars(&[
                ("CDNUP__BUCKET", "assets"),
                ("CDNUP__URLS", "https://a.cdn.test, https://b.cdn.test"),
                ("CDNUP__SUBDOMAIN", "true"),
                ("CDNUP__RETRIES", "3"),
                ("OTHER__BUCKET", "ignored"),
            ]),
        )
        .unwrap();

        assert_eq!(config.bucket, "assets");
        assert_eq!(config.urls, vec!["https://a.cdn.test", "https://b.cdn.test"]);
        assert!(config.subdomain);
        assert!(!config.sharding);
        assert_eq!(config.retry.retries, 3);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(CdnConfig::from_vars("CDNUP", vars(&[])).is_err());
        assert!(CdnConfig::from_vars(
            "CDNUP",
            vars(&[("CDNUP__BUCKET", "a"), ("CDNUP__SHARDING", "maybe")])
        )
        .is_err());
        assert!(CdnConfig::from_json_str(r#"{ "bucket": "a", "retry": { "minDelay": "5s", "maxDelay": "1s" } }"#).is_err());
    }
}
