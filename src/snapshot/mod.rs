//! Metric snapshots and the sources that produce them.
//!
//! A [`SnapshotSource`] performs exactly one fetch per call and returns a
//! flat key to value [`Snapshot`]. Retries are left to the scrape cadence.

mod consul;
mod http;
mod mock;

pub use consul::{ConsulCatalogSource, CATALOG_SERVICES_NUM, CATALOG_SERVICES_PATH};
pub use http::{ClientOptions, Credentials, HttpSnapshotSource, SNAPSHOT_PATH};
pub use mock::MockSource;

use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

/// Pass-fatal failures of a snapshot fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport error fetching {url}: {reason}")]
    Transport { url: String, reason: String },

    #[error("failed to decode snapshot from {url}: {reason}")]
    Decode { url: String, reason: String },
}

/// Startup-time failures constructing a source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("invalid source URL {0:?}: expected http(s)://host[:port]")]
    InvalidUrl(String),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Checks that `url` is an absolute http(s) URL with a host.
pub fn validate_base_url(url: &str) -> Result<reqwest::Url, SourceError> {
    let parsed = reqwest::Url::parse(url).map_err(|_| SourceError::InvalidUrl(url.to_string()))?;
    let has_host = parsed.host_str().is_some_and(|h| !h.is_empty());
    if !has_host || !matches!(parsed.scheme(), "http" | "https") {
        return Err(SourceError::InvalidUrl(url.to_string()));
    }
    Ok(parsed)
}

/// A key an extraction rule needs is absent from the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("couldn't find key {key} in snapshot")]
pub struct MissingField {
    pub key: String,
}

/// One immutable key to value sample taken from a polled source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    values: BTreeMap<String, f64>,
}

impl Snapshot {
    pub fn new(values: BTreeMap<String, f64>) -> Self {
        Self { values }
    }

    /// Looks up a required key.
    pub fn get(&self, key: &str) -> Result<f64, MissingField> {
        self.values.get(key).copied().ok_or_else(|| MissingField {
            key: key.to_string(),
        })
    }

    /// Looks up an optional key.
    pub fn lookup(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }

    /// Iterates the entries whose key starts with `prefix`, in key order.
    pub fn with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (&'a str, f64)> + 'a {
        self.values
            .range(prefix.to_string()..)
            .take_while(move |(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Produces one snapshot per call.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Performs a single fetch. Never retries.
    async fn fetch(&self) -> Result<Snapshot, FetchError>;

    /// Where the snapshot comes from, for logs.
    fn endpoint(&self) -> &str;
}
