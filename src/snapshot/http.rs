//! HTTP snapshot client.

use super::{validate_base_url, FetchError, Snapshot, SnapshotSource, SourceError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::time::Duration;

/// Path of the flat metrics snapshot, relative to the source's base URL.
pub const SNAPSHOT_PATH: &str = "/metrics/snapshot";

/// Basic-auth credentials for the polled endpoint.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Only a complete pair is sent.
    pub fn is_complete(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Transport settings shared by every source.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Upper bound for one fetch, connect through body.
    pub timeout: Duration,
    pub credentials: Option<Credentials>,
    /// PEM-encoded certificates that replace the built-in trust roots.
    pub trusted_roots: Vec<Vec<u8>>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            credentials: None,
            trusted_roots: Vec::new(),
        }
    }
}

impl ClientOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Default::default()
        }
    }

    pub fn build_client(&self) -> Result<reqwest::Client, reqwest::Error> {
        let mut builder = reqwest::Client::builder().timeout(self.timeout);
        if !self.trusted_roots.is_empty() {
            builder = builder.tls_built_in_root_certs(false);
            for pem in &self.trusted_roots {
                builder = builder.add_root_certificate(reqwest::Certificate::from_pem(pem)?);
            }
        }
        builder.build()
    }
}

/// A single URL fetched with the shared client settings.
#[derive(Debug, Clone)]
pub(crate) struct Endpoint {
    client: reqwest::Client,
    url: String,
    credentials: Option<Credentials>,
}

impl Endpoint {
    pub(crate) fn new(
        base_url: &str,
        path: &str,
        options: &ClientOptions,
    ) -> Result<Self, SourceError> {
        validate_base_url(base_url)?;
        Ok(Self {
            client: options.build_client()?,
            url: format!("{}{}", base_url.trim_end_matches('/'), path),
            credentials: options.credentials.clone().filter(Credentials::is_complete),
        })
    }

    pub(crate) fn url(&self) -> &str {
        &self.url
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(&self) -> Result<T, FetchError> {
        let mut request = self.client.get(&self.url);
        if let Some(credentials) = &self.credentials {
            request = request.basic_auth(&credentials.username, Some(&credentials.password));
        }

        let response = request
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| self.transport(e))?;
        let body = response.bytes().await.map_err(|e| self.transport(e))?;

        serde_json::from_slice(&body).map_err(|e| FetchError::Decode {
            url: self.url.clone(),
            reason: e.to_string(),
        })
    }

    fn transport(&self, err: reqwest::Error) -> FetchError {
        let reason = if err.is_timeout() {
            format!("timed out: {err}")
        } else if let Some(status) = err.status() {
            format!("unexpected status {status}")
        } else {
            err.to_string()
        };
        FetchError::Transport {
            url: self.url.clone(),
            reason,
        }
    }
}

/// Fetches `GET {base}/metrics/snapshot` and decodes it as a flat
/// object of numbers.
#[derive(Debug, Clone)]
pub struct HttpSnapshotSource {
    endpoint: Endpoint,
}

impl HttpSnapshotSource {
    pub fn new(base_url: &str, options: &ClientOptions) -> Result<Self, SourceError> {
        Ok(Self {
            endpoint: Endpoint::new(base_url, SNAPSHOT_PATH, options)?,
        })
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshotSource {
    async fn fetch(&self) -> Result<Snapshot, FetchError> {
        let values: BTreeMap<String, f64> = self.endpoint.get_json().await?;
        tracing::trace!(url = %self.endpoint.url(), keys = values.len(), "Fetched snapshot");
        Ok(Snapshot::new(values))
    }

    fn endpoint(&self) -> &str {
        self.endpoint.url()
    }
}
