//! Service-discovery catalog source.
//!
//! Consul has no flat snapshot endpoint, so this source derives a
//! one-entry snapshot from the catalog's service listing.

use super::http::{ClientOptions, Endpoint};
use super::{FetchError, Snapshot, SnapshotSource, SourceError};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Catalog endpoint listing every registered service with its tags.
pub const CATALOG_SERVICES_PATH: &str = "/v1/catalog/services";

/// Snapshot key holding the number of registered services.
pub const CATALOG_SERVICES_NUM: &str = "catalog_services_num";

#[derive(Debug, Clone)]
pub struct ConsulCatalogSource {
    endpoint: Endpoint,
}

impl ConsulCatalogSource {
    pub fn new(base_url: &str, options: &ClientOptions) -> Result<Self, SourceError> {
        Ok(Self {
            endpoint: Endpoint::new(base_url, CATALOG_SERVICES_PATH, options)?,
        })
    }
}

#[async_trait]
impl SnapshotSource for ConsulCatalogSource {
    async fn fetch(&self) -> Result<Snapshot, FetchError> {
        let services: BTreeMap<String, serde_json::Value> = self.endpoint.get_json().await?;
        tracing::trace!(url = %self.endpoint.url(), services = services.len(), "Fetched catalog");
        Ok([(CATALOG_SERVICES_NUM, services.len() as f64)]
            .into_iter()
            .collect())
    }

    fn endpoint(&self) -> &str {
        self.endpoint.url()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use axum::Router;

    #[test]
    fn test_rejects_url_without_scheme() {
        let err = ConsulCatalogSource::new("consul.local:8500", &ClientOptions::default());
        assert!(matches!(err, Err(SourceError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_counts_catalog_services() {
        let app = Router::new().route(
            CATALOG_SERVICES_PATH,
            get(|| async { r#"{"consul": [], "web": ["v1", "canary"], "db": []}"# }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let source =
            ConsulCatalogSource::new(&format!("http://{addr}"), &ClientOptions::default()).unwrap();
        let snapshot = source.fetch().await.unwrap();
        assert_eq!(snapshot.get(CATALOG_SERVICES_NUM), Ok(3.0));
    }
}
