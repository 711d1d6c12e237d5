//! Exporter configuration.
//!
//! Settings come from an optional TOML file and are overridden by
//! command-line flags. Credentials are only read from the environment
//! or the command line, never from the file.

use crate::exporter::{ExporterServerConfig, SourceRegistry};
use crate::metrics::RegistrationError;
use crate::snapshot::{
    validate_base_url, ClientOptions, ConsulCatalogSource, Credentials, HttpSnapshotSource,
    SourceError,
};
use crate::sources::{self, AGENT_PATH, CONSUL_PATH, MASTER_PATH};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Command-line flags.
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "snapshot-exporter", version, about = "Re-exposes cluster metric snapshots for scraping")]
pub struct CliArgs {
    /// TOML configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Address to listen on.
    #[arg(long)]
    pub addr: Option<SocketAddr>,

    /// Expose metrics from the master running on this URL.
    #[arg(long)]
    pub master: Option<String>,

    /// Expose metrics from the agent running on this URL.
    #[arg(long)]
    pub agent: Option<String>,

    /// Expose catalog metrics from the Consul server at this URL.
    #[arg(long)]
    pub consul_server: Option<String>,

    /// Per-fetch timeout in seconds.
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Comma-separated agent snapshot keys to export verbatim.
    #[arg(long, value_delimiter = ',')]
    pub exported_keys: Vec<String>,

    /// Comma-separated PEM files trusted for requests to the polled endpoints.
    #[arg(long, value_delimiter = ',')]
    pub trusted_certs: Vec<PathBuf>,

    /// Basic auth user for the polled endpoints.
    #[arg(long, env = "MESOS_EXPORTER_USERNAME", hide_env_values = true)]
    pub username: Option<String>,

    /// Basic auth password; ignored unless a user is also set.
    #[arg(long, env = "MESOS_EXPORTER_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("timeout must be greater than zero")]
    InvalidTimeout,
    #[error("no source configured (set at least one of master, agent, consul_server)")]
    NoSources,
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    #[error("failed to parse config file: {0}")]
    ParseError(String),
    #[error("failed to read certificate {path}: {reason}")]
    CertificateError { path: PathBuf, reason: String },
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Registration(#[from] RegistrationError),
}

/// Full exporter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    pub listen_addr: SocketAddr,
    /// Per-fetch timeout in seconds.
    pub timeout_secs: u64,
    pub master: Option<String>,
    pub agent: Option<String>,
    pub consul_server: Option<String>,
    pub exported_keys: Vec<String>,
    pub trusted_certs: Vec<PathBuf>,
    #[serde(skip)]
    pub credentials: Option<Credentials>,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            listen_addr: ExporterServerConfig::default().bind_addr,
            timeout_secs: 5,
            master: None,
            agent: None,
            consul_server: None,
            exported_keys: Vec::new(),
            trusted_certs: Vec::new(),
            credentials: None,
        }
    }
}

impl ExporterConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Reads the file named by `--config`, if any, applies the remaining
    /// flags on top and validates the result.
    pub fn load(cli: CliArgs) -> Result<Self, ConfigError> {
        let mut config = match &cli.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply(cli);
        config.validate()?;
        Ok(config)
    }

    fn apply(&mut self, cli: CliArgs) {
        if let Some(addr) = cli.addr {
            self.listen_addr = addr;
        }
        if let Some(timeout) = cli.timeout_secs {
            self.timeout_secs = timeout;
        }
        if cli.master.is_some() {
            self.master = cli.master;
        }
        if cli.agent.is_some() {
            self.agent = cli.agent;
        }
        if cli.consul_server.is_some() {
            self.consul_server = cli.consul_server;
        }
        if !cli.exported_keys.is_empty() {
            self.exported_keys = cli.exported_keys;
        }
        if !cli.trusted_certs.is_empty() {
            self.trusted_certs = cli.trusted_certs;
        }
        let credentials = Credentials::new(
            cli.username.unwrap_or_default(),
            cli.password.unwrap_or_default(),
        );
        if credentials.is_complete() {
            self.credentials = Some(credentials);
        }
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        let urls = [&self.master, &self.agent, &self.consul_server];
        if urls.iter().all(|url| url.is_none()) {
            return Err(ConfigError::NoSources);
        }
        for url in urls.into_iter().flatten() {
            validate_base_url(url)?;
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn server_config(&self) -> ExporterServerConfig {
        ExporterServerConfig {
            bind_addr: self.listen_addr,
        }
    }

    /// Transport settings with the trusted certificates read from disk.
    pub fn client_options(&self) -> Result<ClientOptions, ConfigError> {
        let trusted_roots = self
            .trusted_certs
            .iter()
            .map(|path| read_certificate(path))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ClientOptions {
            timeout: self.timeout(),
            credentials: self.credentials.clone(),
            trusted_roots,
        })
    }

    /// Builds one definition set per configured source and binds it.
    pub fn build_registry(&self) -> Result<SourceRegistry, ConfigError> {
        let options = self.client_options()?;
        let mut registry = SourceRegistry::new();

        if let Some(url) = &self.consul_server {
            let source = Arc::new(ConsulCatalogSource::new(url, &options)?);
            registry.bind(CONSUL_PATH, sources::consul::definitions(source)?)?;
        }
        if let Some(url) = &self.master {
            let source = Arc::new(HttpSnapshotSource::new(url, &options)?);
            registry.bind(MASTER_PATH, sources::master::definitions(source)?)?;
        }
        if let Some(url) = &self.agent {
            let source = Arc::new(HttpSnapshotSource::new(url, &options)?);
            registry.bind(
                AGENT_PATH,
                sources::agent::definitions(source, &self.exported_keys)?,
            )?;
        }
        Ok(registry)
    }
}

fn read_certificate(path: &Path) -> Result<Vec<u8>, ConfigError> {
    let cert_error = |reason: String| ConfigError::CertificateError {
        path: path.to_path_buf(),
        reason,
    };
    let pem = std::fs::read(path).map_err(|e| cert_error(e.to_string()))?;
    reqwest::Certificate::from_pem(&pem).map_err(|e| cert_error(e.to_string()))?;
    Ok(pem)
}
