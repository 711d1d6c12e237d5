//! Snapshot Exporter Library
//!
//! Polls a cluster manager's flat JSON metrics snapshot and re-exposes a
//! curated subset as typed, labeled metrics, one scrape path per source.
//!
//! # Architecture
//!
//! The system follows an explicit data flow per scrape:
//!
//! ```text
//! exporter → collector → snapshot (one fetch)
//!                ↓
//!        sources (mapping rules) → metrics (stage, drain) → text format
//! ```
//!
//! # Design Principles
//!
//! - **One fetch per scrape**: no background polling, no retries
//! - **Metric-local failures**: a missing snapshot key only drops its own metric
//! - **No carry-over**: staged values are drained every pass
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use snapshot_exporter::{sources::master, MockSource, Snapshot};
//!
//! let set = master::definitions(Arc::new(MockSource::new())).expect("valid table");
//! let snapshot: Snapshot = [
//!     ("master/elected", 1.0),
//!     ("master/cpus_total", 8.0),
//!     ("master/cpus_used", 3.0),
//! ]
//! .into_iter()
//! .collect();
//!
//! let text = set.collect_from(&snapshot).encode().expect("encodable");
//! assert!(text.contains(r#"mesos_master_cpus{elected="1",type="cpu_free"} 5"#));
//! ```

#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod collector;
pub mod config;
pub mod exporter;
pub mod metrics;
pub mod snapshot;
pub mod sources;

// Re-export commonly used types at crate root
pub use collector::{DefinitionSet, ExtractionRule, PassContext, PassReport};
pub use exporter::{ExporterServer, SourceRegistry};
pub use metrics::{BufferedMetric, Descriptor, MetricKind, RegistrationError, Stage};
pub use snapshot::{FetchError, MissingField, MockSource, Snapshot, SnapshotSource};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
