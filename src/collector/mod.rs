//! Metric collection and translation engine.
//!
//! A [`DefinitionSet`] binds a snapshot source to a collection of
//! [`MetricDefinition`]s. Each scrape runs one pass:
//!
//! ```text
//! fetch snapshot → derive PassContext → run every rule → drain every metric
//! ```
//!
//! Only a failed fetch fails the whole pass. A rule missing a snapshot key
//! drops its own metric from that pass and nothing else.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use snapshot_exporter::collector::{DefinitionSet, PassContext};
//! use snapshot_exporter::metrics::{BufferedMetric, Stage};
//! use snapshot_exporter::snapshot::{MissingField, MockSource, Snapshot};
//!
//! fn elected(s: &Snapshot, _: &PassContext, out: &mut Stage<'_>) -> Result<(), MissingField> {
//!     out.set(s.get("master/elected")?, &[]);
//!     Ok(())
//! }
//!
//! let set = DefinitionSet::builder("master", "mesos", Arc::new(MockSource::new()))
//!     .define(BufferedMetric::gauge("mesos", "master", "elected", "Leader flag.", &[]), elected)
//!     .build()
//!     .expect("no conflicting metrics");
//!
//! let snapshot: Snapshot = [("master/elected", 1.0)].into_iter().collect();
//! let report = set.collect_from(&snapshot);
//! assert!(report.family("mesos_master_elected").is_some());
//! ```

mod orchestrator;
mod rule;
mod set;

pub use orchestrator::{PassReport, SkippedMetric};
pub use rule::{no_context, ContextRule, ExtractionRule, PassContext, VerbatimKeys};
pub use set::{DefinitionSet, DefinitionSetBuilder, MetricDefinition};
