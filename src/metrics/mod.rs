//! Buffered metric families and their descriptors.
//!
//! A [`BufferedMetric`] is created once at startup and reused for every
//! scrape. During a pass, extraction rules stage values into it through a
//! [`Stage`]; when the owning registry is gathered the buffer is drained,
//! so nothing staged in one pass is visible in the next.
//!
//! # Example
//!
//! ```
//! use snapshot_exporter::metrics::BufferedMetric;
//!
//! let cpus = BufferedMetric::gauge("mesos", "master", "cpus", "CPU resources.", &["type"])
//!     .expect("valid descriptor");
//! cpus.stage(3.0, &["cpu_used"]).expect("one label");
//!
//! assert_eq!(cpus.drain().len(), 1);
//! assert!(cpus.drain().is_empty());
//! ```

mod buffered;
mod descriptor;

pub use buffered::{BufferedMetric, LabelArityError, MetricKind, RegistrationError, Sample, Stage};
pub use descriptor::Descriptor;

/// Content type of the text exposition format.
pub const TEXT_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Encodes gathered families in the text exposition format.
pub fn encode_text(families: &[prometheus::proto::MetricFamily]) -> prometheus::Result<String> {
    use prometheus::{Encoder, TextEncoder};

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
