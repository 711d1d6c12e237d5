//! Reusable typed output slots with a per-pass stage/drain lifecycle.

use super::Descriptor;
use prometheus::core::{Collector, Desc};
use prometheus::proto;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

/// Errors raised while assembling metrics at startup.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("invalid descriptor {descriptor}: {source}")]
    InvalidDescriptor {
        descriptor: String,
        #[source]
        source: prometheus::Error,
    },

    #[error("duplicate metric identity: {0}")]
    DuplicateMetric(String),

    #[error("scrape path already bound: {0}")]
    DuplicatePath(String),

    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// A label-value list whose length does not match the descriptor's schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{metric}: expected {expected} label values, got {got}")]
pub struct LabelArityError {
    pub metric: String,
    pub expected: usize,
    pub got: usize,
}

/// Exported value type of a buffered metric family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
}

impl From<MetricKind> for proto::MetricType {
    fn from(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Counter => proto::MetricType::COUNTER,
            MetricKind::Gauge => proto::MetricType::GAUGE,
        }
    }
}

/// One pending (label values, value) entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub label_values: Vec<String>,
    pub value: f64,
}

struct Inner {
    kind: MetricKind,
    descriptor: Descriptor,
    desc: Desc,
    pending: Mutex<Vec<Sample>>,
}

/// Output slot that accumulates staged samples for exactly one pass.
///
/// Cloning is cheap and yields a handle to the same buffer, so the same
/// metric can be owned by its definition and registered with a
/// [`prometheus::Registry`]. Gathering the registry drains the buffer.
#[derive(Clone)]
pub struct BufferedMetric {
    inner: Arc<Inner>,
}

impl BufferedMetric {
    /// Validates `descriptor` and creates an empty buffer of `kind`.
    pub fn new(kind: MetricKind, descriptor: Descriptor) -> Result<Self, RegistrationError> {
        let desc = descriptor
            .to_desc()
            .map_err(|source| RegistrationError::InvalidDescriptor {
                descriptor: descriptor.to_string(),
                source,
            })?;
        Ok(Self {
            inner: Arc::new(Inner {
                kind,
                descriptor,
                desc,
                pending: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Creates a counter family.
    pub fn counter(
        namespace: &str,
        subsystem: &str,
        name: &str,
        help: &str,
        labels: &[&str],
    ) -> Result<Self, RegistrationError> {
        Self::new(
            MetricKind::Counter,
            Descriptor::new(namespace, subsystem, name, help, labels),
        )
    }

    /// Creates a gauge family.
    pub fn gauge(
        namespace: &str,
        subsystem: &str,
        name: &str,
        help: &str,
        labels: &[&str],
    ) -> Result<Self, RegistrationError> {
        Self::new(
            MetricKind::Gauge,
            Descriptor::new(namespace, subsystem, name, help, labels),
        )
    }

    /// Identity this metric was registered with.
    pub fn describe(&self) -> &Descriptor {
        &self.inner.descriptor
    }

    /// Whether drained samples are exposed as counters or gauges.
    pub fn kind(&self) -> MetricKind {
        self.inner.kind
    }

    /// Appends one pending entry.
    pub fn stage(&self, value: f64, label_values: &[&str]) -> Result<(), LabelArityError> {
        let sample = sample_for(&self.inner.descriptor, value, label_values)?;
        self.lock_pending().push(sample);
        Ok(())
    }

    /// Returns and clears every pending entry.
    pub fn drain(&self) -> Vec<Sample> {
        std::mem::take(&mut *self.lock_pending())
    }

    /// Number of entries staged since the last drain.
    pub fn pending_len(&self) -> usize {
        self.lock_pending().len()
    }

    pub(crate) fn commit(&self, samples: Vec<Sample>) {
        self.lock_pending().extend(samples);
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, Vec<Sample>> {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn to_family(&self, samples: Vec<Sample>) -> proto::MetricFamily {
        let descriptor = &self.inner.descriptor;
        let mut family = proto::MetricFamily::default();
        family.set_name(descriptor.fq_name());
        family.set_help(descriptor.help.clone());
        family.set_field_type(self.inner.kind.into());

        for sample in samples {
            let mut pairs: Vec<proto::LabelPair> = descriptor
                .label_names
                .iter()
                .zip(sample.label_values)
                .map(|(name, value)| {
                    let mut pair = proto::LabelPair::default();
                    pair.set_name(name.clone());
                    pair.set_value(value);
                    pair
                })
                .collect();
            pairs.sort_by(|a, b| a.get_name().cmp(b.get_name()));

            let mut metric = proto::Metric::default();
            for pair in pairs {
                metric.mut_label().push(pair);
            }
            match self.inner.kind {
                MetricKind::Counter => {
                    let mut counter = proto::Counter::default();
                    counter.set_value(sample.value);
                    metric.set_counter(counter);
                }
                MetricKind::Gauge => {
                    let mut gauge = proto::Gauge::default();
                    gauge.set_value(sample.value);
                    metric.set_gauge(gauge);
                }
            }
            family.mut_metric().push(metric);
        }
        family
    }
}

impl std::fmt::Debug for BufferedMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferedMetric")
            .field("kind", &self.inner.kind)
            .field("descriptor", &self.inner.descriptor)
            .finish()
    }
}

impl Collector for BufferedMetric {
    fn desc(&self) -> Vec<&Desc> {
        vec![&self.inner.desc]
    }

    fn collect(&self) -> Vec<proto::MetricFamily> {
        let samples = self.drain();
        if samples.is_empty() {
            return Vec::new();
        }
        vec![self.to_family(samples)]
    }
}

/// Private staging area handed to one extraction rule.
///
/// Entries only reach the owning [`BufferedMetric`] if the rule succeeds.
pub struct Stage<'a> {
    descriptor: &'a Descriptor,
    samples: Vec<Sample>,
    rejected: Vec<LabelArityError>,
}

impl<'a> Stage<'a> {
    pub fn new(descriptor: &'a Descriptor) -> Self {
        Self {
            descriptor,
            samples: Vec::new(),
            rejected: Vec::new(),
        }
    }

    /// Stages one value; a label-value list of the wrong length is rejected.
    pub fn set(&mut self, value: f64, label_values: &[&str]) {
        match sample_for(self.descriptor, value, label_values) {
            Ok(sample) => self.samples.push(sample),
            Err(err) => self.rejected.push(err),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub(crate) fn into_parts(self) -> (Vec<Sample>, Vec<LabelArityError>) {
        (self.samples, self.rejected)
    }
}

fn sample_for(
    descriptor: &Descriptor,
    value: f64,
    label_values: &[&str],
) -> Result<Sample, LabelArityError> {
    if label_values.len() != descriptor.arity() {
        return Err(LabelArityError {
            metric: descriptor.fq_name(),
            expected: descriptor.arity(),
            got: label_values.len(),
        });
    }
    Ok(Sample {
        label_values: label_values.iter().map(|v| v.to_string()).collect(),
        value,
    })
}
