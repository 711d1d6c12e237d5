//! Binding of buffered metrics to their extraction rules.

use super::rule::{no_context, ContextRule, ExtractionRule, PassContext};
use crate::metrics::{BufferedMetric, RegistrationError, Stage};
use crate::snapshot::{MissingField, Snapshot, SnapshotSource};
use prometheus::{IntCounter, Opts, Registry};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// One buffered metric paired with the rule that fills it.
pub struct MetricDefinition {
    pub(crate) metric: BufferedMetric,
    pub(crate) rule: Box<dyn ExtractionRule>,
}

impl MetricDefinition {
    pub fn new<R: ExtractionRule + 'static>(metric: BufferedMetric, rule: R) -> Self {
        Self {
            metric,
            rule: Box::new(rule),
        }
    }

    pub fn metric(&self) -> &BufferedMetric {
        &self.metric
    }
}

/// Metric definitions bound to one snapshot source, with their own
/// registry and error counter.
pub struct DefinitionSet {
    pub(crate) name: String,
    pub(crate) source: Arc<dyn SnapshotSource>,
    pub(crate) context_rule: ContextRule,
    pub(crate) definitions: Vec<MetricDefinition>,
    pub(crate) registry: Registry,
    pub(crate) errors: IntCounter,
    pub(crate) pass_guard: Mutex<()>,
}

impl DefinitionSet {
    /// Starts a set named `name` whose error counter lives under `namespace`.
    pub fn builder(
        name: impl Into<String>,
        namespace: impl Into<String>,
        source: Arc<dyn SnapshotSource>,
    ) -> DefinitionSetBuilder {
        DefinitionSetBuilder {
            name: name.into(),
            namespace: namespace.into(),
            source,
            context_rule: no_context,
            definitions: Vec::new(),
            pending_error: None,
        }
    }

    /// Name used in log fields for this set.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of metric definitions, excluding the error counter.
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn definitions(&self) -> impl Iterator<Item = &MetricDefinition> {
        self.definitions.iter()
    }

    /// Operational errors counted so far.
    pub fn error_count(&self) -> u64 {
        self.errors.get()
    }
}

impl std::fmt::Debug for DefinitionSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefinitionSet")
            .field("name", &self.name)
            .field("source", &self.source.endpoint())
            .field("definitions", &self.definitions.len())
            .finish()
    }
}

/// Assembles a [`DefinitionSet`], rejecting conflicting metric identities.
pub struct DefinitionSetBuilder {
    name: String,
    namespace: String,
    source: Arc<dyn SnapshotSource>,
    context_rule: ContextRule,
    definitions: Vec<MetricDefinition>,
    pending_error: Option<RegistrationError>,
}

impl DefinitionSetBuilder {
    /// Designates the rule that derives the shared per-pass context.
    pub fn context(mut self, rule: ContextRule) -> Self {
        self.context_rule = rule;
        self
    }

    /// Adds a metric filled by a closure or function.
    pub fn define<F>(self, metric: Result<BufferedMetric, RegistrationError>, rule: F) -> Self
    where
        F: Fn(&Snapshot, &PassContext, &mut Stage<'_>) -> Result<(), MissingField>
            + Send
            + Sync
            + 'static,
    {
        self.define_rule(metric, rule)
    }

    /// Adds a metric filled by any [`ExtractionRule`].
    pub fn define_rule<R: ExtractionRule + 'static>(
        mut self,
        metric: Result<BufferedMetric, RegistrationError>,
        rule: R,
    ) -> Self {
        match metric {
            Ok(metric) => self.definitions.push(MetricDefinition::new(metric, rule)),
            Err(err) => {
                self.pending_error.get_or_insert(err);
            }
        }
        self
    }

    pub fn build(self) -> Result<DefinitionSet, RegistrationError> {
        if let Some(err) = self.pending_error {
            return Err(err);
        }

        let registry = Registry::new();
        let errors = IntCounter::with_opts(
            Opts::new(
                "errors_total",
                format!("Total number of internal {}-collector errors.", self.namespace),
            )
            .namespace(self.namespace.clone())
            .subsystem("collector"),
        )?;
        registry.register(Box::new(errors.clone()))?;

        let mut seen = HashSet::new();
        for definition in &self.definitions {
            let descriptor = definition.metric.describe();
            if !seen.insert(descriptor.fq_name()) {
                return Err(RegistrationError::DuplicateMetric(descriptor.to_string()));
            }
            registry.register(Box::new(definition.metric.clone()))?;
        }

        tracing::debug!(
            set = %self.name,
            source = %self.source.endpoint(),
            metrics = self.definitions.len(),
            "Built metric definition set"
        );

        Ok(DefinitionSet {
            name: self.name,
            source: self.source,
            context_rule: self.context_rule,
            definitions: self.definitions,
            registry,
            errors,
            pass_guard: Mutex::new(()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::MockSource;

    fn noop(_: &Snapshot, _: &PassContext, _: &mut Stage<'_>) -> Result<(), MissingField> {
        Ok(())
    }

    fn source() -> Arc<dyn SnapshotSource> {
        Arc::new(MockSource::new())
    }

    #[test]
    fn test_build_registers_every_definition() {
        let set = DefinitionSet::builder("master", "mesos", source())
            .define(BufferedMetric::gauge("mesos", "master", "elected", "Leader.", &[]), noop)
            .define(BufferedMetric::gauge("mesos", "master", "cpus", "CPUs.", &["type"]), noop)
            .build()
            .unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.error_count(), 0);
    }

    #[test]
    fn test_duplicate_identity_rejected() {
        let result = DefinitionSet::builder("master", "mesos", source())
            .define(BufferedMetric::gauge("mesos", "master", "cpus", "CPUs.", &["type"]), noop)
            .define(BufferedMetric::gauge("mesos", "master", "cpus", "CPUs.", &["type"]), noop)
            .build();
        assert!(matches!(result, Err(RegistrationError::DuplicateMetric(_))));
    }

    #[test]
    fn test_conflicting_label_arity_rejected() {
        let result = DefinitionSet::builder("master", "mesos", source())
            .define(BufferedMetric::gauge("mesos", "master", "cpus", "CPUs.", &["type"]), noop)
            .define(
                BufferedMetric::counter("mesos", "master", "cpus", "CPUs.", &["elected", "type"]),
                noop,
            )
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_clash_with_error_counter_rejected() {
        let result = DefinitionSet::builder("master", "mesos", source())
            .define(
                BufferedMetric::counter("mesos", "collector", "errors_total", "Clash.", &[]),
                noop,
            )
            .build();
        assert!(matches!(result, Err(RegistrationError::Prometheus(_))));
    }

    #[test]
    fn test_invalid_descriptor_surfaces_at_build() {
        let result = DefinitionSet::builder("master", "mesos", source())
            .define(BufferedMetric::gauge("mesos", "master", "bad name", "Bad.", &[]), noop)
            .build();
        assert!(matches!(
            result,
            Err(RegistrationError::InvalidDescriptor { .. })
        ));
    }
}
