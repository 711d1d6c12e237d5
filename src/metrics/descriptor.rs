//! Immutable identity of an exported metric family.

use prometheus::core::{Desc, Describer};
use prometheus::Opts;

/// Namespace, subsystem, name, help and label schema of one output metric.
///
/// Two descriptors describe the same metric iff every field matches.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Descriptor {
    pub namespace: String,
    pub subsystem: String,
    pub name: String,
    pub help: String,
    /// Ordered variable label names.
    pub label_names: Vec<String>,
}

impl Descriptor {
    /// Builds an identity; names are checked when the metric is created.
    pub fn new(
        namespace: impl Into<String>,
        subsystem: impl Into<String>,
        name: impl Into<String>,
        help: impl Into<String>,
        label_names: &[&str],
    ) -> Self {
        Self {
            namespace: namespace.into(),
            subsystem: subsystem.into(),
            name: name.into(),
            help: help.into(),
            label_names: label_names.iter().map(|l| l.to_string()).collect(),
        }
    }

    /// Fully-qualified name, e.g. `mesos_master_cpus`.
    pub fn fq_name(&self) -> String {
        [&self.namespace, &self.subsystem, &self.name]
            .iter()
            .filter(|part| !part.is_empty())
            .map(|part| part.as_str())
            .collect::<Vec<_>>()
            .join("_")
    }

    /// Number of label values every staged entry must carry.
    pub fn arity(&self) -> usize {
        self.label_names.len()
    }

    /// Builds the validated prometheus descriptor.
    pub(crate) fn to_desc(&self) -> prometheus::Result<Desc> {
        Opts::new(self.name.clone(), self.help.clone())
            .namespace(self.namespace.clone())
            .subsystem(self.subsystem.clone())
            .variable_labels(self.label_names.clone())
            .describe()
    }
}

impl std::fmt::Display for Descriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{{{}}}", self.fq_name(), self.label_names.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fq_name_skips_empty_parts() {
        let d = Descriptor::new("consul", "", "catalog_services_num", "help", &[]);
        assert_eq!(d.fq_name(), "consul_catalog_services_num");

        let d = Descriptor::new("mesos", "master", "cpus", "help", &["elected", "type"]);
        assert_eq!(d.fq_name(), "mesos_master_cpus");
        assert_eq!(d.arity(), 2);
    }

    #[test]
    fn test_invalid_label_name_rejected() {
        let d = Descriptor::new("mesos", "master", "cpus", "help", &["not a label"]);
        assert!(d.to_desc().is_err());
    }
}
