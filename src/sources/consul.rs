//! Consul server catalog mapping.

use crate::collector::{DefinitionSet, PassContext};
use crate::metrics::{BufferedMetric, RegistrationError, Stage};
use crate::snapshot::{MissingField, Snapshot, SnapshotSource, CATALOG_SERVICES_NUM};
use std::sync::Arc;

pub const NAMESPACE: &str = "consul";

pub fn definitions(source: Arc<dyn SnapshotSource>) -> Result<DefinitionSet, RegistrationError> {
    DefinitionSet::builder("consul", NAMESPACE, source)
        .define(
            BufferedMetric::gauge(
                NAMESPACE,
                "",
                CATALOG_SERVICES_NUM,
                "How many services are in the cluster.",
                &[],
            ),
            services,
        )
        .build()
}

fn services(s: &Snapshot, _: &PassContext, out: &mut Stage<'_>) -> Result<(), MissingField> {
    out.set(s.get(CATALOG_SERVICES_NUM)?, &[]);
    Ok(())
}
