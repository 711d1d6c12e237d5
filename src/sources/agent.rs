//! Mesos agent snapshot mapping.

use crate::collector::{DefinitionSet, PassContext, VerbatimKeys};
use crate::metrics::{BufferedMetric, RegistrationError, Stage};
use crate::snapshot::{MissingField, Snapshot, SnapshotSource};
use std::sync::Arc;

use super::NAMESPACE;

const SUBSYSTEM: &str = "slave";

fn gauge(name: &str, help: &str, labels: &[&str]) -> Result<BufferedMetric, RegistrationError> {
    BufferedMetric::gauge(NAMESPACE, SUBSYSTEM, name, help, labels)
}

fn counter(name: &str, help: &str, labels: &[&str]) -> Result<BufferedMetric, RegistrationError> {
    BufferedMetric::counter(NAMESPACE, SUBSYSTEM, name, help, labels)
}

/// Builds the agent set; `exported_keys` are surfaced verbatim as
/// `mesos_slave_snapshot_value{key="..."}`.
pub fn definitions(
    source: Arc<dyn SnapshotSource>,
    exported_keys: &[String],
) -> Result<DefinitionSet, RegistrationError> {
    let mut builder = DefinitionSet::builder(SUBSYSTEM, NAMESPACE, source)
        .define(gauge("registered", "1 if agent is registered with a master, 0 if not", &[]), registered)
        .define(
            gauge("uptime_seconds", "Number of seconds the agent process is running.", &[]),
            uptime,
        )
        .define(
            gauge("cpus", "Current CPU resources on this agent.", &["type"]),
            |s: &Snapshot, _: &PassContext, out: &mut Stage<'_>| free_used(s, out, "cpus", "cpu"),
        )
        .define(
            gauge("mem", "Current memory resources on this agent.", &["type"]),
            |s: &Snapshot, _: &PassContext, out: &mut Stage<'_>| free_used(s, out, "mem", "mem"),
        )
        .define(
            gauge("disk", "Current disk resources on this agent.", &["type"]),
            |s: &Snapshot, _: &PassContext, out: &mut Stage<'_>| free_used(s, out, "disk", "disk"),
        )
        .define(
            gauge("executors_state", "Current number of executors by state.", &["state"]),
            |s: &Snapshot, _: &PassContext, out: &mut Stage<'_>| {
                stage_states(
                    s,
                    out,
                    &[
                        ("slave/executors_registering", "registering"),
                        ("slave/executors_running", "running"),
                        ("slave/executors_terminating", "terminating"),
                    ],
                )
            },
        )
        .define(
            counter(
                "executors_terminated_total",
                "Total number of executors terminated on this agent.",
                &[],
            ),
            executors_terminated,
        )
        .define(
            counter(
                "task_states_exit_total",
                "Total number of tasks processed by exit state.",
                &["state"],
            ),
            |s: &Snapshot, _: &PassContext, out: &mut Stage<'_>| {
                stage_states(
                    s,
                    out,
                    &[
                        ("slave/tasks_failed", "failed"),
                        ("slave/tasks_finished", "finished"),
                        ("slave/tasks_killed", "killed"),
                        ("slave/tasks_lost", "lost"),
                    ],
                )
            },
        )
        .define(
            gauge("task_states_current", "Current number of tasks by state.", &["state"]),
            |s: &Snapshot, _: &PassContext, out: &mut Stage<'_>| {
                stage_states(
                    s,
                    out,
                    &[
                        ("slave/tasks_running", "running"),
                        ("slave/tasks_staging", "staging"),
                        ("slave/tasks_starting", "starting"),
                    ],
                )
            },
        );

    if !exported_keys.is_empty() {
        builder = builder.define_rule(
            gauge("snapshot_value", "Raw snapshot values exported by configuration.", &["key"]),
            VerbatimKeys::new(exported_keys.to_vec()),
        );
    }

    builder.build()
}

fn registered(s: &Snapshot, _: &PassContext, out: &mut Stage<'_>) -> Result<(), MissingField> {
    out.set(s.get("slave/registered")?, &[]);
    Ok(())
}

fn uptime(s: &Snapshot, _: &PassContext, out: &mut Stage<'_>) -> Result<(), MissingField> {
    out.set(s.get("slave/uptime_secs")?, &[]);
    Ok(())
}

fn executors_terminated(
    s: &Snapshot,
    _: &PassContext,
    out: &mut Stage<'_>,
) -> Result<(), MissingField> {
    out.set(s.get("slave/executors_terminated")?, &[]);
    Ok(())
}

fn free_used(
    s: &Snapshot,
    out: &mut Stage<'_>,
    resource: &str,
    label: &str,
) -> Result<(), MissingField> {
    let total = s.get(&format!("slave/{resource}_total"))?;
    let used = s.get(&format!("slave/{resource}_used"))?;
    out.set(total - used, &[&format!("{label}_free")]);
    out.set(used, &[&format!("{label}_used")]);
    Ok(())
}

fn stage_states(
    s: &Snapshot,
    out: &mut Stage<'_>,
    states: &[(&str, &str)],
) -> Result<(), MissingField> {
    let values = states
        .iter()
        .map(|(key, state)| s.get(key).map(|value| (value, *state)))
        .collect::<Result<Vec<_>, MissingField>>()?;
    for (value, state) in values {
        out.set(value, &[state]);
    }
    Ok(())
}
