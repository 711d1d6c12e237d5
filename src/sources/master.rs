//! Mesos master snapshot mapping.
//!
//! Most metrics carry the `elected` label first, derived once per pass
//! from `master/elected`. The unlabeled gauges `elected`, `uptime_seconds`
//! and `offers_pending` keep their plain series names.

use crate::collector::{DefinitionSet, PassContext};
use crate::metrics::{BufferedMetric, RegistrationError, Stage};
use crate::snapshot::{MissingField, Snapshot, SnapshotSource};
use std::sync::Arc;

use super::NAMESPACE;

const SUBSYSTEM: &str = "master";

/// Prefix shared by the per-type message counters.
pub const MESSAGES_PREFIX: &str = "master/messages_";

fn gauge(name: &str, help: &str, labels: &[&str]) -> Result<BufferedMetric, RegistrationError> {
    BufferedMetric::gauge(NAMESPACE, SUBSYSTEM, name, help, labels)
}

fn counter(name: &str, help: &str, labels: &[&str]) -> Result<BufferedMetric, RegistrationError> {
    BufferedMetric::counter(NAMESPACE, SUBSYSTEM, name, help, labels)
}

/// Reads the leader flag shared as the `elected` label.
pub fn leadership(snapshot: &Snapshot) -> PassContext {
    snapshot
        .lookup("master/elected")
        .map(PassContext::with_elected)
        .unwrap_or_default()
}

pub fn definitions(source: Arc<dyn SnapshotSource>) -> Result<DefinitionSet, RegistrationError> {
    DefinitionSet::builder(SUBSYSTEM, NAMESPACE, source)
        .context(leadership)
        .define(gauge("elected", "1 if master is elected leader, 0 if not", &[]), elected)
        .define(
            gauge("cpus", "Current CPU resources in cluster.", &["elected", "type"]),
            |s: &Snapshot, ctx: &PassContext, out: &mut Stage<'_>| free_used(s, ctx, out, "cpus", "cpu"),
        )
        .define(
            gauge("mem", "Current memory resources in cluster.", &["elected", "type"]),
            |s: &Snapshot, ctx: &PassContext, out: &mut Stage<'_>| free_used(s, ctx, out, "mem", "mem"),
        )
        .define(
            gauge("disk", "Current disk resources in cluster.", &["elected", "type"]),
            |s: &Snapshot, ctx: &PassContext, out: &mut Stage<'_>| free_used(s, ctx, out, "disk", "disk"),
        )
        .define(
            gauge("uptime_seconds", "Number of seconds the master process is running.", &[]),
            uptime,
        )
        .define(
            counter(
                "slave_registration_events_total",
                "Total number of registration events on this master since it booted.",
                &["elected", "event"],
            ),
            slave_registrations,
        )
        .define(
            counter(
                "slave_removal_events_total",
                "Total number of removal events on this master since it booted.",
                &["elected", "event"],
            ),
            slave_removals,
        )
        .define(
            gauge(
                "slaves_state",
                "Current number of slaves known to the master per connection and registration state.",
                &["elected", "connection_state", "registration_state"],
            ),
            |s: &Snapshot, ctx: &PassContext, out: &mut Stage<'_>| connection_states(s, ctx, out, "slaves"),
        )
        .define(
            gauge(
                "frameworks_state",
                "Current number of frameworks known to the master per connection and registration state.",
                &["elected", "connection_state", "registration_state"],
            ),
            |s: &Snapshot, ctx: &PassContext, out: &mut Stage<'_>| {
                connection_states(s, ctx, out, "frameworks")
            },
        )
        .define(
            gauge(
                "offers_pending",
                "Current number of offers made by the master which aren't yet accepted or declined by frameworks.",
                &[],
            ),
            offers_pending,
        )
        .define(
            counter(
                "task_states_exit_total",
                "Total number of tasks processed by exit state.",
                &["elected", "state"],
            ),
            task_exits,
        )
        .define(
            counter(
                "task_states_current",
                "Current number of tasks by state.",
                &["elected", "state"],
            ),
            tasks_current,
        )
        .define(
            counter(
                "messages_outcomes_total",
                "Total number of messages by outcome of operation and direction.",
                &["elected", "source", "destination", "type", "outcome"],
            ),
            message_outcomes,
        )
        .define(
            counter(
                "messages_type_total",
                "Total number of valid messages by type.",
                &["elected", "type"],
            ),
            messages_by_type,
        )
        .define(
            gauge(
                "event_queue_length",
                "Current number of elements in event queue by type",
                &["elected", "type"],
            ),
            event_queue,
        )
        .build()
}

fn elected(s: &Snapshot, _: &PassContext, out: &mut Stage<'_>) -> Result<(), MissingField> {
    out.set(s.get("master/elected")?, &[]);
    Ok(())
}

/// Splits `master/<resource>_total` and `_used` into free and used.
fn free_used(
    s: &Snapshot,
    ctx: &PassContext,
    out: &mut Stage<'_>,
    resource: &str,
    label: &str,
) -> Result<(), MissingField> {
    let total = s.get(&format!("master/{resource}_total"))?;
    let used = s.get(&format!("master/{resource}_used"))?;
    let elected = ctx.elected_label();
    out.set(total - used, &[&elected, &format!("{label}_free")]);
    out.set(used, &[&elected, &format!("{label}_used")]);
    Ok(())
}

fn uptime(s: &Snapshot, _: &PassContext, out: &mut Stage<'_>) -> Result<(), MissingField> {
    out.set(s.get("master/uptime_secs")?, &[]);
    Ok(())
}

fn slave_registrations(
    s: &Snapshot,
    ctx: &PassContext,
    out: &mut Stage<'_>,
) -> Result<(), MissingField> {
    let registrations = s.get("master/slave_registrations")?;
    let reregistrations = s.get("master/slave_reregistrations")?;
    let elected = ctx.elected_label();
    out.set(registrations, &[&elected, "register"]);
    out.set(reregistrations, &[&elected, "reregister"]);
    Ok(())
}

fn slave_removals(s: &Snapshot, ctx: &PassContext, out: &mut Stage<'_>) -> Result<(), MissingField> {
    let scheduled = s.get("master/slave_shutdowns_scheduled")?;
    let canceled = s.get("master/slave_shutdowns_canceled")?;
    let completed = s.get("master/slave_shutdowns_completed")?;
    let removals = s.get("master/slave_removals")?;
    let elected = ctx.elected_label();
    out.set(scheduled, &[&elected, "scheduled"]);
    out.set(canceled, &[&elected, "canceled"]);
    out.set(completed, &[&elected, "completed"]);
    out.set(removals - completed, &[&elected, "died"]);
    Ok(())
}

/// Active and inactive entries are connected; disconnected ones are inactive.
fn connection_states(
    s: &Snapshot,
    ctx: &PassContext,
    out: &mut Stage<'_>,
    kind: &str,
) -> Result<(), MissingField> {
    let active = s.get(&format!("master/{kind}_active"))?;
    let inactive = s.get(&format!("master/{kind}_inactive"))?;
    let disconnected = s.get(&format!("master/{kind}_disconnected"))?;
    let elected = ctx.elected_label();
    out.set(active, &[&elected, "connected", "active"]);
    out.set(inactive, &[&elected, "connected", "inactive"]);
    out.set(disconnected, &[&elected, "disconnected", "inactive"]);
    Ok(())
}

fn offers_pending(s: &Snapshot, _: &PassContext, out: &mut Stage<'_>) -> Result<(), MissingField> {
    out.set(s.get("master/outstanding_offers")?, &[]);
    Ok(())
}

fn task_exits(s: &Snapshot, ctx: &PassContext, out: &mut Stage<'_>) -> Result<(), MissingField> {
    stage_states(
        s,
        ctx,
        out,
        &[
            ("master/tasks_error", "errored"),
            ("master/tasks_failed", "failed"),
            ("master/tasks_finished", "finished"),
            ("master/tasks_killed", "killed"),
            ("master/tasks_lost", "lost"),
        ],
    )
}

fn tasks_current(s: &Snapshot, ctx: &PassContext, out: &mut Stage<'_>) -> Result<(), MissingField> {
    stage_states(
        s,
        ctx,
        out,
        &[
            ("master/tasks_running", "running"),
            ("master/tasks_staging", "staging"),
            ("master/tasks_starting", "starting"),
        ],
    )
}

/// Requires every key before staging any of them.
fn stage_states(
    s: &Snapshot,
    ctx: &PassContext,
    out: &mut Stage<'_>,
    states: &[(&str, &str)],
) -> Result<(), MissingField> {
    let values = states
        .iter()
        .map(|(key, state)| s.get(key).map(|value| (value, *state)))
        .collect::<Result<Vec<_>, MissingField>>()?;
    let elected = ctx.elected_label();
    for (value, state) in values {
        out.set(value, &[&elected, state]);
    }
    Ok(())
}

fn message_outcomes(
    s: &Snapshot,
    ctx: &PassContext,
    out: &mut Stage<'_>,
) -> Result<(), MissingField> {
    // (key, source, destination, type, outcome)
    const OUTCOMES: [(&str, &str, &str, &str, &str); 8] = [
        ("master/valid_framework_to_executor_messages", "framework", "executor", "", "valid"),
        ("master/invalid_framework_to_executor_messages", "framework", "executor", "", "invalid"),
        ("master/valid_executor_to_framework_messages", "executor", "framework", "", "valid"),
        ("master/invalid_executor_to_framework_messages", "executor", "framework", "", "invalid"),
        ("master/valid_status_updates", "framework", "slave", "status_update", "valid"),
        ("master/invalid_status_updates", "framework", "slave", "status_update", "invalid"),
        // Acknowledgements travel from the agent back to the framework.
        ("master/valid_status_update_acknowledgements", "slave", "framework", "status_update", "valid"),
        ("master/invalid_status_update_acknowledgements", "slave", "framework", "status_update", "invalid"),
    ];

    let values = OUTCOMES
        .iter()
        .map(|(key, ..)| s.get(key))
        .collect::<Result<Vec<_>, MissingField>>()?;
    let elected = ctx.elected_label();
    for (value, (_, source, destination, kind, outcome)) in values.into_iter().zip(OUTCOMES) {
        out.set(value, &[&elected, source, destination, kind, outcome]);
    }
    Ok(())
}

/// One sample per `master/messages_*` key, labeled with the key's suffix.
fn messages_by_type(
    s: &Snapshot,
    ctx: &PassContext,
    out: &mut Stage<'_>,
) -> Result<(), MissingField> {
    let elected = ctx.elected_label();
    for (key, value) in s.with_prefix(MESSAGES_PREFIX) {
        out.set(value, &[&elected, &key[MESSAGES_PREFIX.len()..]]);
    }
    Ok(())
}

fn event_queue(s: &Snapshot, ctx: &PassContext, out: &mut Stage<'_>) -> Result<(), MissingField> {
    let dispatches = s.get("master/event_queue_dispatches")?;
    let http_requests = s.get("master/event_queue_http_requests")?;
    let messages = s.get("master/event_queue_messages")?;
    let elected = ctx.elected_label();
    out.set(messages, &[&elected, "message"]);
    out.set(http_requests, &[&elected, "http_request"]);
    out.set(dispatches, &[&elected, "dispatches"]);
    Ok(())
}
