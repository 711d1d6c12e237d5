//! Field mapping tables for each polled source.
//!
//! These tables only decide which snapshot keys become which metrics.
//! They are consumed by [`crate::collector`] and can be swapped without
//! touching the collection engine.

pub mod agent;
pub mod consul;
pub mod master;

/// Namespace of the Mesos master and agent metrics.
pub const NAMESPACE: &str = "mesos";

pub const MASTER_PATH: &str = "/metrics/mesos-master";
pub const AGENT_PATH: &str = "/metrics/mesos-agent";
pub const CONSUL_PATH: &str = "/metrics/consul-server";
