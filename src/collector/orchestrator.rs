//! One fetch, evaluate, drain pass over a definition set.

use super::set::DefinitionSet;
use crate::metrics::{encode_text, Stage};
use crate::snapshot::{FetchError, Snapshot};
use prometheus::proto::MetricFamily;
use std::sync::PoisonError;

/// A metric skipped in a pass because its rule lacked a snapshot key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedMetric {
    pub metric: String,
    pub key: String,
}

/// Outcome of a single pass.
#[derive(Debug)]
pub struct PassReport {
    /// Everything drained in this pass, including the error counter.
    pub families: Vec<MetricFamily>,
    pub skipped: Vec<SkippedMetric>,
    pub fetch_error: Option<FetchError>,
}

impl PassReport {
    pub fn is_success(&self) -> bool {
        self.fetch_error.is_none()
    }

    pub fn family(&self, name: &str) -> Option<&MetricFamily> {
        self.families.iter().find(|f| f.get_name() == name)
    }

    pub fn encode(&self) -> prometheus::Result<String> {
        encode_text(&self.families)
    }
}

impl DefinitionSet {
    /// Runs one pass: fetch once, then evaluate and drain.
    ///
    /// A fetch failure counts one error and yields no metric other than the
    /// error counter.
    pub async fn scrape(&self) -> PassReport {
        match self.source.fetch().await {
            Ok(snapshot) => self.collect_from(&snapshot),
            Err(err) => self.record_failure(err),
        }
    }

    /// Evaluates every rule against `snapshot` and drains every metric.
    ///
    /// Passes over the same set are serialized from context derivation
    /// through the final drain.
    pub fn collect_from(&self, snapshot: &Snapshot) -> PassReport {
        let _pass = self.pass_guard.lock().unwrap_or_else(PoisonError::into_inner);

        let context = (self.context_rule)(snapshot);
        let mut skipped = Vec::new();

        for definition in &self.definitions {
            let descriptor = definition.metric.describe();
            let mut stage = Stage::new(descriptor);
            let outcome = definition.rule.extract(snapshot, &context, &mut stage);
            let (samples, rejected) = stage.into_parts();

            // A missing key discards the stage before arity is looked at.
            if let Err(missing) = outcome {
                tracing::warn!(
                    set = %self.name,
                    metric = %descriptor,
                    key = %missing.key,
                    "Couldn't find fields required to update metric"
                );
                skipped.push(SkippedMetric {
                    metric: descriptor.fq_name(),
                    key: missing.key,
                });
                continue;
            }

            if !rejected.is_empty() {
                for err in &rejected {
                    tracing::error!(set = %self.name, error = %err, "Rejected staged value");
                }
                self.errors.inc();
                continue;
            }

            definition.metric.commit(samples);
        }

        PassReport {
            families: self.registry.gather(),
            skipped,
            fetch_error: None,
        }
    }

    fn record_failure(&self, err: FetchError) -> PassReport {
        let _pass = self.pass_guard.lock().unwrap_or_else(PoisonError::into_inner);

        self.errors.inc();
        tracing::warn!(set = %self.name, error = %err, "Snapshot fetch failed");

        PassReport {
            families: self.registry.gather(),
            skipped: Vec::new(),
            fetch_error: Some(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{DefinitionSet, PassContext};
    use crate::metrics::BufferedMetric;
    use crate::snapshot::{MissingField, MockSource, SnapshotSource};
    use proptest::prelude::*;
    use std::sync::Arc;

    const ERRORS: &str = "mesos_collector_errors_total";

    fn leader(snapshot: &Snapshot) -> PassContext {
        snapshot
            .lookup("master/elected")
            .map(PassContext::with_elected)
            .unwrap_or_default()
    }

    fn elected(s: &Snapshot, _: &PassContext, out: &mut Stage<'_>) -> Result<(), MissingField> {
        out.set(s.get("master/elected")?, &[]);
        Ok(())
    }

    fn cpus(s: &Snapshot, _: &PassContext, out: &mut Stage<'_>) -> Result<(), MissingField> {
        let total = s.get("master/cpus_total")?;
        let used = s.get("master/cpus_used")?;
        out.set(total - used, &["cpu_free"]);
        out.set(used, &["cpu_used"]);
        Ok(())
    }

    fn uptime(s: &Snapshot, ctx: &PassContext, out: &mut Stage<'_>) -> Result<(), MissingField> {
        out.set(s.get("master/uptime_secs")?, &[&ctx.elected_label()]);
        Ok(())
    }

    fn master_set(source: Arc<dyn SnapshotSource>) -> DefinitionSet {
        DefinitionSet::builder("master", "mesos", source)
            .context(leader)
            .define(
                BufferedMetric::gauge("mesos", "master", "elected", "Leader flag.", &[]),
                elected,
            )
            .define(
                BufferedMetric::gauge("mesos", "master", "cpus", "CPU resources.", &["type"]),
                cpus,
            )
            .define(
                BufferedMetric::gauge("mesos", "master", "uptime_seconds", "Uptime.", &["elected"]),
                uptime,
            )
            .build()
            .unwrap()
    }

    fn snapshot(entries: &[(&str, f64)]) -> Snapshot {
        entries.iter().map(|(k, v)| (*k, *v)).collect()
    }

    fn gauge_value(report: &PassReport, name: &str, label: Option<(&str, &str)>) -> Option<f64> {
        report.family(name)?.get_metric().iter().find_map(|m| {
            let matches = match label {
                None => m.get_label().is_empty(),
                Some((k, v)) => m
                    .get_label()
                    .iter()
                    .any(|l| l.get_name() == k && l.get_value() == v),
            };
            matches.then(|| m.get_gauge().get_value())
        })
    }

    fn counter_value(report: &PassReport, name: &str) -> f64 {
        report.family(name).unwrap().get_metric()[0]
            .get_counter()
            .get_value()
    }

    #[test]
    fn test_full_snapshot_yields_every_metric() {
        let set = master_set(Arc::new(MockSource::new()));
        let report = set.collect_from(&snapshot(&[
            ("master/elected", 1.0),
            ("master/cpus_total", 8.0),
            ("master/cpus_used", 3.0),
        ]));

        assert!(report.is_success());
        assert_eq!(gauge_value(&report, "mesos_master_elected", None), Some(1.0));
        assert_eq!(
            gauge_value(&report, "mesos_master_cpus", Some(("type", "cpu_used"))),
            Some(3.0)
        );
        assert_eq!(
            gauge_value(&report, "mesos_master_cpus", Some(("type", "cpu_free"))),
            Some(5.0)
        );
        assert_eq!(counter_value(&report, ERRORS), 0.0);
    }

    #[test]
    fn test_missing_key_drops_only_that_family() {
        let set = master_set(Arc::new(MockSource::new()));
        let report = set.collect_from(&snapshot(&[
            ("master/elected", 1.0),
            ("master/cpus_total", 8.0),
            ("master/uptime_secs", 42.0),
        ]));

        assert!(report.family("mesos_master_cpus").is_none());
        assert_eq!(gauge_value(&report, "mesos_master_elected", None), Some(1.0));
        assert_eq!(
            gauge_value(&report, "mesos_master_uptime_seconds", Some(("elected", "1"))),
            Some(42.0)
        );
        assert_eq!(
            report.skipped,
            vec![SkippedMetric {
                metric: "mesos_master_cpus".to_string(),
                key: "master/cpus_used".to_string(),
            }]
        );
        assert_eq!(set.error_count(), 0);
    }

    #[test]
    fn test_later_pass_never_shows_earlier_values() {
        let set = master_set(Arc::new(MockSource::new()));
        set.collect_from(&snapshot(&[
            ("master/elected", 1.0),
            ("master/cpus_total", 8.0),
            ("master/cpus_used", 3.0),
            ("master/uptime_secs", 10.0),
        ]));

        let report = set.collect_from(&snapshot(&[("master/uptime_secs", 20.0)]));
        assert!(report.family("mesos_master_elected").is_none());
        assert!(report.family("mesos_master_cpus").is_none());
        assert_eq!(
            gauge_value(&report, "mesos_master_uptime_seconds", Some(("elected", ""))),
            Some(20.0)
        );
        let uptime = report.family("mesos_master_uptime_seconds").unwrap();
        assert_eq!(uptime.get_metric().len(), 1);

        for definition in set.definitions() {
            assert_eq!(definition.metric().pending_len(), 0);
        }
    }

    #[tokio::test]
    async fn test_fetch_failure_counts_once_and_emits_nothing() {
        let source = Arc::new(MockSource::new());
        source.push(Err(FetchError::Transport {
            url: "mock://snapshot".into(),
            reason: "connection refused".into(),
        }));
        let set = master_set(source.clone());

        let report = set.scrape().await;
        assert!(!report.is_success());
        assert_eq!(report.families.len(), 1);
        assert_eq!(report.families[0].get_name(), ERRORS);
        assert_eq!(counter_value(&report, ERRORS), 1.0);
        assert_eq!(source.fetches(), 1);
    }

    #[tokio::test]
    async fn test_scrape_fetches_exactly_once() {
        let source = Arc::new(MockSource::with_snapshot(snapshot(&[("master/elected", 0.0)])));
        let set = master_set(source.clone());

        let report = set.scrape().await;
        assert!(report.is_success());
        assert_eq!(gauge_value(&report, "mesos_master_elected", None), Some(0.0));
        assert_eq!(source.fetches(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_scrapes_do_not_interleave() {
        const PASSES: usize = 8;

        let source = Arc::new(MockSource::new());
        for i in 1..=PASSES {
            let used = i as f64;
            source.push(Ok(snapshot(&[
                ("master/cpus_total", 10.0 * used),
                ("master/cpus_used", used),
            ])));
        }

        // Holds each pass open between the cpus commit and the drain.
        let set = DefinitionSet::builder("master", "mesos", source.clone())
            .define(
                BufferedMetric::gauge("mesos", "master", "cpus", "CPU resources.", &["type"]),
                cpus,
            )
            .define(
                BufferedMetric::gauge("mesos", "master", "stall", "Stall.", &[]),
                |_: &Snapshot, _: &PassContext, _: &mut Stage<'_>| {
                    std::thread::sleep(std::time::Duration::from_millis(20));
                    Ok(())
                },
            )
            .build()
            .unwrap();
        let set = Arc::new(set);

        let handles: Vec<_> = (0..PASSES)
            .map(|_| {
                let set = Arc::clone(&set);
                tokio::spawn(async move { set.scrape().await })
            })
            .collect();

        let mut seen = Vec::new();
        for handle in handles {
            let report = handle.await.unwrap();
            assert!(report.is_success());
            let cpus = report.family("mesos_master_cpus").unwrap();
            assert_eq!(cpus.get_metric().len(), 2);

            let used =
                gauge_value(&report, "mesos_master_cpus", Some(("type", "cpu_used"))).unwrap();
            let free =
                gauge_value(&report, "mesos_master_cpus", Some(("type", "cpu_free"))).unwrap();
            assert_eq!(free + used, 10.0 * used);
            seen.push(used as usize);
        }

        seen.sort_unstable();
        assert_eq!(seen, (1..=PASSES).collect::<Vec<_>>());
        assert_eq!(source.fetches(), PASSES);
        assert_eq!(set.error_count(), 0);
    }

    #[test]
    fn test_missing_key_after_bad_arity_is_skipped_not_counted() {
        let set = DefinitionSet::builder("master", "mesos", Arc::new(MockSource::new()))
            .define(
                BufferedMetric::gauge("mesos", "master", "cpus", "CPU resources.", &["type"]),
                |s: &Snapshot, _: &PassContext, out: &mut Stage<'_>| {
                    out.set(1.0, &["cpu_used", "extra"]);
                    out.set(s.get("master/cpus_total")?, &["cpu_free"]);
                    Ok(())
                },
            )
            .build()
            .unwrap();

        let report = set.collect_from(&Snapshot::default());
        assert!(report.family("mesos_master_cpus").is_none());
        assert_eq!(
            report.skipped,
            vec![SkippedMetric {
                metric: "mesos_master_cpus".to_string(),
                key: "master/cpus_total".to_string(),
            }]
        );
        assert_eq!(set.error_count(), 0);
        assert_eq!(counter_value(&report, ERRORS), 0.0);
    }

    #[test]
    fn test_wrong_arity_counts_internal_error() {
        let set = DefinitionSet::builder("master", "mesos", Arc::new(MockSource::new()))
            .define(
                BufferedMetric::gauge("mesos", "master", "cpus", "CPU resources.", &["type"]),
                |_: &Snapshot, _: &PassContext, out: &mut Stage<'_>| {
                    out.set(1.0, &["cpu_used", "extra"]);
                    Ok(())
                },
            )
            .build()
            .unwrap();

        let report = set.collect_from(&Snapshot::default());
        assert!(report.family("mesos_master_cpus").is_none());
        assert_eq!(set.error_count(), 1);
    }

    #[test]
    fn test_encode_renders_text_format() {
        let set = master_set(Arc::new(MockSource::new()));
        let report = set.collect_from(&snapshot(&[
            ("master/cpus_total", 8.0),
            ("master/cpus_used", 3.0),
        ]));
        let text = report.encode().unwrap();
        assert!(text.contains("# TYPE mesos_master_cpus gauge"));
        assert!(text.contains(r#"mesos_master_cpus{type="cpu_used"} 3"#));
        assert!(text.contains(r#"mesos_master_cpus{type="cpu_free"} 5"#));
        assert!(text.contains("mesos_collector_errors_total 0"));
    }

    proptest! {
        #[test]
        fn prop_same_snapshot_same_output(
            total in 0.0f64..1e6,
            used in 0.0f64..1e6,
            uptime in 0.0f64..1e9,
            elected in prop::bool::ANY,
        ) {
            let set = master_set(Arc::new(MockSource::new()));
            let input = snapshot(&[
                ("master/elected", if elected { 1.0 } else { 0.0 }),
                ("master/cpus_total", total),
                ("master/cpus_used", used),
                ("master/uptime_secs", uptime),
            ]);

            let first = set.collect_from(&input).encode().unwrap();
            let second = set.collect_from(&input).encode().unwrap();
            prop_assert_eq!(first, second);
        }
    }
}
