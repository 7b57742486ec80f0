//! Prometheus metrics for reconcile, wait and upgrade cycles.

use std::time::Duration;

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;

use crate::error::ClupError;

/// Labels for reconcile metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ReconcileLabels {
    pub resource_type: String,
    pub result: String,
}

/// Labels for wait metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct WaitLabels {
    pub kind: String,
    pub result: String,
}

/// Labels for upgrade orchestration metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct UpgradeLabels {
    pub outcome: String,
}

/// All Prometheus metrics exported by the crate.
///
/// Registered into a caller-owned [`Registry`]; nothing is global.
pub struct Metrics {
    pub reconcile_total: Family<ReconcileLabels, Counter>,
    pub wait_duration_seconds: Family<WaitLabels, Histogram>,
    pub upgrade_orchestration_total: Family<UpgradeLabels, Counter>,
}

/// Buckets for waits (1s to 2h): cluster installs and deletions take tens of minutes.
const WAIT_DURATION_BUCKETS: &[f64] = &[
    1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 600.0, 1800.0, 3600.0, 7200.0,
];

impl Metrics {
    /// Create and register all metrics with the given registry.
    pub fn new(registry: &mut Registry) -> Self {
        let reconcile_total = Family::<ReconcileLabels, Counter>::default();
        registry.register(
            "clup_reconcile",
            "Total number of reconcile calls",
            reconcile_total.clone(),
        );

        let wait_duration_seconds = Family::<WaitLabels, Histogram>::new_with_constructor(|| {
            Histogram::new(WAIT_DURATION_BUCKETS.iter().copied())
        });
        registry.register(
            "clup_wait_duration_seconds",
            "Time spent waiting for a resource to converge in seconds",
            wait_duration_seconds.clone(),
        );

        let upgrade_orchestration_total = Family::<UpgradeLabels, Counter>::default();
        registry.register(
            "clup_upgrade_orchestration",
            "Total number of upgrade orchestration cycles by outcome",
            upgrade_orchestration_total.clone(),
        );

        Self {
            reconcile_total,
            wait_duration_seconds,
            upgrade_orchestration_total,
        }
    }

    pub fn record_reconcile(&self, resource_type: &str, result: &str) {
        self.reconcile_total
            .get_or_create(&ReconcileLabels {
                resource_type: resource_type.to_string(),
                result: result.to_string(),
            })
            .inc();
    }

    pub fn observe_wait(&self, kind: &str, result: &str, elapsed: Duration) {
        self.wait_duration_seconds
            .get_or_create(&WaitLabels {
                kind: kind.to_string(),
                result: result.to_string(),
            })
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_upgrade(&self, outcome: &str) {
        self.upgrade_orchestration_total
            .get_or_create(&UpgradeLabels {
                outcome: outcome.to_string(),
            })
            .inc();
    }
}

/// Metric label for the result of an operation.
pub fn result_label<T>(result: &Result<T, ClupError>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(e) => e.kind(),
    }
}

/// Encode the registry in the Prometheus text exposition format.
pub fn render(registry: &Registry) -> Result<String, std::fmt::Error> {
    let mut buffer = String::new();
    encode(&mut buffer, registry)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Registry, Metrics) {
        let mut registry = Registry::default();
        let metrics = Metrics::new(&mut registry);
        (registry, metrics)
    }

    #[test]
    fn test_record_reconcile() {
        let (registry, metrics) = setup();
        metrics.record_reconcile("machine_pool", "success");
        metrics.record_reconcile("machine_pool", "success");

        let output = render(&registry).unwrap();
        assert!(output.contains("clup_reconcile_total"));
        assert!(output.contains("resource_type=\"machine_pool\""));
        assert!(output.contains("} 2"));
    }

    #[test]
    fn test_observe_wait() {
        let (registry, metrics) = setup();
        metrics.observe_wait("deletion", "timeout", Duration::from_secs(90));

        let output = render(&registry).unwrap();
        assert!(output.contains("clup_wait_duration_seconds"));
        assert!(output.contains("kind=\"deletion\""));
        assert!(output.contains("result=\"timeout\""));
    }

    #[test]
    fn test_record_upgrade() {
        let (registry, metrics) = setup();
        metrics.record_upgrade("scheduled");
        let output = render(&registry).unwrap();
        assert!(output.contains("clup_upgrade_orchestration_total{outcome=\"scheduled\"} 1"));
    }

    #[test]
    fn test_result_label() {
        let ok: Result<(), ClupError> = Ok(());
        assert_eq!(result_label(&ok), "success");
        let err: Result<(), ClupError> = Err(ClupError::Cancelled("x".into()));
        assert_eq!(result_label(&err), "cancelled");
    }
}
