//! Prometheus metrics for the Quiver pipeline.
//!
//! This module is only compiled when the `metrics` feature is enabled.
//! Provides counters and histograms for execution observability.

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;

/// Label set for execution metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ExecutionLabels {
    /// The operation type: "validate" or "execute".
    pub operation: String,
}

/// Label set for rejection metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RejectionLabels {
    /// The rejection kind: "empty", "length", "blacklist", "wrap".
    pub reason: String,
}

/// Prometheus metrics for the Quiver pipeline.
pub struct PipelineMetrics {
    /// Total number of pipeline calls.
    pub executions_total: Family<ExecutionLabels, Counter>,
    /// Call duration in seconds.
    pub execution_duration_seconds: Family<ExecutionLabels, Histogram>,
    /// Total number of pre-flight rejections by reason.
    pub rejections_total: Family<RejectionLabels, Counter>,
    /// Total number of truncated result sets.
    pub truncations_total: Counter,
}

impl PipelineMetrics {
    /// Create a new `PipelineMetrics` and register all metrics with the
    /// given registry.
    pub fn new(registry: &mut Registry) -> Self {
        let executions_total = Family::default();
        registry.register(
            "quiver_executions_total",
            "Total pipeline calls",
            executions_total.clone(),
        );

        let execution_duration_seconds =
            Family::<ExecutionLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(
                    [0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0].into_iter(),
                )
            });
        registry.register(
            "quiver_execution_duration_seconds",
            "Pipeline call duration",
            execution_duration_seconds.clone(),
        );

        let rejections_total = Family::default();
        registry.register(
            "quiver_rejections_total",
            "Total pre-flight rejections by reason",
            rejections_total.clone(),
        );

        let truncations_total = Counter::default();
        registry.register(
            "quiver_truncations_total",
            "Total truncated result sets",
            truncations_total.clone(),
        );

        Self {
            executions_total,
            execution_duration_seconds,
            rejections_total,
            truncations_total,
        }
    }

    /// Record a completed call.
    pub fn record_execution(&self, operation: &str, duration_secs: f64) {
        let labels = ExecutionLabels {
            operation: operation.to_string(),
        };
        self.executions_total.get_or_create(&labels).inc();
        self.execution_duration_seconds
            .get_or_create(&labels)
            .observe(duration_secs);
    }

    /// Record a pre-flight rejection.
    pub fn record_rejection(&self, reason: &str) {
        self.rejections_total
            .get_or_create(&RejectionLabels {
                reason: reason.to_string(),
            })
            .inc();
    }

    /// Record a truncated result set.
    pub fn record_truncation(&self) {
        self.truncations_total.inc();
    }
}
