//! Metrics collection for observability

use crate::context::engine::Trigger;
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec_with_registry, register_histogram_with_registry,
    register_int_counter_with_registry, register_int_gauge_with_registry, CounterVec, Encoder,
    Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Global metrics registry
pub static METRICS: Lazy<Arc<Metrics>> = Lazy::new(|| {
    Arc::new(Metrics::new().expect("Failed to initialize metrics"))
});

/// Metrics collector
pub struct Metrics {
    registry: Registry,

    /// Compactions by trigger and outcome
    pub compactions: CounterVec,
    pub summarization_duration: Histogram,
    pub usage_fraction: Histogram,
    pub model_limit_fallbacks: IntCounter,
    pub tracked_conversations: IntGauge,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let compactions = register_counter_vec_with_registry!(
            Opts::new("compactions_total", "Total compaction attempts"),
            &["trigger", "outcome"],
            registry
        )?;

        let summarization_duration = register_histogram_with_registry!(
            HistogramOpts::new(
                "summarization_duration_seconds",
                "Summarization completion call duration in seconds"
            )
            .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
            registry
        )?;

        let usage_fraction = register_histogram_with_registry!(
            HistogramOpts::new(
                "context_usage_fraction",
                "Prompt tokens as a fraction of the context window"
            )
            .buckets(vec![0.1, 0.25, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0]),
            registry
        )?;

        let model_limit_fallbacks = register_int_counter_with_registry!(
            Opts::new(
                "model_limit_fallbacks_total",
                "Context limit lookups resolved by fallback"
            ),
            registry
        )?;

        let tracked_conversations = register_int_gauge_with_registry!(
            Opts::new("tracked_conversations", "Conversations with recorded usage"),
            registry
        )?;

        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        Ok(Self {
            registry,
            compactions,
            summarization_duration,
            usage_fraction,
            model_limit_fallbacks,
            tracked_conversations,
        })
    }

    /// Get the metrics registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record a compaction attempt
    pub fn record_compaction(&self, trigger: Trigger, outcome: &str) {
        self.compactions
            .with_label_values(&[trigger.as_str(), outcome])
            .inc();
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        if encoder.encode(&metric_families, &mut buffer).is_err() {
            return String::new();
        }

        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initialization() {
        let metrics = Metrics::new();
        assert!(metrics.is_ok());
    }

    #[test]
    fn test_record_compaction_exported() {
        let metrics = Metrics::new().unwrap();
        metrics.record_compaction(Trigger::Auto, "success");
        metrics.record_compaction(Trigger::Manual, "failure");

        let text = metrics.export_prometheus();
        assert!(text.contains("compactions_total"));
        assert!(text.contains("trigger=\"auto\""));
    }
}
