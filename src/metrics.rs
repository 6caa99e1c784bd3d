use std::time::Duration;

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

use crate::models::status::{DeliveryOutcome, Outcome};

pub const METRICS_NAMESPACE: &str = "user_service";

const DURATION_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5];

/// Where the service reports what it did. Storage and export belong to the
/// implementation.
pub trait MetricsSink: Send + Sync {
    fn event_published(&self, event_type: &str, outcome: Outcome);

    fn event_consumed(&self, event_type: &str, outcome: DeliveryOutcome);

    fn operation(&self, operation: &str, outcome: Outcome, elapsed: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn event_published(&self, _event_type: &str, _outcome: Outcome) {}

    fn event_consumed(&self, _event_type: &str, _outcome: DeliveryOutcome) {}

    fn operation(&self, _operation: &str, _outcome: Outcome, _elapsed: Duration) {}
}

pub struct PrometheusMetrics {
    registry: Registry,
    events_published: IntCounterVec,
    events_consumed: IntCounterVec,
    operations: IntCounterVec,
    durations: HistogramVec,
}

impl PrometheusMetrics {
    pub fn new(namespace: &str) -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let events_published = IntCounterVec::new(
            Opts::new("events_published_total", "Total number of events published")
                .namespace(namespace),
            &["event_type", "status"],
        )?;
        let events_consumed = IntCounterVec::new(
            Opts::new("events_consumed_total", "Total number of events consumed")
                .namespace(namespace),
            &["event_type", "status"],
        )?;
        let operations = IntCounterVec::new(
            Opts::new("operations_total", "Total number of use case executions")
                .namespace(namespace),
            &["operation", "status"],
        )?;
        let durations = HistogramVec::new(
            HistogramOpts::new(
                "operation_duration_seconds",
                "Use case and handler latency in seconds",
            )
            .namespace(namespace)
            .buckets(DURATION_BUCKETS.to_vec()),
            &["operation"],
        )?;

        registry.register(Box::new(events_published.clone()))?;
        registry.register(Box::new(events_consumed.clone()))?;
        registry.register(Box::new(operations.clone()))?;
        registry.register(Box::new(durations.clone()))?;

        Ok(Self {
            registry,
            events_published,
            events_consumed,
            operations,
            durations,
        })
    }

    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;

        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl MetricsSink for PrometheusMetrics {
    fn event_published(&self, event_type: &str, outcome: Outcome) {
        self.events_published
            .with_label_values(&[event_type, outcome.as_str()])
            .inc();
    }

    fn event_consumed(&self, event_type: &str, outcome: DeliveryOutcome) {
        self.events_consumed
            .with_label_values(&[event_type, outcome.as_str()])
            .inc();
    }

    fn operation(&self, operation: &str, outcome: Outcome, elapsed: Duration) {
        self.operations
            .with_label_values(&[operation, outcome.as_str()])
            .inc();
        self.durations
            .with_label_values(&[operation])
            .observe(elapsed.as_secs_f64());
    }
}
