use std::time::Duration;

use anyhow::Result;

use user_service::{
    metrics::{METRICS_NAMESPACE, MetricsSink, PrometheusMetrics},
    models::status::{DeliveryOutcome, Outcome},
};

/// Test: Recorded events show up in the text exposition
#[test]
fn test_prometheus_render() -> Result<()> {
    let metrics = PrometheusMetrics::new(METRICS_NAMESPACE)?;

    metrics.event_published("user.created", Outcome::Success);
    metrics.event_published("user.created", Outcome::Failure);
    metrics.event_consumed("user.deleted", DeliveryOutcome::Requeued);
    metrics.operation("create_user", Outcome::Success, Duration::from_millis(12));

    let output = metrics.render()?;

    assert!(output.contains(
        r#"user_service_events_published_total{event_type="user.created",status="success"} 1"#
    ));
    assert!(output.contains(
        r#"user_service_events_published_total{event_type="user.created",status="failure"} 1"#
    ));
    assert!(output.contains(
        r#"user_service_events_consumed_total{event_type="user.deleted",status="requeued"} 1"#
    ));
    assert!(output.contains(
        r#"user_service_operations_total{operation="create_user",status="success"} 1"#
    ));
    assert!(output.contains(r#"user_service_operation_duration_seconds_count{operation="create_user"} 1"#));

    Ok(())
}

/// Test: Each instance owns its registry
#[test]
fn test_independent_registries() -> Result<()> {
    let first = PrometheusMetrics::new(METRICS_NAMESPACE)?;
    let second = PrometheusMetrics::new(METRICS_NAMESPACE)?;

    first.operation("get_user", Outcome::Failure, Duration::from_millis(1));

    assert!(first.render()?.contains("get_user"));
    assert!(!second.render()?.contains("get_user"));

    Ok(())
}
