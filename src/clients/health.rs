use std::{collections::HashMap, sync::Arc, time::Instant};

use chrono::Utc;
use tracing::{debug, warn};

use crate::{
    clients::{consumer::RabbitMqConsumer, database::DatabaseClient, publisher::RabbitMqPublisher},
    models::{
        health::{HealthCheckResponse, HealthStatus, ServiceHealth},
        status::ConsumerState,
    },
};

pub const DATABASE_CHECK: &str = "database";
pub const PUBLISHER_CHECK: &str = "message_broker";
pub const CONSUMER_CHECK: &str = "event_consumer";

pub struct HealthChecker {
    database: Arc<DatabaseClient>,
    publisher: Arc<RabbitMqPublisher>,
    consumer: Option<Arc<RabbitMqConsumer>>,
}

impl HealthChecker {
    pub fn new(
        database: Arc<DatabaseClient>,
        publisher: Arc<RabbitMqPublisher>,
        consumer: Option<Arc<RabbitMqConsumer>>,
    ) -> Self {
        Self {
            database,
            publisher,
            consumer,
        }
    }

    pub async fn check_all(&self) -> HealthCheckResponse {
        let mut checks = HashMap::new();

        checks.insert(DATABASE_CHECK.to_string(), self.check_database().await);
        checks.insert(PUBLISHER_CHECK.to_string(), self.check_publisher());
        if let Some(consumer) = &self.consumer {
            checks.insert(CONSUMER_CHECK.to_string(), check_consumer(consumer));
        }

        HealthCheckResponse {
            status: determine_overall_status(&checks),
            timestamp: Utc::now(),
            checks,
        }
    }

    pub async fn check_database(&self) -> ServiceHealth {
        let start = Instant::now();

        match self.database.health_check().await {
            Ok(_) => {
                let elapsed = start.elapsed().as_millis() as u64;
                debug!(response_time_ms = elapsed, "Database health check passed");
                ServiceHealth::healthy(elapsed)
            }
            Err(e) => {
                warn!(error = %e, "Database health check failed");
                ServiceHealth::unhealthy(format!("Health check query failed: {}", e))
            }
        }
    }

    fn check_publisher(&self) -> ServiceHealth {
        if self.publisher.is_connected() {
            ServiceHealth::healthy(0)
        } else {
            warn!("RabbitMQ publisher connection is down");
            // Writes still commit without the broker; only notifications are lost.
            ServiceHealth::degraded("Publisher connection is down".to_string())
        }
    }
}

fn check_consumer(consumer: &RabbitMqConsumer) -> ServiceHealth {
    consumer_health(consumer.state(), consumer.is_connected())
}

/// A consumer whose loop has ended keeps the HTTP side up, so it shows here
/// as degraded even while its connection is still open.
pub fn consumer_health(state: ConsumerState, connected: bool) -> ServiceHealth {
    let health = match state {
        _ if !connected => ServiceHealth::degraded("Consumer connection is down".to_string()),
        ConsumerState::ChannelClosed | ConsumerState::Closed => {
            warn!(consumer_state = %state, "Event consumer is no longer receiving");
            ServiceHealth::degraded("Consumer stopped receiving events".to_string())
        }
        _ => ServiceHealth::healthy(0),
    };

    health.with_consumer_state(state.to_string())
}

/// The database is the only hard dependency; broker trouble degrades the
/// service but does not take it down.
pub fn determine_overall_status(checks: &HashMap<String, ServiceHealth>) -> HealthStatus {
    let critical_unhealthy = checks
        .get(DATABASE_CHECK)
        .is_some_and(|health| health.status == HealthStatus::Unhealthy);

    let has_unhealthy = checks
        .values()
        .any(|health| health.status == HealthStatus::Unhealthy);

    let has_degraded = checks
        .values()
        .any(|health| health.status == HealthStatus::Degraded);

    if critical_unhealthy {
        HealthStatus::Unhealthy
    } else if has_unhealthy || has_degraded {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}
