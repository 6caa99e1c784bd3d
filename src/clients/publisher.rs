use std::sync::Arc;

use async_trait::async_trait;
use lapin::{BasicProperties, options::BasicPublishOptions};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::{
    clients::{
        error::MessagingError,
        rbmq::{
            BrokerConnection, BrokerRole, EVENTS_EXCHANGE, PERSISTENT_DELIVERY_MODE, confirmed,
            declare_exchange, enable_confirms,
        },
    },
    metrics::{MetricsSink, NoopMetrics},
    models::{
        event::{EventEnvelope, JSON_CONTENT_TYPE},
        status::Outcome,
    },
    usecases::ports::EventPublisher,
};

pub struct RabbitMqPublisher {
    broker: BrokerConnection,
    metrics: Arc<dyn MetricsSink>,
}

impl RabbitMqPublisher {
    pub async fn initialize(url: &str) -> Result<Self, MessagingError> {
        Self::initialize_with_metrics(url, Arc::new(NoopMetrics)).await
    }

    pub async fn initialize_with_metrics(
        url: &str,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self, MessagingError> {
        let broker = BrokerConnection::open(url, BrokerRole::Publisher, |channel| async move {
            enable_confirms(&channel).await?;
            declare_exchange(&channel).await
        })
        .await?;

        info!(exchange = EVENTS_EXCHANGE, "RabbitMQ publisher initialized");

        Ok(Self { broker, metrics })
    }

    /// Serializes `payload` and publishes it under `event_type`.
    pub async fn publish<T>(&self, event_type: &str, payload: &T) -> Result<(), MessagingError>
    where
        T: Serialize + ?Sized,
    {
        let envelope = EventEnvelope::new(event_type, payload).map_err(|e| {
            error!(event_type, error = %e, "Failed to marshal event payload");
            self.metrics.event_published(event_type, Outcome::Failure);
            MessagingError::Serialization(e)
        })?;

        self.publish_envelope(&envelope).await
    }

    pub async fn publish_envelope(&self, envelope: &EventEnvelope) -> Result<(), MessagingError> {
        let result = self.send(envelope).await;

        match &result {
            Ok(size) => {
                debug!(event_type = %envelope.event_type, size, "Event published successfully");
            }
            Err(e) => {
                error!(event_type = %envelope.event_type, error = %e, "Failed to publish event");
            }
        }
        self.metrics
            .event_published(&envelope.event_type, Outcome::of(&result));

        result.map(|_| ())
    }

    async fn send(&self, envelope: &EventEnvelope) -> Result<usize, MessagingError> {
        let body = envelope.body();

        let confirmation = self
            .broker
            .channel()
            .basic_publish(
                EVENTS_EXCHANGE,
                envelope.routing_key(),
                BasicPublishOptions {
                    mandatory: false,
                    immediate: false,
                },
                body,
                message_properties(envelope),
            )
            .await
            .map_err(|source| MessagingError::Publish {
                event_type: envelope.event_type.clone(),
                source,
            })?
            .await
            .map_err(|source| MessagingError::Publish {
                event_type: envelope.event_type.clone(),
                source,
            })?;
        confirmed(&envelope.event_type, confirmation)?;

        Ok(body.len())
    }

    pub fn is_connected(&self) -> bool {
        self.broker.is_connected()
    }

    pub async fn close(&self) -> Result<(), MessagingError> {
        self.broker.close().await?;
        info!("RabbitMQ publisher closed");
        Ok(())
    }
}

pub fn message_properties(envelope: &EventEnvelope) -> BasicProperties {
    BasicProperties::default()
        .with_content_type(JSON_CONTENT_TYPE.into())
        .with_delivery_mode(PERSISTENT_DELIVERY_MODE)
        .with_timestamp(envelope.unix_timestamp())
}

#[async_trait]
impl EventPublisher for RabbitMqPublisher {
    async fn publish_event(&self, envelope: EventEnvelope) -> Result<(), MessagingError> {
        self.publish_envelope(&envelope).await
    }
}
