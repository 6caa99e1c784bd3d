use std::{
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
    time::Instant,
};

use futures_util::StreamExt;
use lapin::{
    BasicProperties,
    message::Delivery,
    options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions},
    types::{AMQPValue, FieldTable},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    clients::{
        error::MessagingError,
        rbmq::{
            BrokerConnection, BrokerRole, PERSISTENT_DELIVERY_MODE, bind_queue, confirmed,
            declare_durable_queue, declare_exchange, enable_confirms,
        },
    },
    dispatch::{Disposition, EventHandler, HandlerRegistry, InboundMessage, RedeliveryPolicy, dispatch},
    metrics::{MetricsSink, NoopMetrics},
    models::{
        event::JSON_CONTENT_TYPE,
        message::DeadLetterMessage,
        status::{ConsumerState, DeliveryOutcome, Outcome},
    },
};

pub const DEFAULT_PREFETCH_COUNT: u16 = 10;

pub const DELIVERY_ATTEMPT_HEADER: &str = "x-delivery-attempt";
pub const ORIGINAL_ROUTING_KEY_HEADER: &str = "x-original-routing-key";

#[derive(Debug, Clone)]
pub struct ConsumerOptions {
    pub prefetch_count: u16,
    pub consumer_tag: String,
    pub redelivery: RedeliveryPolicy,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self {
            prefetch_count: DEFAULT_PREFETCH_COUNT,
            // Empty tag lets the broker generate one.
            consumer_tag: String::new(),
            redelivery: RedeliveryPolicy::Requeue,
        }
    }
}

pub struct RabbitMqConsumer {
    broker: BrokerConnection,
    queue_name: String,
    handlers: HandlerRegistry,
    options: ConsumerOptions,
    state: AtomicU8,
    metrics: Arc<dyn MetricsSink>,
}

impl RabbitMqConsumer {
    pub async fn initialize(
        url: &str,
        queue_name: &str,
        routing_keys: &[String],
    ) -> Result<Self, MessagingError> {
        Self::initialize_with(url, queue_name, routing_keys, ConsumerOptions::default()).await
    }

    pub async fn initialize_with(
        url: &str,
        queue_name: &str,
        routing_keys: &[String],
        options: ConsumerOptions,
    ) -> Result<Self, MessagingError> {
        let queue = queue_name.to_string();
        let patterns = routing_keys.to_vec();
        let dead_letter_queue = match &options.redelivery {
            RedeliveryPolicy::DeadLetter { queue, .. } => Some(queue.clone()),
            RedeliveryPolicy::Requeue => None,
        };

        let broker = BrokerConnection::open(url, BrokerRole::Consumer, |channel| async move {
            enable_confirms(&channel).await?;
            declare_exchange(&channel).await?;
            declare_durable_queue(&channel, &queue).await?;
            for pattern in &patterns {
                bind_queue(&channel, &queue, pattern).await?;
            }
            if let Some(dead_letter_queue) = dead_letter_queue {
                declare_durable_queue(&channel, &dead_letter_queue).await?;
            }
            Ok(())
        })
        .await?;

        info!(
            queue = queue_name,
            routing_keys = ?routing_keys,
            "RabbitMQ consumer initialized"
        );

        Ok(Self {
            broker,
            queue_name: queue_name.to_string(),
            handlers: HandlerRegistry::new(),
            options,
            state: AtomicU8::new(ConsumerState::Initialized.as_u8()),
            metrics: Arc::new(NoopMetrics),
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Registration needs `&mut self` while [`start`](Self::start) holds
    /// `&self` for the whole loop, so the map cannot change under a running
    /// consumer.
    pub fn register_handler<H>(&mut self, event_type: impl Into<String>, handler: H)
    where
        H: EventHandler + 'static,
    {
        let event_type = event_type.into();
        if self.handlers.register(event_type.clone(), handler) {
            debug!(event_type = %event_type, "Event handler replaced");
        } else {
            debug!(event_type = %event_type, "Event handler registered");
        }
    }

    pub fn state(&self) -> ConsumerState {
        ConsumerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_connected(&self) -> bool {
        self.broker.is_connected()
    }

    fn set_state(&self, next: ConsumerState) {
        // Closed is terminal.
        let _ = self
            .state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (current != ConsumerState::Closed.as_u8()).then_some(next.as_u8())
            });
    }

    /// Runs the receive loop until `cancel` fires (`Ok`) or the broker closes
    /// the delivery stream (`Err(ChannelClosed)`).
    ///
    /// Deliveries are handled one at a time; cancellation is only observed
    /// between deliveries, never in the middle of a handler.
    pub async fn start(&self, cancel: CancellationToken) -> Result<(), MessagingError> {
        let channel = self.broker.channel();

        channel
            .basic_qos(self.options.prefetch_count, BasicQosOptions { global: false })
            .await
            .map_err(|source| MessagingError::Setup {
                step: "set QoS",
                source,
            })?;

        let mut deliveries = channel
            .basic_consume(
                &self.queue_name,
                &self.options.consumer_tag,
                BasicConsumeOptions {
                    no_local: false,
                    no_ack: false,
                    exclusive: false,
                    nowait: false,
                },
                FieldTable::default(),
            )
            .await
            .map_err(MessagingError::Consume)?;

        self.set_state(ConsumerState::Consuming);
        info!(
            queue = %self.queue_name,
            prefetch_count = self.options.prefetch_count,
            handlers = ?self.handlers.event_types(),
            "Started consuming messages"
        );

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!(queue = %self.queue_name, "Consumer stopped by cancellation");
                    self.set_state(ConsumerState::Cancelled);
                    return Ok(());
                }
                next = deliveries.next() => match next {
                    Some(Ok(delivery)) => self.handle_delivery(delivery).await,
                    Some(Err(e)) => {
                        warn!(queue = %self.queue_name, error = %e, "Delivery stream failed");
                        self.set_state(ConsumerState::ChannelClosed);
                        return Err(MessagingError::ChannelClosed);
                    }
                    None => {
                        warn!(queue = %self.queue_name, "Message channel closed");
                        self.set_state(ConsumerState::ChannelClosed);
                        return Err(MessagingError::ChannelClosed);
                    }
                }
            }
        }
    }

    async fn handle_delivery(&self, delivery: Delivery) {
        let headers = delivery.properties.headers().as_ref();
        let event_type = resolve_event_type(delivery.exchange.as_str(), delivery.routing_key.as_str(), headers);
        let attempt = delivery_attempt(headers);

        debug!(
            event_type = %event_type,
            size = delivery.data.len(),
            attempt,
            redelivered = delivery.redelivered,
            "Received message"
        );

        let started = Instant::now();
        let disposition = dispatch(
            &self.handlers,
            &self.options.redelivery,
            InboundMessage {
                event_type: &event_type,
                payload: &delivery.data,
                attempt,
            },
        )
        .await;

        let handler_outcome = if disposition == Disposition::Ack {
            Outcome::Success
        } else {
            Outcome::Failure
        };
        self.metrics
            .operation("handle_event", handler_outcome, started.elapsed());

        let outcome = self.settle(&delivery, &event_type, disposition).await;
        self.metrics.event_consumed(&event_type, outcome);
    }

    async fn settle(&self, delivery: &Delivery, event_type: &str, disposition: Disposition) -> DeliveryOutcome {
        match disposition {
            Disposition::Ack => {
                self.acknowledge(delivery.delivery_tag).await;
                DeliveryOutcome::Acked
            }
            Disposition::Nack { requeue } => {
                self.reject(delivery.delivery_tag, requeue).await;
                if requeue {
                    DeliveryOutcome::Requeued
                } else {
                    DeliveryOutcome::Discarded
                }
            }
            Disposition::Retry { next_attempt, reason } => {
                warn!(event_type, next_attempt, reason = %reason, "Handler failed, scheduling retry");
                match self.republish_for_retry(delivery, event_type, next_attempt).await {
                    Ok(()) => {
                        self.acknowledge(delivery.delivery_tag).await;
                        DeliveryOutcome::Retried
                    }
                    Err(e) => {
                        error!(event_type, error = %e, "Failed to schedule retry, requeueing");
                        self.reject(delivery.delivery_tag, true).await;
                        DeliveryOutcome::Requeued
                    }
                }
            }
            Disposition::DeadLetter { attempts, reason } => {
                let message = DeadLetterMessage::new(event_type, &delivery.data, reason, attempts);
                match self.publish_to_dead_letter(&message).await {
                    Ok(()) => {
                        warn!(event_type, attempts, "Event moved to dead letter queue");
                        self.acknowledge(delivery.delivery_tag).await;
                        DeliveryOutcome::DeadLettered
                    }
                    Err(e) => {
                        error!(event_type, error = %e, "Failed to dead-letter event, requeueing");
                        self.reject(delivery.delivery_tag, true).await;
                        DeliveryOutcome::Requeued
                    }
                }
            }
        }
    }

    async fn acknowledge(&self, delivery_tag: u64) {
        if let Err(e) = self
            .broker
            .channel()
            .basic_ack(delivery_tag, BasicAckOptions { multiple: false })
            .await
        {
            error!(delivery_tag, error = %e, "Failed to acknowledge message");
        }
    }

    async fn reject(&self, delivery_tag: u64, requeue: bool) {
        if let Err(e) = self
            .broker
            .channel()
            .basic_nack(
                delivery_tag,
                BasicNackOptions {
                    multiple: false,
                    requeue,
                },
            )
            .await
        {
            error!(delivery_tag, requeue, error = %e, "Failed to reject message");
        }
    }

    /// Sends a copy straight back to this consumer's queue through the
    /// default exchange so other queues bound to the event type do not see
    /// it twice.
    async fn republish_for_retry(
        &self,
        delivery: &Delivery,
        event_type: &str,
        next_attempt: u32,
    ) -> Result<(), MessagingError> {
        let mut headers = delivery.properties.headers().clone().unwrap_or_default();
        headers.insert(DELIVERY_ATTEMPT_HEADER.into(), AMQPValue::LongUInt(next_attempt));
        headers.insert(
            ORIGINAL_ROUTING_KEY_HEADER.into(),
            AMQPValue::LongString(event_type.to_string().into()),
        );

        let properties = delivery
            .properties
            .clone()
            .with_delivery_mode(PERSISTENT_DELIVERY_MODE)
            .with_headers(headers);

        self.publish_direct(&self.queue_name, event_type, &delivery.data, properties)
            .await?;

        debug!(event_type, next_attempt, "Event scheduled for retry");
        Ok(())
    }

    async fn publish_to_dead_letter(&self, message: &DeadLetterMessage) -> Result<(), MessagingError> {
        let RedeliveryPolicy::DeadLetter { queue, .. } = &self.options.redelivery else {
            return Ok(());
        };

        let payload = serde_json::to_vec(message)?;
        let properties = BasicProperties::default()
            .with_content_type(JSON_CONTENT_TYPE.into())
            .with_delivery_mode(PERSISTENT_DELIVERY_MODE);

        self.publish_direct(queue, &message.event_type, &payload, properties)
            .await
    }

    async fn publish_direct(
        &self,
        queue: &str,
        event_type: &str,
        payload: &[u8],
        properties: BasicProperties,
    ) -> Result<(), MessagingError> {
        let confirmation = self
            .broker
            .channel()
            .basic_publish("", queue, BasicPublishOptions::default(), payload, properties)
            .await
            .map_err(|source| MessagingError::Publish {
                event_type: event_type.to_string(),
                source,
            })?
            .await
            .map_err(|source| MessagingError::Publish {
                event_type: event_type.to_string(),
                source,
            })?;

        confirmed(event_type, confirmation)
    }

    pub async fn close(&self) -> Result<(), MessagingError> {
        self.set_state(ConsumerState::Closed);
        self.broker.close().await?;
        info!(queue = %self.queue_name, "RabbitMQ consumer closed");
        Ok(())
    }
}

fn header<'a>(headers: Option<&'a FieldTable>, name: &str) -> Option<&'a AMQPValue> {
    headers?
        .inner()
        .iter()
        .find(|(key, _)| key.as_str() == name)
        .map(|(_, value)| value)
}

/// Deliveries count from 1. Only messages this consumer republished for a
/// retry carry the attempt header.
pub fn delivery_attempt(headers: Option<&FieldTable>) -> u32 {
    let attempt = match header(headers, DELIVERY_ATTEMPT_HEADER) {
        Some(AMQPValue::LongUInt(value)) => *value,
        Some(AMQPValue::LongInt(value)) => u32::try_from(*value).unwrap_or(1),
        Some(AMQPValue::LongLongInt(value)) => u32::try_from(*value).unwrap_or(1),
        _ => 1,
    };

    attempt.max(1)
}

/// The event type is the routing key, except for retry copies that came back
/// through the default exchange addressed to the queue itself.
pub fn resolve_event_type(exchange: &str, routing_key: &str, headers: Option<&FieldTable>) -> String {
    if exchange.is_empty() {
        match header(headers, ORIGINAL_ROUTING_KEY_HEADER) {
            Some(AMQPValue::LongString(value)) => {
                return String::from_utf8_lossy(value.as_bytes()).into_owned();
            }
            Some(AMQPValue::ShortString(value)) => return value.as_str().to_string(),
            _ => {}
        }
    }

    routing_key.to_string()
}
