//! Event-type routing for the consumer.
//!
//! Handlers are looked up by the exact event type of a delivery, never by
//! pattern; patterns only exist in queue bindings. [`dispatch`] turns the
//! lookup and handler result into a [`Disposition`] without touching the
//! broker, and the consumer settles the delivery from that.

use std::{collections::HashMap, future::Future, sync::Arc};

use async_trait::async_trait;
use tracing::{debug, error, warn};

pub type HandlerResult = anyhow::Result<()>;

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event_type: &str, payload: &[u8]) -> HandlerResult;
}

/// Adapter that lets a plain async closure act as an [`EventHandler`].
pub struct FnHandler<F>(F);

pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(String, Vec<u8>) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send,
{
    FnHandler(f)
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(String, Vec<u8>) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send,
{
    async fn handle(&self, event_type: &str, payload: &[u8]) -> HandlerResult {
        (self.0)(event_type.to_string(), payload.to_vec()).await
    }
}

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn EventHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when an earlier handler for the same type was replaced.
    pub fn register<H>(&mut self, event_type: impl Into<String>, handler: H) -> bool
    where
        H: EventHandler + 'static,
    {
        self.register_shared(event_type, Arc::new(handler))
    }

    pub fn register_shared(
        &mut self,
        event_type: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) -> bool {
        self.handlers.insert(event_type.into(), handler).is_some()
    }

    pub fn get(&self, event_type: &str) -> Option<Arc<dyn EventHandler>> {
        self.handlers.get(event_type).cloned()
    }

    pub fn contains(&self, event_type: &str) -> bool {
        self.handlers.contains_key(event_type)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn event_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

/// What happens to a delivery whose handler failed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RedeliveryPolicy {
    /// Negative-acknowledge with requeue, every time, with no cap.
    #[default]
    Requeue,

    /// Retry through the consumer's own queue until `max_attempts` deliveries
    /// have failed, then park the message on `queue`.
    DeadLetter { max_attempts: u32, queue: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    Nack { requeue: bool },
    Retry { next_attempt: u32, reason: String },
    DeadLetter { attempts: u32, reason: String },
}

#[derive(Debug, Clone, Copy)]
pub struct InboundMessage<'a> {
    pub event_type: &'a str,
    pub payload: &'a [u8],
    pub attempt: u32,
}

pub async fn dispatch(
    registry: &HandlerRegistry,
    policy: &RedeliveryPolicy,
    message: InboundMessage<'_>,
) -> Disposition {
    let Some(handler) = registry.get(message.event_type) else {
        warn!(event_type = message.event_type, "No handler registered for event type");
        return Disposition::Nack { requeue: false };
    };

    match handler.handle(message.event_type, message.payload).await {
        Ok(()) => {
            debug!(event_type = message.event_type, "Event handled");
            Disposition::Ack
        }
        Err(e) => {
            error!(
                event_type = message.event_type,
                attempt = message.attempt,
                error = %e,
                "Failed to handle event"
            );
            on_failure(policy, message.attempt, e.to_string())
        }
    }
}

fn on_failure(policy: &RedeliveryPolicy, attempt: u32, reason: String) -> Disposition {
    match policy {
        RedeliveryPolicy::Requeue => Disposition::Nack { requeue: true },
        RedeliveryPolicy::DeadLetter { max_attempts, .. } if attempt >= *max_attempts => {
            Disposition::DeadLetter {
                attempts: attempt,
                reason,
            }
        }
        RedeliveryPolicy::DeadLetter { .. } => Disposition::Retry {
            next_attempt: attempt.saturating_add(1),
            reason,
        },
    }
}
