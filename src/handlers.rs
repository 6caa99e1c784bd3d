use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::{error, info};

use crate::{
    clients::consumer::RabbitMqConsumer,
    dispatch::{EventHandler, HandlerResult},
    models::event::{
        USER_CREATED, USER_DELETED, USER_UPDATED, UserCreatedEvent, UserDeletedEvent,
        UserUpdatedEvent, decode_payload,
    },
};

/// Writes one audit line per user lifecycle event.
#[derive(Debug, Default, Clone, Copy)]
pub struct UserAuditHandler;

impl UserAuditHandler {
    fn decode<T: DeserializeOwned>(event_type: &str, payload: &[u8]) -> Option<T> {
        match decode_payload(payload) {
            Ok(event) => Some(event),
            Err(e) => {
                // Redelivery cannot fix a malformed body, so it is acked.
                error!(event_type, error = %e, "Dropping malformed event payload");
                None
            }
        }
    }
}

#[async_trait]
impl EventHandler for UserAuditHandler {
    async fn handle(&self, event_type: &str, payload: &[u8]) -> HandlerResult {
        match event_type {
            USER_CREATED => {
                if let Some(event) = Self::decode::<UserCreatedEvent>(event_type, payload) {
                    info!(
                        event_type,
                        user_id = %event.user_id,
                        email = %event.email,
                        created_at = %event.created_at,
                        "Audit: user created"
                    );
                }
            }
            USER_UPDATED => {
                if let Some(event) = Self::decode::<UserUpdatedEvent>(event_type, payload) {
                    info!(
                        event_type,
                        user_id = %event.user_id,
                        name = %event.name,
                        updated_at = %event.updated_at,
                        "Audit: user updated"
                    );
                }
            }
            USER_DELETED => {
                if let Some(event) = Self::decode::<UserDeletedEvent>(event_type, payload) {
                    info!(
                        event_type,
                        user_id = %event.user_id,
                        deleted_at = %event.deleted_at,
                        "Audit: user deleted"
                    );
                }
            }
            other => {
                anyhow::bail!("audit handler does not understand event type {other}");
            }
        }

        Ok(())
    }
}

pub fn register_user_handlers(consumer: &mut RabbitMqConsumer) {
    for event_type in [USER_CREATED, USER_UPDATED, USER_DELETED] {
        consumer.register_handler(event_type, UserAuditHandler);
    }
}
