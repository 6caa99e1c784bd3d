use std::{
    future::Future,
    sync::atomic::{AtomicBool, Ordering},
};

use lapin::{
    Channel, Connection, ConnectionProperties, ExchangeKind,
    options::{ConfirmSelectOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions},
    publisher_confirm::Confirmation,
    types::FieldTable,
};
use tracing::{debug, info, warn};

use crate::clients::error::MessagingError;

pub const EVENTS_EXCHANGE: &str = "microservices.events";

pub const PERSISTENT_DELIVERY_MODE: u8 = 2;

const REPLY_SUCCESS: u16 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerRole {
    Publisher,
    Consumer,
}

impl BrokerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrokerRole::Publisher => "publisher",
            BrokerRole::Consumer => "consumer",
        }
    }
}

/// One connection and one channel, owned by a single publisher or consumer.
pub struct BrokerConnection {
    connection: Connection,
    channel: Channel,
    role: BrokerRole,
    closed: AtomicBool,
}

impl BrokerConnection {
    /// Dials the broker, opens a channel and runs `setup` against it.
    ///
    /// Whatever was acquired is released again if any step fails, so callers
    /// never see a half-initialised connection.
    pub async fn open<F, Fut>(url: &str, role: BrokerRole, setup: F) -> Result<Self, MessagingError>
    where
        F: FnOnce(Channel) -> Fut,
        Fut: Future<Output = Result<(), MessagingError>>,
    {
        info!(role = role.as_str(), "Connecting to RabbitMQ");

        let connection = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(MessagingError::Connection)?;

        let channel = match connection.create_channel().await {
            Ok(channel) => channel,
            Err(e) => {
                if let Err(close_err) = connection.close(REPLY_SUCCESS, "channel open failed").await {
                    warn!(role = role.as_str(), error = %close_err, "Failed to close RabbitMQ connection");
                }
                return Err(MessagingError::Channel(e));
            }
        };

        debug!(role = role.as_str(), "RabbitMQ channel created");

        let broker = Self {
            connection,
            channel,
            role,
            closed: AtomicBool::new(false),
        };

        if let Err(e) = setup(broker.channel.clone()).await {
            warn!(role = role.as_str(), error = %e, "RabbitMQ setup failed, releasing connection");
            if let Err(close_err) = broker.close().await {
                warn!(role = role.as_str(), error = %close_err, "Release after failed setup did not complete");
            }
            return Err(e);
        }

        Ok(broker)
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && self.connection.status().connected()
    }

    /// Closes the channel, then the connection. Calling it again is a no-op.
    pub async fn close(&self) -> Result<(), MessagingError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!(role = self.role.as_str(), "RabbitMQ connection already closed");
            return Ok(());
        }

        if let Err(e) = self.channel.close(REPLY_SUCCESS, "OK").await {
            warn!(role = self.role.as_str(), error = %e, "Failed to close RabbitMQ channel");
        }

        if let Err(e) = self.connection.close(REPLY_SUCCESS, "OK").await {
            warn!(role = self.role.as_str(), error = %e, "Failed to close RabbitMQ connection");
            return Err(MessagingError::Close(e));
        }

        info!(role = self.role.as_str(), "RabbitMQ connection closed");
        Ok(())
    }
}

/// Puts the channel into confirm mode so every publish is answered by the
/// broker with an ack or a nack.
pub async fn enable_confirms(channel: &Channel) -> Result<(), MessagingError> {
    channel
        .confirm_select(ConfirmSelectOptions { nowait: false })
        .await
        .map_err(|source| MessagingError::Setup {
            step: "enable publisher confirms",
            source,
        })
}

/// A broker nack means the message was not taken responsibility for.
pub fn confirmed(event_type: &str, confirmation: Confirmation) -> Result<(), MessagingError> {
    match confirmation {
        Confirmation::Nack(_) => Err(MessagingError::Nacked {
            event_type: event_type.to_string(),
        }),
        Confirmation::Ack(_) | Confirmation::NotRequested => Ok(()),
    }
}

/// Declares the shared topic exchange. Safe to repeat with the same
/// parameters; the broker rejects a redeclaration that disagrees.
pub async fn declare_exchange(channel: &Channel) -> Result<(), MessagingError> {
    channel
        .exchange_declare(
            EVENTS_EXCHANGE,
            ExchangeKind::Topic,
            ExchangeDeclareOptions {
                passive: false,
                durable: true,
                auto_delete: false,
                internal: false,
                nowait: false,
            },
            FieldTable::default(),
        )
        .await
        .map_err(|source| MessagingError::Setup {
            step: "declare exchange",
            source,
        })?;

    debug!(exchange = EVENTS_EXCHANGE, "Exchange declared");
    Ok(())
}

pub async fn declare_durable_queue(channel: &Channel, queue_name: &str) -> Result<(), MessagingError> {
    channel
        .queue_declare(
            queue_name,
            QueueDeclareOptions {
                passive: false,
                durable: true,
                exclusive: false,
                auto_delete: false,
                nowait: false,
            },
            FieldTable::default(),
        )
        .await
        .map_err(|source| MessagingError::Setup {
            step: "declare queue",
            source,
        })?;

    debug!(queue = queue_name, "Queue declared");
    Ok(())
}

pub async fn bind_queue(channel: &Channel, queue_name: &str, pattern: &str) -> Result<(), MessagingError> {
    channel
        .queue_bind(
            queue_name,
            EVENTS_EXCHANGE,
            pattern,
            QueueBindOptions { nowait: false },
            FieldTable::default(),
        )
        .await
        .map_err(|source| MessagingError::Setup {
            step: "bind queue",
            source,
        })?;

    debug!(queue = queue_name, routing_key = pattern, "Queue bound to exchange");
    Ok(())
}
