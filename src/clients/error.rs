use thiserror::Error;

#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("failed to connect to RabbitMQ: {0}")]
    Connection(#[source] lapin::Error),

    #[error("failed to open channel: {0}")]
    Channel(#[source] lapin::Error),

    #[error("failed to {step}: {source}")]
    Setup {
        step: &'static str,
        #[source]
        source: lapin::Error,
    },

    #[error("failed to marshal payload: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to publish event {event_type}: {source}")]
    Publish {
        event_type: String,
        #[source]
        source: lapin::Error,
    },

    #[error("broker rejected event {event_type}")]
    Nacked { event_type: String },

    #[error("failed to start consuming: {0}")]
    Consume(#[source] lapin::Error),

    #[error("message channel closed")]
    ChannelClosed,

    #[error("failed to close RabbitMQ connection: {0}")]
    Close(#[source] lapin::Error),
}

impl MessagingError {
    pub fn is_setup(&self) -> bool {
        matches!(
            self,
            MessagingError::Connection(_) | MessagingError::Channel(_) | MessagingError::Setup { .. }
        )
    }
}
