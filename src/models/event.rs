use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

pub const USER_CREATED: &str = "user.created";
pub const USER_UPDATED: &str = "user.updated";
pub const USER_DELETED: &str = "user.deleted";

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// A domain event ready to be put on the bus.
///
/// The routing key is always the event type itself, never a pattern. Only
/// the serialized payload travels as the message body; the type and
/// timestamp ride in the routing key and message properties.
#[derive(Debug, Clone, PartialEq)]
pub struct EventEnvelope {
    pub event_type: String,
    body: Vec<u8>,
    pub timestamp: DateTime<Utc>,
}

impl EventEnvelope {
    /// Serializes straight to bytes, so anything `serde_json` can write is
    /// accepted.
    pub fn new<T>(event_type: impl Into<String>, payload: &T) -> Result<Self, serde_json::Error>
    where
        T: Serialize + ?Sized,
    {
        Ok(Self {
            event_type: event_type.into(),
            body: serde_json::to_vec(payload)?,
            timestamp: Utc::now(),
        })
    }

    pub fn routing_key(&self) -> &str {
        &self.event_type
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        decode_payload(&self.body)
    }

    pub fn unix_timestamp(&self) -> u64 {
        u64::try_from(self.timestamp.timestamp()).unwrap_or_default()
    }
}

pub fn decode_payload<T: DeserializeOwned>(body: &[u8]) -> Result<T, serde_json::Error> {
    serde_json::from_slice(body)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserCreatedEvent {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserUpdatedEvent {
    pub user_id: Uuid,
    pub name: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserDeletedEvent {
    pub user_id: Uuid,
    pub deleted_at: DateTime<Utc>,
}
