use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    clients::error::MessagingError,
    models::{event::EventEnvelope, user::User},
};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,

    #[error("record conflicts with an existing one")]
    Conflict,

    #[error("{0}")]
    Backend(String),
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: &User) -> Result<(), RepositoryError>;

    async fn get_by_id(&self, id: Uuid) -> Result<User, RepositoryError>;

    async fn get_by_email(&self, email: &str) -> Result<User, RepositoryError>;

    async fn update(&self, user: &User) -> Result<(), RepositoryError>;

    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError>;

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<User>, RepositoryError>;
}

/// Outbound side of the event bus as the use cases see it.
///
/// Implementations report every failure; whether a failure matters is the
/// caller's decision.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish_event(&self, envelope: EventEnvelope) -> Result<(), MessagingError>;
}

pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str) -> Result<String, anyhow::Error>;

    fn verify(&self, password: &str, hash: &str) -> bool;
}
