use std::{sync::Arc, time::Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    metrics::MetricsSink,
    models::{
        event::{
            EventEnvelope, USER_CREATED, USER_DELETED, USER_UPDATED, UserCreatedEvent,
            UserDeletedEvent, UserUpdatedEvent,
        },
        status::Outcome,
        user::{User, UserError},
    },
    usecases::{
        ports::{EventPublisher, PasswordHasher, UserRepository},
        service::UserService,
    },
};

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserInput {
    pub email: String,
    pub name: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateUserOutput {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateUserInput {
    pub user_id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserOutput {
    pub id: Uuid,
    pub email: String,
    pub name: String,
}

impl From<&User> for UserOutput {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
        }
    }
}

/// Publishes after a committed write. The outcome only reaches the logs; the
/// write result stands on its own.
async fn publish_best_effort<T: Serialize>(
    publisher: &dyn EventPublisher,
    event_type: &str,
    payload: &T,
) {
    let envelope = match EventEnvelope::new(event_type, payload) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(event_type, error = %e, "Failed to encode domain event");
            return;
        }
    };

    if let Err(e) = publisher.publish_event(envelope).await {
        warn!(event_type, error = %e, "Failed to publish domain event");
    }
}

pub struct CreateUserUseCase {
    repo: Arc<dyn UserRepository>,
    service: UserService,
    publisher: Arc<dyn EventPublisher>,
    hasher: Arc<dyn PasswordHasher>,
    metrics: Arc<dyn MetricsSink>,
}

impl CreateUserUseCase {
    pub fn new(
        repo: Arc<dyn UserRepository>,
        service: UserService,
        publisher: Arc<dyn EventPublisher>,
        hasher: Arc<dyn PasswordHasher>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            repo,
            service,
            publisher,
            hasher,
            metrics,
        }
    }

    pub async fn execute(&self, input: CreateUserInput) -> Result<CreateUserOutput, UserError> {
        let started = Instant::now();
        let result = self.create(input).await;
        self.metrics
            .operation("create_user", Outcome::of(&result), started.elapsed());
        result
    }

    async fn create(&self, input: CreateUserInput) -> Result<CreateUserOutput, UserError> {
        info!(email = %input.email, name = %input.name, "Creating new user");

        let is_unique = self.service.is_email_unique(&input.email).await.map_err(|e| {
            error!(error = %e, "Failed to check email uniqueness");
            e
        })?;
        if !is_unique {
            return Err(UserError::AlreadyExists);
        }

        let mut user = User::new(
            &input.email,
            &input.name,
            &input.password,
            self.hasher.as_ref(),
        )?;
        user.id = Uuid::new_v4();

        self.repo.create(&user).await.map_err(|e| {
            error!(error = %e, "Failed to create user in database");
            UserError::from(e)
        })?;

        let event = UserCreatedEvent {
            user_id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            created_at: user.created_at,
        };
        publish_best_effort(self.publisher.as_ref(), USER_CREATED, &event).await;

        info!(user_id = %user.id, "User created successfully");

        Ok(CreateUserOutput {
            user_id: user.id,
            email: user.email,
            name: user.name,
        })
    }
}

pub struct GetUserUseCase {
    repo: Arc<dyn UserRepository>,
    metrics: Arc<dyn MetricsSink>,
}

impl GetUserUseCase {
    pub fn new(repo: Arc<dyn UserRepository>, metrics: Arc<dyn MetricsSink>) -> Self {
        Self { repo, metrics }
    }

    pub async fn execute(&self, user_id: Uuid) -> Result<UserOutput, UserError> {
        let started = Instant::now();
        debug!(user_id = %user_id, "Getting user");

        let result = match self.repo.get_by_id(user_id).await {
            Ok(user) => Ok(UserOutput::from(&user)),
            Err(e) => {
                let e = UserError::from(e);
                if !matches!(e, UserError::NotFound) {
                    error!(error = %e, "Failed to get user from database");
                }
                Err(e)
            }
        };

        self.metrics
            .operation("get_user", Outcome::of(&result), started.elapsed());
        result
    }
}

/// Out-of-range paging values are clamped instead of rejected.
pub fn page_bounds(limit: i64, offset: i64) -> (i64, i64) {
    let limit = if limit <= 0 {
        DEFAULT_PAGE_SIZE
    } else {
        limit.min(MAX_PAGE_SIZE)
    };

    (limit, offset.max(0))
}

pub struct ListUsersUseCase {
    repo: Arc<dyn UserRepository>,
    metrics: Arc<dyn MetricsSink>,
}

impl ListUsersUseCase {
    pub fn new(repo: Arc<dyn UserRepository>, metrics: Arc<dyn MetricsSink>) -> Self {
        Self { repo, metrics }
    }

    pub async fn execute(&self, limit: i64, offset: i64) -> Result<Vec<UserOutput>, UserError> {
        let started = Instant::now();
        let (limit, offset) = page_bounds(limit, offset);

        let result = self
            .repo
            .list(limit, offset)
            .await
            .map(|users| users.iter().map(UserOutput::from).collect())
            .map_err(UserError::from);

        self.metrics
            .operation("list_users", Outcome::of(&result), started.elapsed());
        result
    }
}

pub struct UpdateUserUseCase {
    repo: Arc<dyn UserRepository>,
    publisher: Arc<dyn EventPublisher>,
    metrics: Arc<dyn MetricsSink>,
}

impl UpdateUserUseCase {
    pub fn new(
        repo: Arc<dyn UserRepository>,
        publisher: Arc<dyn EventPublisher>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            repo,
            publisher,
            metrics,
        }
    }

    pub async fn execute(&self, input: UpdateUserInput) -> Result<UserOutput, UserError> {
        let started = Instant::now();
        let result = self.update(input).await;
        self.metrics
            .operation("update_user", Outcome::of(&result), started.elapsed());
        result
    }

    async fn update(&self, input: UpdateUserInput) -> Result<UserOutput, UserError> {
        info!(user_id = %input.user_id, "Updating user profile");

        let mut user = self.repo.get_by_id(input.user_id).await?;
        user.update_profile(&input.name)?;

        self.repo.update(&user).await.map_err(|e| {
            error!(error = %e, user_id = %user.id, "Failed to update user in database");
            UserError::from(e)
        })?;

        let event = UserUpdatedEvent {
            user_id: user.id,
            name: user.name.clone(),
            updated_at: user.updated_at,
        };
        publish_best_effort(self.publisher.as_ref(), USER_UPDATED, &event).await;

        Ok(UserOutput::from(&user))
    }
}

pub struct DeleteUserUseCase {
    repo: Arc<dyn UserRepository>,
    service: UserService,
    publisher: Arc<dyn EventPublisher>,
    metrics: Arc<dyn MetricsSink>,
}

impl DeleteUserUseCase {
    pub fn new(
        repo: Arc<dyn UserRepository>,
        service: UserService,
        publisher: Arc<dyn EventPublisher>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            repo,
            service,
            publisher,
            metrics,
        }
    }

    pub async fn execute(&self, user_id: Uuid) -> Result<(), UserError> {
        let started = Instant::now();
        let result = self.delete(user_id).await;
        self.metrics
            .operation("delete_user", Outcome::of(&result), started.elapsed());
        result
    }

    async fn delete(&self, user_id: Uuid) -> Result<(), UserError> {
        info!(user_id = %user_id, "Deleting user");

        if !self.service.can_user_be_deleted(user_id).await? {
            return Err(UserError::CannotDelete(
                "admin user cannot be deleted".to_string(),
            ));
        }

        self.repo.delete(user_id).await.map_err(|e| {
            error!(error = %e, user_id = %user_id, "Failed to delete user from database");
            UserError::from(e)
        })?;

        let event = UserDeletedEvent {
            user_id,
            deleted_at: Utc::now(),
        };
        publish_best_effort(self.publisher.as_ref(), USER_DELETED, &event).await;

        Ok(())
    }
}
