use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::usecases::ports::{PasswordHasher, RepositoryError};

pub const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Debug, Error)]
pub enum UserError {
    #[error("invalid email address")]
    InvalidEmail,

    #[error("invalid name")]
    InvalidName,

    #[error("password must be at least 8 characters")]
    WeakPassword,

    #[error("user not found")]
    NotFound,

    #[error("user already exists")]
    AlreadyExists,

    #[error("user cannot be deleted: {0}")]
    CannotDelete(String),

    #[error("failed to hash password: {0}")]
    PasswordHash(String),

    #[error("storage failure: {0}")]
    Repository(#[source] RepositoryError),
}

impl From<RepositoryError> for UserError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::NotFound => UserError::NotFound,
            RepositoryError::Conflict => UserError::AlreadyExists,
            other => UserError::Repository(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,

    #[serde(skip_serializing, default)]
    pub password_hash: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Validates the input and hashes the password. The id is left nil; the
    /// caller assigns one before persisting.
    pub fn new(
        email: &str,
        name: &str,
        password: &str,
        hasher: &dyn PasswordHasher,
    ) -> Result<Self, UserError> {
        if email.trim().is_empty() {
            return Err(UserError::InvalidEmail);
        }
        if name.trim().is_empty() {
            return Err(UserError::InvalidName);
        }
        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(UserError::WeakPassword);
        }

        let password_hash = hasher
            .hash(password)
            .map_err(|e| UserError::PasswordHash(e.to_string()))?;

        let now = Utc::now();
        Ok(Self {
            id: Uuid::nil(),
            email: email.to_string(),
            name: name.to_string(),
            password_hash,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn check_password(&self, password: &str, hasher: &dyn PasswordHasher) -> bool {
        hasher.verify(password, &self.password_hash)
    }

    pub fn update_profile(&mut self, name: &str) -> Result<(), UserError> {
        if name.trim().is_empty() {
            return Err(UserError::InvalidName);
        }

        self.name = name.to_string();
        self.updated_at = Utc::now();
        Ok(())
    }
}
