use std::sync::Arc;

use uuid::Uuid;

use crate::{
    models::user::UserError,
    usecases::ports::{RepositoryError, UserRepository},
};

pub const PROTECTED_ADMIN_EMAIL: &str = "admin@example.com";

/// Rules that need the repository but belong to no single entity.
#[derive(Clone)]
pub struct UserService {
    repo: Arc<dyn UserRepository>,
}

impl UserService {
    pub fn new(repo: Arc<dyn UserRepository>) -> Self {
        Self { repo }
    }

    pub async fn is_email_unique(&self, email: &str) -> Result<bool, UserError> {
        match self.repo.get_by_email(email).await {
            Ok(_) => Ok(false),
            Err(RepositoryError::NotFound) => Ok(true),
            Err(e) => Err(UserError::Repository(e)),
        }
    }

    pub async fn can_user_be_deleted(&self, user_id: Uuid) -> Result<bool, UserError> {
        let user = self.repo.get_by_id(user_id).await?;

        Ok(user.email != PROTECTED_ADMIN_EMAIL)
    }
}
