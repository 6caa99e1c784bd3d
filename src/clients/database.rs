use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use tokio_postgres::{Client, NoTls, Row, error::SqlState};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::{
    models::user::User,
    usecases::ports::{RepositoryError, UserRepository},
};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS users (
        id UUID PRIMARY KEY,
        email TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        password_hash TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
"#;

const USER_COLUMNS: &str = "id, email, name, password_hash, created_at, updated_at";

pub struct DatabaseClient {
    client: Client,
}

impl DatabaseClient {
    pub async fn connect(database_url: &str) -> Result<Self, Error> {
        info!("Connecting to PostgreSQL database");

        let (client, connection) = tokio_postgres::connect(database_url, NoTls)
            .await
            .map_err(|e| anyhow!("Failed to connect to database: {}", e))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "PostgreSQL connection terminated");
            }
        });

        info!("PostgreSQL connection established");

        Ok(Self { client })
    }

    pub async fn ensure_schema(&self) -> Result<(), Error> {
        self.client
            .batch_execute(SCHEMA)
            .await
            .map_err(|e| anyhow!("Failed to create users table: {}", e))?;

        debug!("Users table ready");
        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), Error> {
        self.client
            .query_one("SELECT 1", &[])
            .await
            .map_err(|e| anyhow!("Database health check failed: {}", e))?;

        Ok(())
    }
}

fn user_from_row(row: &Row) -> User {
    User {
        id: row.get("id"),
        email: row.get("email"),
        name: row.get("name"),
        password_hash: row.get("password_hash"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn storage_error(e: tokio_postgres::Error) -> RepositoryError {
    if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
        RepositoryError::Conflict
    } else {
        RepositoryError::Backend(e.to_string())
    }
}

#[async_trait]
impl UserRepository for DatabaseClient {
    async fn create(&self, user: &User) -> Result<(), RepositoryError> {
        self.client
            .execute(
                r#"
                INSERT INTO users (id, email, name, password_hash, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
                &[
                    &user.id,
                    &user.email,
                    &user.name,
                    &user.password_hash,
                    &user.created_at,
                    &user.updated_at,
                ],
            )
            .await
            .map_err(storage_error)?;

        debug!(user_id = %user.id, "User row inserted");
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<User, RepositoryError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");

        self.client
            .query_opt(query.as_str(), &[&id])
            .await
            .map_err(storage_error)?
            .map(|row| user_from_row(&row))
            .ok_or(RepositoryError::NotFound)
    }

    async fn get_by_email(&self, email: &str) -> Result<User, RepositoryError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");

        self.client
            .query_opt(query.as_str(), &[&email])
            .await
            .map_err(storage_error)?
            .map(|row| user_from_row(&row))
            .ok_or(RepositoryError::NotFound)
    }

    async fn update(&self, user: &User) -> Result<(), RepositoryError> {
        let updated = self
            .client
            .execute(
                "UPDATE users SET name = $2, updated_at = $3 WHERE id = $1",
                &[&user.id, &user.name, &user.updated_at],
            )
            .await
            .map_err(storage_error)?;

        if updated == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        let deleted = self
            .client
            .execute("DELETE FROM users WHERE id = $1", &[&id])
            .await
            .map_err(storage_error)?;

        if deleted == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<User>, RepositoryError> {
        let query = format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC LIMIT $1 OFFSET $2"
        );

        let rows = self
            .client
            .query(query.as_str(), &[&limit, &offset])
            .await
            .map_err(storage_error)?;

        Ok(rows.iter().map(user_from_row).collect())
    }
}
