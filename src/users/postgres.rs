//! PostgreSQL user directory

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::UserRepository;
use crate::auth::{AuthError, AuthResult};
use crate::models::{NewUser, User};

/// `users` table backed directory
#[derive(Clone)]
pub struct PgUserRepository {
    db_pool: PgPool,
}

impl PgUserRepository {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

/// Map a driver error, treating the email unique index as authoritative
fn db_error(context: &str, e: sqlx::Error) -> AuthError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => AuthError::DuplicateEmail,
        _ => AuthError::BackendUnavailable(format!("{}: {}", context, e)),
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, user: NewUser) -> AuthResult<String> {
        let now = Utc::now();

        let id: String = sqlx::query_scalar(
            r#"
            INSERT INTO users (id, name, email, password_hash, verified, created_at, updated_at)
            VALUES ($1, $2, $3, $4, FALSE, $5, $6)
            RETURNING id
            "#,
        )
        .bind(&user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(now)
        .bind(now)
        .fetch_one(&self.db_pool)
        .await
        .map_err(|e| db_error("create user", e))?;

        Ok(id)
    }

    async fn find_by_id(&self, user_id: &str) -> AuthResult<User> {
        sqlx::query_as(
            r#"
            SELECT id, name, email, password_hash, verified, verification_code, code_expires_at, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.db_pool)
        .await
        .map_err(|e| db_error("find user by id", e))?
        .ok_or(AuthError::NotFound)
    }

    async fn find_by_email(&self, email: &str) -> AuthResult<User> {
        sqlx::query_as(
            r#"
            SELECT id, name, email, password_hash, verified, verification_code, code_expires_at, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db_pool)
        .await
        .map_err(|e| db_error("find user by email", e))?
        .ok_or(AuthError::NotFound)
    }

    async fn set_verified(&self, email: &str, verified: bool) -> AuthResult<()> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE users
            SET verified = $1, updated_at = NOW()
            WHERE email = $2
            "#,
        )
        .bind(verified)
        .bind(email)
        .execute(&self.db_pool)
        .await
        .map_err(|e| db_error("set verified", e))?
        .rows_affected();

        if rows_affected == 0 {
            return Err(AuthError::NotFound);
        }

        Ok(())
    }

    async fn set_verification_code(
        &self,
        email: &str,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> AuthResult<()> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE users
            SET verification_code = $1, code_expires_at = $2, updated_at = NOW()
            WHERE email = $3
            "#,
        )
        .bind(code)
        .bind(expires_at)
        .bind(email)
        .execute(&self.db_pool)
        .await
        .map_err(|e| db_error("set verification code", e))?
        .rows_affected();

        if rows_affected == 0 {
            return Err(AuthError::NotFound);
        }

        Ok(())
    }

    async fn consume_verification_code(&self, email: &str, code: &str) -> AuthResult<bool> {
        // A concurrent consumer loses the race on the WHERE clause
        let rows_affected = sqlx::query(
            r#"
            UPDATE users
            SET verified = TRUE, verification_code = NULL, code_expires_at = NULL, updated_at = NOW()
            WHERE email = $1 AND verification_code = $2
            "#,
        )
        .bind(email)
        .bind(code)
        .execute(&self.db_pool)
        .await
        .map_err(|e| db_error("consume verification code", e))?
        .rows_affected();

        Ok(rows_affected == 1)
    }
}
