//! In-memory user directory for tests and database-less development

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::UserRepository;
use crate::auth::{AuthError, AuthResult};
use crate::models::{NewUser, User};

#[derive(Default)]
struct Tables {
    users: HashMap<String, User>,
    /// email -> user id, the unique index
    by_email: HashMap<String, String>,
}

impl Tables {
    fn by_email_mut(&mut self, email: &str) -> AuthResult<&mut User> {
        let id = self.by_email.get(email).ok_or(AuthError::NotFound)?;
        self.users.get_mut(id).ok_or(AuthError::NotFound)
    }
}

/// Memory-backed `UserRepository`
#[derive(Clone, Default)]
pub struct MemoryUserRepository {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored users
    pub async fn len(&self) -> usize {
        self.tables.read().await.users.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn create(&self, user: NewUser) -> AuthResult<String> {
        let mut tables = self.tables.write().await;
        if tables.by_email.contains_key(&user.email) {
            return Err(AuthError::DuplicateEmail);
        }

        let id = user.id.clone();
        tables.by_email.insert(user.email.clone(), id.clone());
        tables.users.insert(id.clone(), user.into_pending(Utc::now()));

        Ok(id)
    }

    async fn find_by_id(&self, user_id: &str) -> AuthResult<User> {
        self.tables
            .read()
            .await
            .users
            .get(user_id)
            .cloned()
            .ok_or(AuthError::NotFound)
    }

    async fn find_by_email(&self, email: &str) -> AuthResult<User> {
        let tables = self.tables.read().await;
        tables
            .by_email
            .get(email)
            .and_then(|id| tables.users.get(id))
            .cloned()
            .ok_or(AuthError::NotFound)
    }

    async fn set_verified(&self, email: &str, verified: bool) -> AuthResult<()> {
        let mut tables = self.tables.write().await;
        let user = tables.by_email_mut(email)?;
        user.verified = verified;
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn set_verification_code(
        &self,
        email: &str,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> AuthResult<()> {
        let mut tables = self.tables.write().await;
        let user = tables.by_email_mut(email)?;
        user.verification_code = Some(code.to_string());
        user.code_expires_at = Some(expires_at);
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn consume_verification_code(&self, email: &str, code: &str) -> AuthResult<bool> {
        let mut tables = self.tables.write().await;
        let user = tables.by_email_mut(email)?;
        if user.verification_code.as_deref() != Some(code) {
            return Ok(false);
        }

        user.verified = true;
        user.verification_code = None;
        user.code_expires_at = None;
        user.updated_at = Utc::now();
        Ok(true)
    }
}
