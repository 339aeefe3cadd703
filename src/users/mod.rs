//! User directory
//!
//! Sole owner of user records. Emails are unique; the backend enforces it and
//! reports a violation as `AuthError::DuplicateEmail`.

mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::auth::AuthResult;
use crate::models::{NewUser, User};

pub use memory::MemoryUserRepository;
pub use postgres::PgUserRepository;

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a new, unverified user and return its identifier
    async fn create(&self, user: NewUser) -> AuthResult<String>;

    /// Find user by ID
    async fn find_by_id(&self, user_id: &str) -> AuthResult<User>;

    /// Find user by email
    async fn find_by_email(&self, email: &str) -> AuthResult<User>;

    /// Set the verified flag of the user owning `email`
    async fn set_verified(&self, email: &str, verified: bool) -> AuthResult<()>;

    /// Store a pending verification code and its expiry, replacing any previous one
    async fn set_verification_code(
        &self,
        email: &str,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> AuthResult<()>;

    /// Atomically mark the user verified and clear the code, but only while the
    /// stored code still equals `code`.
    ///
    /// Returns `false` when the code was already consumed or replaced.
    async fn consume_verification_code(&self, email: &str, code: &str) -> AuthResult<bool>;
}
