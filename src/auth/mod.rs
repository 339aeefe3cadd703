//! Authentication module
//!
//! Email/password authentication with revocable refresh-token sessions.
//! - bcrypt credential hashing
//! - HS256 JWT access, refresh and verification tokens, each under its own key
//! - Refresh-token sessions in a key-value backend
//! - Email-link and numeric-code verification

mod error;
mod jwt;
mod password;
mod service;
mod session_store;
mod verification;

use std::future::Future;
use std::time::Duration;

pub use error::{AuthError, AuthResult};
pub use jwt::{Claims, JwtError, TokenCodec, TokenPurpose};
pub use password::{PasswordError, PasswordHasher};
pub use service::{AuthService, AuthSettings, RefreshedToken, SignInTokens};
pub use session_store::{SessionRecord, SessionStore, SESSION_TYPE};
pub use verification::{generate_code, is_valid_code, VerificationFlow, CODE_LENGTH};

/// Run a store call under a deadline; an elapsed deadline reports `Cancelled`
pub(crate) async fn within<T, F>(deadline: Duration, call: F) -> AuthResult<T>
where
    F: Future<Output = AuthResult<T>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(deadline_ms = deadline.as_millis() as u64, "Store call timed out");
            Err(AuthError::Cancelled)
        }
    }
}
