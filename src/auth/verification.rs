//! Email verification
//!
//! Two paths complete verification of the same user record: a signed token
//! carried in an emailed link, and a 7-digit code entered alongside a carrier
//! token. Codes are single use and cleared once consumed.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;

use super::error::{AuthError, AuthResult};
use super::jwt::TokenCodec;
use super::within;
use crate::mail::{MailDispatcher, MailMessage};
use crate::models::User;
use crate::users::UserRepository;

/// Number of digits in a verification code
pub const CODE_LENGTH: usize = 7;

const VERIFIED_MESSAGE: &str = "your email has been verified successfully";

const LINK_PATH: &str = "/auth/verify-email";
const CODE_PATH: &str = "/auth/verify-code";

/// Generate a numeric verification code of exactly `CODE_LENGTH` digits
pub fn generate_code() -> String {
    rand::thread_rng()
        .gen_range(1_000_000..=9_999_999u32)
        .to_string()
}

/// True if `code` has the shape of a verification code
pub fn is_valid_code(code: &str) -> bool {
    code.len() == CODE_LENGTH && code.bytes().all(|b| b.is_ascii_digit())
}

/// Time-boxed email verification
#[derive(Clone)]
pub struct VerificationFlow {
    users: Arc<dyn UserRepository>,
    codec: TokenCodec,
    mailer: MailDispatcher,
    ttl: Duration,
    base_url: String,
    store_timeout: Duration,
}

impl VerificationFlow {
    pub fn new(
        users: Arc<dyn UserRepository>,
        codec: TokenCodec,
        mailer: MailDispatcher,
        ttl: Duration,
        base_url: String,
        store_timeout: Duration,
    ) -> Self {
        Self {
            users,
            codec,
            mailer,
            ttl,
            base_url: base_url.trim_end_matches('/').to_string(),
            store_timeout,
        }
    }

    fn link(&self, path: &str, user: &User) -> AuthResult<String> {
        let token = self.codec.issue(&user.id, self.ttl)?;
        Ok(format!("{}{}?token={}", self.base_url, path, token))
    }

    /// Store a fresh code with its absolute expiry
    async fn store_code(&self, user: &User) -> AuthResult<String> {
        let code = generate_code();
        let expires_at = Utc::now()
            + chrono::Duration::from_std(self.ttl)
                .map_err(|e| AuthError::Internal(format!("verification ttl: {}", e)))?;

        within(
            self.store_timeout,
            self.users.set_verification_code(&user.email, &code, expires_at),
        )
        .await?;
        Ok(code)
    }

    fn minutes(&self) -> u64 {
        (self.ttl.as_secs() / 60).max(1)
    }

    /// Email a verification link carrying a short-lived token
    pub fn send_link(&self, user: &User) -> AuthResult<()> {
        let link = self.link(LINK_PATH, user)?;

        self.mailer.dispatch(MailMessage {
            to: user.email.clone(),
            subject: "Verification Email".to_string(),
            body: format!(
                "Hello {},\n\nConfirm your email address by opening this link within {} minutes:\n{}\n",
                user.name.to_uppercase(),
                self.minutes(),
                link
            ),
        });

        tracing::info!(user_id = %user.id, "Verification link sent");
        Ok(())
    }

    /// Store a fresh code for the user and email it with its carrier link
    pub async fn send_code(&self, user: &User) -> AuthResult<()> {
        let code = self.store_code(user).await?;
        let link = self.link(CODE_PATH, user)?;

        self.mailer.dispatch(MailMessage {
            to: user.email.clone(),
            subject: "Verification Code".to_string(),
            body: format!(
                "Hello {},\n\nYour verification code is {}. It expires in {} minutes.\nEnter it at:\n{}\n",
                user.name.to_uppercase(),
                code,
                self.minutes(),
                link
            ),
        });

        tracing::info!(user_id = %user.id, "Verification code sent");
        Ok(())
    }

    /// Start both paths for a new account with a single email.
    ///
    /// If the code cannot be stored the link alone is sent.
    pub async fn send_welcome(&self, user: &User) -> AuthResult<()> {
        let code = match self.store_code(user).await {
            Ok(code) => code,
            Err(e) => {
                tracing::error!(user_id = %user.id, error = %e, "Failed to store verification code");
                return self.send_link(user);
            }
        };
        let link = self.link(LINK_PATH, user)?;
        let code_link = self.link(CODE_PATH, user)?;

        self.mailer.dispatch(MailMessage {
            to: user.email.clone(),
            subject: "Verification Email".to_string(),
            body: format!(
                "Hello {},\n\nConfirm your email address by opening this link within {} minutes:\n{}\n\nOr enter the code {} at:\n{}\n",
                user.name.to_uppercase(),
                self.minutes(),
                link,
                code,
                code_link
            ),
        });

        tracing::info!(user_id = %user.id, "Verification email sent");
        Ok(())
    }

    async fn load_unverified(&self, token: &str) -> AuthResult<User> {
        let user_id = self.codec.validate(token)?;
        let user = within(self.store_timeout, self.users.find_by_id(&user_id)).await?;

        if user.verified {
            return Err(AuthError::AlreadyVerified);
        }
        Ok(user)
    }

    /// Complete verification from an emailed link token
    pub async fn complete_link(&self, token: &str) -> AuthResult<&'static str> {
        let user = self.load_unverified(token).await?;

        within(self.store_timeout, self.users.set_verified(&user.email, true)).await?;

        tracing::info!(user_id = %user.id, "Email verified by link");
        Ok(VERIFIED_MESSAGE)
    }

    /// Complete verification from a carrier token and a numeric code
    pub async fn complete_code(&self, token: &str, code: &str) -> AuthResult<&'static str> {
        let user = self.load_unverified(token).await?;

        if !is_valid_code(code) || user.verification_code.as_deref() != Some(code) {
            tracing::warn!(user_id = %user.id, "Verification code mismatch");
            return Err(AuthError::InvalidCode);
        }

        if user.code_expires_at.map_or(true, |at| Utc::now() > at) {
            return Err(AuthError::CodeExpired);
        }

        let consumed = within(
            self.store_timeout,
            self.users.consume_verification_code(&user.email, code),
        )
        .await?;
        if !consumed {
            // Consumed or replaced between the read and the update
            return Err(AuthError::InvalidCode);
        }

        tracing::info!(user_id = %user.id, "Email verified by code");
        Ok(VERIFIED_MESSAGE)
    }
}
