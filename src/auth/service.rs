//! Authentication service
//!
//! Composes the credential hasher, token codec, session store, user directory
//! and verification flow into the sign-up / sign-in / refresh / revoke lifecycle.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use super::error::{AuthError, AuthResult};
use super::jwt::{JwtError, TokenCodec, TokenPurpose};
use super::password::{PasswordError, PasswordHasher};
use super::session_store::SessionStore;
use super::verification::VerificationFlow;
use super::within;
use crate::mail::MailDispatcher;
use crate::models::{NewUser, UserProfile};
use crate::store::KeyValueStore;
use crate::users::UserRepository;

const SESSION_ATTEMPTS: usize = 5;

impl From<JwtError> for AuthError {
    fn from(e: JwtError) -> Self {
        match e {
            JwtError::TokenExpired => AuthError::TokenExpired,
            JwtError::InvalidToken(_) => AuthError::TokenInvalid,
            JwtError::EncodingFailed(detail) => AuthError::Internal(detail),
        }
    }
}

impl From<PasswordError> for AuthError {
    fn from(e: PasswordError) -> Self {
        match e {
            PasswordError::Mismatch => AuthError::CredentialMismatch,
            other => AuthError::Internal(other.to_string()),
        }
    }
}

/// Tunables injected at construction
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub verification_ttl: Duration,
    /// Deadline applied to every store call
    pub store_timeout: Duration,
    pub bcrypt_cost: u32,
    /// Base of the links embedded in verification emails
    pub base_url: String,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            access_token_ttl: Duration::from_secs(15 * 60),
            refresh_token_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            verification_ttl: Duration::from_secs(5 * 60),
            store_timeout: Duration::from_secs(5),
            bcrypt_cost: bcrypt::DEFAULT_COST,
            base_url: "http://localhost:3001".to_string(),
        }
    }
}

/// Result of a successful sign-in
#[derive(Debug, Clone)]
pub struct SignInTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub access_ttl: Duration,
}

/// Result of a successful refresh
#[derive(Debug, Clone)]
pub struct RefreshedToken {
    pub access_token: String,
    pub access_ttl: Duration,
}

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserRepository>,
    sessions: SessionStore,
    access: TokenCodec,
    refresh: TokenCodec,
    hasher: PasswordHasher,
    verification: VerificationFlow,
    settings: AuthSettings,
}

impl AuthService {
    /// Create a new AuthService
    pub fn new(
        users: Arc<dyn UserRepository>,
        kv: Arc<dyn KeyValueStore>,
        mailer: MailDispatcher,
        jwt_secret: &str,
        settings: AuthSettings,
    ) -> Self {
        let verification = VerificationFlow::new(
            users.clone(),
            TokenCodec::new(jwt_secret, TokenPurpose::Verification),
            mailer,
            settings.verification_ttl,
            settings.base_url.clone(),
            settings.store_timeout,
        );

        Self {
            users,
            sessions: SessionStore::new(kv),
            access: TokenCodec::new(jwt_secret, TokenPurpose::Access),
            refresh: TokenCodec::new(jwt_secret, TokenPurpose::Refresh),
            hasher: PasswordHasher::new(settings.bcrypt_cost),
            verification,
            settings,
        }
    }

    /// Register a new user and send the verification email
    pub async fn sign_up(&self, name: &str, email: &str, password: &str) -> AuthResult<String> {
        let name = name.trim();
        let email = normalize_email(email);
        if name.is_empty() {
            return Err(AuthError::Validation("name is required".to_string()));
        }
        if !validator::validate_email(email.as_str()) {
            return Err(AuthError::Validation("email is invalid".to_string()));
        }
        if password.is_empty() {
            return Err(AuthError::Validation("password is required".to_string()));
        }

        // Fast path only; the unique index on email is authoritative
        match within(self.settings.store_timeout, self.users.find_by_email(&email)).await {
            Ok(_) => return Err(AuthError::DuplicateEmail),
            Err(AuthError::NotFound) => {}
            Err(e) => return Err(e),
        }

        let password_hash = self.hash_password(password).await?;
        let new_user = NewUser {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            email,
            password_hash,
        };
        let user_id = within(
            self.settings.store_timeout,
            self.users.create(new_user.clone()),
        )
        .await?;

        // The row exists from here on, so nothing below fails the request. A
        // failed send is recoverable by a resend
        let user = NewUser {
            id: user_id.clone(),
            ..new_user
        }
        .into_pending(Utc::now());
        if let Err(e) = self.verification.send_welcome(&user).await {
            tracing::error!(user_id = %user_id, error = %e, "Failed to issue verification link");
        }

        tracing::info!(user_id = %user_id, "User signed up");
        Ok(user_id)
    }

    /// Authenticate with email and password and open a refresh-token session
    pub async fn sign_in(&self, email: &str, password: &str) -> AuthResult<SignInTokens> {
        let email = normalize_email(email);
        let user = within(self.settings.store_timeout, self.users.find_by_email(&email)).await?;

        if let Err(e) = self.verify_password(&user.password_hash, password).await {
            if matches!(e, AuthError::CredentialMismatch) {
                tracing::warn!(user_id = %user.id, "Sign-in rejected: wrong password");
            }
            return Err(e);
        }

        if !user.verified {
            return Err(AuthError::NotVerified);
        }

        let access_token = self.access.issue(&user.id, self.settings.access_token_ttl)?;
        let refresh_token = self.open_session(&user.id).await?;

        tracing::info!(user_id = %user.id, "User signed in");
        Ok(SignInTokens {
            access_token,
            refresh_token,
            access_ttl: self.settings.access_token_ttl,
        })
    }

    /// Exchange a live, unblocked refresh token for a new access token.
    ///
    /// The refresh token itself is not rotated.
    pub async fn refresh_token(&self, refresh_token: &str) -> AuthResult<RefreshedToken> {
        let user_id = self.refresh.validate(refresh_token)?;

        let session = within(
            self.settings.store_timeout,
            self.sessions.find(&user_id, refresh_token),
        )
        .await?
        .ok_or(AuthError::SessionNotFound)?;

        if session.blocked {
            tracing::warn!(user_id = %user_id, "Refresh rejected: session blocked");
            return Err(AuthError::SessionBlocked);
        }

        let access_token = self.access.issue(&user_id, self.settings.access_token_ttl)?;

        Ok(RefreshedToken {
            access_token,
            access_ttl: self.settings.access_token_ttl,
        })
    }

    /// Block the session behind a refresh token
    pub async fn revoke_token(&self, refresh_token: &str) -> AuthResult<&'static str> {
        let user_id = self.refresh.validate(refresh_token)?;

        let message = within(
            self.settings.store_timeout,
            self.sessions.block(&user_id, refresh_token),
        )
        .await?;

        tracing::info!(user_id = %user_id, "Refresh token revoked");
        Ok(message)
    }

    /// Sign out; server-side this is a revocation
    pub async fn sign_out(&self, refresh_token: &str) -> AuthResult<&'static str> {
        self.revoke_token(refresh_token).await
    }

    /// Remove the session behind a refresh token entirely
    pub async fn forget_session(&self, refresh_token: &str) -> AuthResult<()> {
        let user_id = self.refresh.validate(refresh_token)?;

        within(
            self.settings.store_timeout,
            self.sessions.delete(&user_id, refresh_token),
        )
        .await?;

        tracing::info!(user_id = %user_id, "Session deleted");
        Ok(())
    }

    /// Complete link verification
    pub async fn verify_email(&self, token: &str) -> AuthResult<&'static str> {
        self.verification.complete_link(token).await
    }

    /// Complete code verification
    pub async fn verify_code(&self, token: &str, code: &str) -> AuthResult<&'static str> {
        self.verification.complete_code(token, code).await
    }

    /// Send a fresh verification link to a pending user
    pub async fn resend_verification_email(&self, email: &str) -> AuthResult<&'static str> {
        let email = normalize_email(email);
        let user = within(self.settings.store_timeout, self.users.find_by_email(&email)).await?;
        if user.verified {
            return Err(AuthError::AlreadyVerified);
        }

        self.verification.send_link(&user)?;
        Ok("verification email sent")
    }

    /// Issue and email a numeric verification code to a pending user
    pub async fn send_verification_code(&self, email: &str) -> AuthResult<&'static str> {
        let email = normalize_email(email);
        let user = within(self.settings.store_timeout, self.users.find_by_email(&email)).await?;
        if user.verified {
            return Err(AuthError::AlreadyVerified);
        }

        self.verification.send_code(&user).await?;
        Ok("verification code sent")
    }

    /// Validate an access token and return its subject.
    ///
    /// Signature and expiry only; no session lookup. Refresh and verification
    /// tokens are signed under other keys and fail here.
    pub fn authenticate(&self, access_token: &str) -> AuthResult<String> {
        Ok(self.access.validate(access_token)?)
    }

    /// Profile of an existing user
    pub async fn current_user(&self, user_id: &str) -> AuthResult<UserProfile> {
        let user = within(self.settings.store_timeout, self.users.find_by_id(user_id)).await?;
        Ok(user.into())
    }

    /// Issue a refresh token and persist its session.
    ///
    /// Tokens are a pure function of subject and expiry second, so a sign-in
    /// right after a revocation can reproduce the blocked token. The horizon is
    /// then stretched by a second and the token reissued.
    async fn open_session(&self, user_id: &str) -> AuthResult<String> {
        let mut ttl = self.settings.refresh_token_ttl;

        for _ in 0..SESSION_ATTEMPTS {
            let token = self.refresh.issue(user_id, ttl)?;
            match within(
                self.settings.store_timeout,
                self.sessions.create(user_id, &token, ttl),
            )
            .await
            {
                Ok(_) => return Ok(token),
                Err(AuthError::SessionBlocked) => ttl = ttl.saturating_add(Duration::from_secs(1)),
                Err(e) => return Err(e),
            }
        }

        tracing::warn!(user_id = %user_id, "Could not open a session: every candidate token is blocked");
        Err(AuthError::SessionBlocked)
    }

    async fn hash_password(&self, password: &str) -> AuthResult<String> {
        let hasher = self.hasher;
        let password = password.to_string();

        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AuthError::Internal(format!("hashing task: {}", e)))?
            .map_err(AuthError::from)
    }

    async fn verify_password(&self, hash: &str, password: &str) -> AuthResult<()> {
        let hasher = self.hasher;
        let hash = hash.to_string();
        let password = password.to_string();

        tokio::task::spawn_blocking(move || hasher.verify(&hash, &password))
            .await
            .map_err(|e| AuthError::Internal(format!("verification task: {}", e)))?
            .map_err(AuthError::from)
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
