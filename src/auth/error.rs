//! Authentication error taxonomy
//!
//! Every failure the auth core can report. Backend and signing details are kept
//! in the variant payload for logging only; `kind()` is what callers branch on.

use thiserror::Error;

/// Auth core errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("User not found")]
    NotFound,

    #[error("Email is already registered")]
    DuplicateEmail,

    #[error("Invalid email or password")]
    CredentialMismatch,

    #[error("User is not verified")]
    NotVerified,

    #[error("User is already verified")]
    AlreadyVerified,

    #[error("Invalid token")]
    TokenInvalid,

    #[error("Token expired")]
    TokenExpired,

    #[error("Verification code has expired")]
    CodeExpired,

    #[error("Invalid verification code")]
    InvalidCode,

    #[error("Session not found")]
    SessionNotFound,

    #[error("Session is blocked")]
    SessionBlocked,

    #[error("Session is already blocked")]
    SessionAlreadyBlocked,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Stable classification code
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::NotFound => "NOT_FOUND",
            AuthError::DuplicateEmail => "DUPLICATE_EMAIL",
            AuthError::CredentialMismatch => "CREDENTIAL_MISMATCH",
            AuthError::NotVerified => "NOT_VERIFIED",
            AuthError::AlreadyVerified => "ALREADY_VERIFIED",
            AuthError::TokenInvalid => "TOKEN_INVALID",
            AuthError::TokenExpired => "TOKEN_EXPIRED",
            AuthError::CodeExpired => "CODE_EXPIRED",
            AuthError::InvalidCode => "INVALID_CODE",
            AuthError::SessionNotFound => "SESSION_NOT_FOUND",
            AuthError::SessionBlocked => "SESSION_BLOCKED",
            AuthError::SessionAlreadyBlocked => "SESSION_ALREADY_BLOCKED",
            AuthError::Cancelled => "CANCELLED",
            AuthError::BackendUnavailable(_) => "BACKEND_UNAVAILABLE",
            AuthError::Validation(_) => "VALIDATION_ERROR",
            AuthError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// True for every token rejection, expired tokens included
    pub fn is_token_invalid(&self) -> bool {
        matches!(self, AuthError::TokenInvalid | AuthError::TokenExpired)
    }

    /// Message safe to show to an end user.
    ///
    /// Backend and internal failures collapse to their classification so driver
    /// or signing details never leave the process.
    pub fn public_message(&self) -> String {
        match self {
            AuthError::BackendUnavailable(_) => "Backend unavailable".to_string(),
            AuthError::Internal(_) => "Internal error".to_string(),
            other => other.to_string(),
        }
    }
}

/// Result type alias for the auth core
pub type AuthResult<T> = Result<T, AuthError>;
