//! Authentication HTTP handlers
//!
//! Thin JSON endpoints over `AuthService`.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::{header::SET_COOKIE, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use std::time::Duration;
use validator::Validate;

use super::AuthenticatedUser;
use crate::error::ApiError;
use crate::models::{
    EmailRequest, MessageResponse, RefreshTokenRequest, RefreshTokenResponse, SignInRequest,
    SignInResponse, SignUpRequest, SignUpResponse, TokenQuery, UserProfile,
    VerificationCodeRequest,
};
use crate::state::AppState;

/// Name of the cookie carrying the access token
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

fn expires_at(ttl: Duration) -> Result<DateTime<Utc>, ApiError> {
    chrono::Duration::from_std(ttl)
        .map(|ttl| Utc::now() + ttl)
        .map_err(|e| ApiError::InternalError(format!("token ttl out of range: {}", e)))
}

fn access_cookie(token: &str, max_age: Duration, secure: bool) -> Result<HeaderValue, ApiError> {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        ACCESS_TOKEN_COOKIE,
        token,
        max_age.as_secs()
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).map_err(|e| ApiError::InternalError(e.to_string()))
}

fn clear_access_cookie(secure: bool) -> HeaderValue {
    if secure {
        HeaderValue::from_static("access_token=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0; Secure")
    } else {
        HeaderValue::from_static("access_token=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
    }
}

/// POST /auth/signup - Register a new account
pub async fn sign_up(
    State(state): State<AppState>,
    payload: Result<Json<SignUpRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SignUpResponse>), ApiError> {
    let Json(req) = payload?;
    req.validate()?;

    let id = state
        .auth_service
        .sign_up(&req.name, &req.email, &req.password)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(SignUpResponse {
            id,
            message: "user created, check your email to verify your account".to_string(),
        }),
    ))
}

/// POST /auth/signin - Exchange credentials for tokens
pub async fn sign_in(
    State(state): State<AppState>,
    payload: Result<Json<SignInRequest>, JsonRejection>,
) -> Result<(HeaderMap, Json<SignInResponse>), ApiError> {
    let Json(req) = payload?;
    req.validate()?;

    let tokens = state.auth_service.sign_in(&req.email, &req.password).await?;

    let mut headers = HeaderMap::new();
    headers.insert(
        SET_COOKIE,
        access_cookie(&tokens.access_token, tokens.access_ttl, state.secure_cookies)?,
    );

    Ok((
        headers,
        Json(SignInResponse {
            expires_at: expires_at(tokens.access_ttl)?,
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
        }),
    ))
}

/// POST /auth/refresh - New access token from a refresh token
pub async fn refresh_token(
    State(state): State<AppState>,
    payload: Result<Json<RefreshTokenRequest>, JsonRejection>,
) -> Result<Json<RefreshTokenResponse>, ApiError> {
    let Json(req) = payload?;
    req.validate()?;

    let refreshed = state.auth_service.refresh_token(&req.refresh_token).await?;

    Ok(Json(RefreshTokenResponse {
        expires_at: expires_at(refreshed.access_ttl)?,
        access_token: refreshed.access_token,
    }))
}

/// POST /auth/revoke - Block the session behind a refresh token
pub async fn revoke_token(
    State(state): State<AppState>,
    payload: Result<Json<RefreshTokenRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(req) = payload?;
    req.validate()?;

    let message = state.auth_service.revoke_token(&req.refresh_token).await?;

    Ok(Json(MessageResponse::new(message)))
}

/// POST /auth/signout - Revoke and clear the access cookie
///
/// The cookie is cleared whether or not the revocation succeeds.
pub async fn sign_out(
    State(state): State<AppState>,
    payload: Result<Json<RefreshTokenRequest>, JsonRejection>,
) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, clear_access_cookie(state.secure_cookies));

    let req = match payload {
        Ok(Json(req)) => req,
        Err(e) => return (headers, ApiError::from(e)).into_response(),
    };
    if let Err(e) = req.validate() {
        return (headers, ApiError::from(e)).into_response();
    }

    match state.auth_service.sign_out(&req.refresh_token).await {
        Ok(message) => (headers, Json(MessageResponse::new(message))).into_response(),
        Err(e) => (headers, ApiError::from(e)).into_response(),
    }
}

/// GET /auth/verify-email?token= - Complete link verification
pub async fn verify_email(
    State(state): State<AppState>,
    query: Result<Query<TokenQuery>, QueryRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Query(query) = query?;
    let message = state.auth_service.verify_email(&query.token).await?;

    Ok(Json(MessageResponse::new(message)))
}

/// POST /auth/verify-code?token= - Complete code verification
pub async fn verify_code(
    State(state): State<AppState>,
    query: Result<Query<TokenQuery>, QueryRejection>,
    payload: Result<Json<VerificationCodeRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Query(query) = query?;
    let Json(req) = payload?;
    req.validate()?;

    let message = state
        .auth_service
        .verify_code(&query.token, &req.code)
        .await?;

    Ok(Json(MessageResponse::new(message)))
}

/// POST /auth/resend-verification - Send a fresh verification link
pub async fn resend_verification_email(
    State(state): State<AppState>,
    payload: Result<Json<EmailRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(req) = payload?;
    req.validate()?;

    let message = state
        .auth_service
        .resend_verification_email(&req.email)
        .await?;

    Ok(Json(MessageResponse::new(message)))
}

/// POST /auth/verification-code - Email a fresh verification code
pub async fn send_verification_code(
    State(state): State<AppState>,
    payload: Result<Json<EmailRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(req) = payload?;
    req.validate()?;

    let message = state.auth_service.send_verification_code(&req.email).await?;

    Ok(Json(MessageResponse::new(message)))
}

/// GET /auth/me - Get current authenticated user
pub async fn get_current_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<UserProfile>, ApiError> {
    let profile = state.auth_service.current_user(&user.user_id).await?;

    Ok(Json(profile))
}
