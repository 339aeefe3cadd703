//! Authentication routes

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::auth;
use crate::state::AppState;

/// Create authentication routes
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(auth::sign_up))
        .route("/auth/signin", post(auth::sign_in))
        .route("/auth/refresh", post(auth::refresh_token))
        .route("/auth/revoke", post(auth::revoke_token))
        .route("/auth/signout", post(auth::sign_out))
        .route("/auth/verify-email", get(auth::verify_email))
        .route("/auth/verify-code", post(auth::verify_code))
        .route("/auth/resend-verification", post(auth::resend_verification_email))
        .route("/auth/verification-code", post(auth::send_verification_code))
        .route("/auth/me", get(auth::get_current_user))
}
