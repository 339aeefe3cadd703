//! Application state shared across handlers

use std::sync::Arc;

use axum::extract::FromRef;

use crate::auth::AuthService;
use crate::db::Database;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub auth_service: Arc<AuthService>,
    /// Present when users live in PostgreSQL
    pub db: Option<Database>,
    /// Mark auth cookies `Secure`
    pub secure_cookies: bool,
}

impl AppState {
    pub fn new(auth_service: Arc<AuthService>, db: Option<Database>, secure_cookies: bool) -> Self {
        Self {
            auth_service,
            db,
            secure_cookies,
        }
    }
}

impl FromRef<AppState> for Arc<AuthService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.auth_service.clone()
    }
}
