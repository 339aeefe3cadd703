//! authgate server library
//!
//! Email/password authentication with revocable refresh-token sessions and
//! email verification, plus the axum HTTP layer that exposes it.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod mail;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod state;
pub mod store;
pub mod users;
