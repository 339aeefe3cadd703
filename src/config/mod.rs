//! Configuration management for authgate
//!
//! This module handles loading and validating configuration from environment variables,
//! with support for different environments (development, staging, production).

use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::auth::AuthSettings;
use crate::mail::MailConfig;

const DEV_JWT_SECRET: &str = "development-secret-change-in-production";

/// Upper bound for token and verification TTLs (ten years)
const MAX_TTL_SECONDS: u64 = 10 * 365 * 24 * 60 * 60;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid environment value: {0}")]
    InvalidValue(String),

    #[error("Invalid port number: {0}")]
    InvalidPort(String),
}

/// Application environment
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    /// Parse environment from string
    pub fn from_str(s: &str) -> Result<Self, ConfigError> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "prod" | "production" => Ok(Environment::Production),
            _ => Err(ConfigError::InvalidValue(format!(
                "Invalid environment: '{}'. Expected: dev, staging, or prod",
                s
            ))),
        }
    }

    /// Check if this is a production environment
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    /// Get the environment name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Current environment
    pub environment: Environment,

    /// Server port
    pub port: u16,

    /// Database connection URL; the in-memory user directory is used when absent
    pub database_url: Option<String>,

    /// Maximum database connections
    pub db_max_connections: u32,

    /// Log level (RUST_LOG)
    pub log_level: String,

    /// JWT secret for token signing
    pub jwt_secret: String,

    /// Access token TTL in seconds (default: 900 = 15 minutes)
    pub jwt_access_token_ttl_seconds: u64,

    /// Refresh token TTL in seconds (default: 604800 = 7 days)
    pub jwt_refresh_token_ttl_seconds: u64,

    /// Verification link and code TTL in seconds (default: 300 = 5 minutes)
    pub verification_ttl_seconds: u64,

    /// Deadline for a single store call
    pub store_timeout_ms: u64,

    pub bcrypt_cost: u32,

    /// Base URL used in emailed links
    pub app_base_url: String,

    pub mail_from: String,
    pub mail_workers: usize,
    pub mail_queue_capacity: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors)
        dotenvy::dotenv().ok();

        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = lookup("ENVIRONMENT")
            .map(|s| Environment::from_str(&s))
            .unwrap_or(Ok(Environment::Development))?;

        let port = lookup("PORT")
            .unwrap_or_else(|| "3001".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort("PORT must be a valid number".to_string()))?;

        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        let db_max_connections = parse_var(&lookup, "DB_MAX_CONNECTIONS", 5u32)?;

        let log_level = lookup("RUST_LOG").unwrap_or_else(|| "info".to_string());

        let jwt_secret = match lookup("JWT_SECRET").filter(|s| !s.is_empty()) {
            Some(secret) => secret,
            None if environment.is_production() => {
                return Err(ConfigError::MissingEnvVar("JWT_SECRET".to_string()))
            }
            None => DEV_JWT_SECRET.to_string(),
        };

        let jwt_access_token_ttl_seconds = parse_var(&lookup, "JWT_ACCESS_TOKEN_TTL_SECONDS", 900u64)?;
        let jwt_refresh_token_ttl_seconds =
            parse_var(&lookup, "JWT_REFRESH_TOKEN_TTL_SECONDS", 604_800u64)?;
        let verification_ttl_seconds = parse_var(&lookup, "VERIFICATION_TTL_SECONDS", 300u64)?;
        let store_timeout_ms = parse_var(&lookup, "STORE_TIMEOUT_MS", 5000u64)?;

        let bcrypt_cost = parse_var(&lookup, "BCRYPT_COST", 12u32)?;
        if !(4..=31).contains(&bcrypt_cost) {
            return Err(ConfigError::InvalidValue(format!(
                "BCRYPT_COST must be between 4 and 31, got {}",
                bcrypt_cost
            )));
        }

        for (name, value) in [
            ("JWT_ACCESS_TOKEN_TTL_SECONDS", jwt_access_token_ttl_seconds),
            ("JWT_REFRESH_TOKEN_TTL_SECONDS", jwt_refresh_token_ttl_seconds),
            ("VERIFICATION_TTL_SECONDS", verification_ttl_seconds),
            ("STORE_TIMEOUT_MS", store_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue(format!("{} must be positive", name)));
            }
        }

        for (name, value) in [
            ("JWT_ACCESS_TOKEN_TTL_SECONDS", jwt_access_token_ttl_seconds),
            ("JWT_REFRESH_TOKEN_TTL_SECONDS", jwt_refresh_token_ttl_seconds),
            ("VERIFICATION_TTL_SECONDS", verification_ttl_seconds),
        ] {
            if value > MAX_TTL_SECONDS {
                return Err(ConfigError::InvalidValue(format!(
                    "{} must be at most {}, got {}",
                    name, MAX_TTL_SECONDS, value
                )));
            }
        }

        let app_base_url =
            lookup("APP_BASE_URL").unwrap_or_else(|| format!("http://localhost:{}", port));
        let mail_from = lookup("MAIL_FROM").unwrap_or_else(|| "no-reply@localhost".to_string());
        let mail_workers = parse_var(&lookup, "MAIL_WORKERS", 4usize)?;
        let mail_queue_capacity = parse_var(&lookup, "MAIL_QUEUE_CAPACITY", 256usize)?;

        Ok(Config {
            environment,
            port,
            database_url,
            db_max_connections,
            log_level,
            jwt_secret,
            jwt_access_token_ttl_seconds,
            jwt_refresh_token_ttl_seconds,
            verification_ttl_seconds,
            store_timeout_ms,
            bcrypt_cost,
            app_base_url,
            mail_from,
            mail_workers,
            mail_queue_capacity,
        })
    }

    /// Orchestrator settings derived from this configuration
    pub fn auth_settings(&self) -> AuthSettings {
        AuthSettings {
            access_token_ttl: Duration::from_secs(self.jwt_access_token_ttl_seconds),
            refresh_token_ttl: Duration::from_secs(self.jwt_refresh_token_ttl_seconds),
            verification_ttl: Duration::from_secs(self.verification_ttl_seconds),
            store_timeout: Duration::from_millis(self.store_timeout_ms),
            bcrypt_cost: self.bcrypt_cost,
            base_url: self.app_base_url.clone(),
        }
    }

    pub fn mail_config(&self) -> MailConfig {
        MailConfig {
            workers: self.mail_workers,
            queue_capacity: self.mail_queue_capacity,
        }
    }

    /// Get database URL (useful for logging masked version)
    pub fn database_url_masked(&self) -> Option<String> {
        let url = self.database_url.as_ref()?;
        // Mask password in database URL for logging
        let authority_start = url.find("://").map(|pos| pos + 3).unwrap_or(0);
        if let Some(at_pos) = url[authority_start..].find('@').map(|pos| pos + authority_start) {
            if let Some(colon_pos) = url[authority_start..at_pos].rfind(':') {
                let prefix = &url[..authority_start + colon_pos + 1];
                let suffix = &url[at_pos..];
                return Some(format!("{}****{}", prefix, suffix));
            }
        }
        Some(url.clone())
    }
}

fn parse_var<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(format!("{} must be a valid number, got '{}'", name, raw))),
        None => Ok(default),
    }
}
