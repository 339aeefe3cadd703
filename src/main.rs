//! authgate server
//!
//! Boots the authentication API: configuration, logging, user and session
//! backends, the mail worker pool and the HTTP router.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::signal;

use authgate_server::auth::AuthService;
use authgate_server::config::Config;
use authgate_server::db::{self, Database};
use authgate_server::mail::{self, LogTransport, MailDispatcher};
use authgate_server::routes;
use authgate_server::state::AppState;
use authgate_server::store::MemoryKvStore;
use authgate_server::users::{MemoryUserRepository, PgUserRepository, UserRepository};

const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!(environment = config.environment.as_str(), "Starting authgate server");

    // User directory
    let (users, database): (Arc<dyn UserRepository>, Option<Database>) =
        match config.database_url.as_deref() {
            Some(url) => {
                if let Some(masked) = config.database_url_masked() {
                    tracing::info!("Connecting to database at {}", masked);
                }
                let pool = db::create_pool(url, config.db_max_connections).await?;
                db::run_migrations(&pool).await?;
                (
                    Arc::new(PgUserRepository::new(pool.clone())),
                    Some(Database::new(pool)),
                )
            }
            None => {
                tracing::warn!("DATABASE_URL not set, users are kept in memory");
                (Arc::new(MemoryUserRepository::new()), None)
            }
        };

    // Session backend
    let sessions = MemoryKvStore::new();
    let purge_target = sessions.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            let purged = purge_target.purge_expired().await;
            if purged > 0 {
                tracing::debug!(purged, "Purged expired session keys");
            }
        }
    });

    // Mail workers
    let (mailer, failures) = MailDispatcher::spawn(
        Arc::new(LogTransport::new(config.mail_from.clone())),
        &config.mail_config(),
    );
    tokio::spawn(mail::log_failures(failures));

    let auth_service = Arc::new(AuthService::new(
        users,
        Arc::new(sessions),
        mailer,
        &config.jwt_secret,
        config.auth_settings(),
    ));

    let app_state = AppState::new(
        auth_service,
        database,
        config.environment.is_production(),
    );
    let app = routes::create_router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Server listening on {}", addr);
    tracing::info!("Health check at http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Serve with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
