//! PostgreSQL user directory tests

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use sqlx::PgPool;
    use uuid::Uuid;

    use authgate_server::auth::AuthError;
    use authgate_server::db;
    use authgate_server::models::NewUser;
    use authgate_server::users::{PgUserRepository, UserRepository};

    /// Helper to create a migrated test database pool
    async fn setup_test_db() -> PgPool {
        let database_url = std::env::var("TEST_DATABASE_URL")
            .unwrap_or_else(|_| "postgresql://localhost/authgate_test".to_string());

        let pool = db::create_pool(&database_url, 1)
            .await
            .expect("Failed to connect to test database");
        db::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        pool
    }

    fn new_user() -> NewUser {
        let id = Uuid::new_v4().to_string();
        NewUser {
            email: format!("{}@example.com", id),
            id,
            name: "Ada".to_string(),
            password_hash: "$2b$04$placeholder".to_string(),
        }
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_unique_email_is_authoritative() {
        let repo = PgUserRepository::new(setup_test_db().await);
        let user = new_user();
        repo.create(user.clone()).await.unwrap();

        let clash = NewUser {
            id: Uuid::new_v4().to_string(),
            ..user
        };
        assert!(matches!(
            repo.create(clash).await,
            Err(AuthError::DuplicateEmail)
        ));
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_code_is_consumed_once() {
        let repo = PgUserRepository::new(setup_test_db().await);
        let user = new_user();
        repo.create(user.clone()).await.unwrap();

        repo.set_verification_code(
            &user.email,
            "1234567",
            Utc::now() + chrono::Duration::minutes(5),
        )
        .await
        .unwrap();

        assert!(repo.consume_verification_code(&user.email, "1234567").await.unwrap());
        assert!(!repo.consume_verification_code(&user.email, "1234567").await.unwrap());

        let stored = repo.find_by_id(&user.id).await.unwrap();
        assert!(stored.verified);
        assert!(stored.verification_code.is_none());
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_unknown_email_updates_nothing() {
        let repo = PgUserRepository::new(setup_test_db().await);

        assert!(matches!(
            repo.set_verified("ghost@example.com", true).await,
            Err(AuthError::NotFound)
        ));
    }
}
