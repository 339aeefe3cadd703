//! End-to-end tests of the sign-up / verification / session lifecycle

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use tokio::sync::Mutex;

    use authgate_server::auth::{
        AuthError, AuthResult, AuthService, AuthSettings, TokenCodec, TokenPurpose,
    };
    use authgate_server::mail::{
        MailConfig, MailDispatcher, MailError, MailMessage, MailTransport,
    };
    use authgate_server::models::{NewUser, User, UserStatus};
    use authgate_server::store::{KeyValueStore, MemoryKvStore};
    use authgate_server::users::{MemoryUserRepository, UserRepository};

    const SECRET: &str = "integration-secret";
    const PASSWORD: &str = "correct horse battery staple";

    #[derive(Default)]
    struct Outbox {
        sent: Mutex<Vec<MailMessage>>,
    }

    #[async_trait]
    impl MailTransport for Outbox {
        async fn send(&self, message: &MailMessage) -> Result<(), MailError> {
            self.sent.lock().await.push(message.clone());
            Ok(())
        }
    }

    struct Unreachable;

    #[async_trait]
    impl MailTransport for Unreachable {
        async fn send(&self, _message: &MailMessage) -> Result<(), MailError> {
            Err(MailError::Delivery("smtp down".to_string()))
        }
    }

    struct Harness {
        service: AuthService,
        users: MemoryUserRepository,
        kv: MemoryKvStore,
        outbox: Arc<Outbox>,
    }

    fn settings() -> AuthSettings {
        AuthSettings {
            bcrypt_cost: 4,
            ..AuthSettings::default()
        }
    }

    fn harness() -> Harness {
        let users = MemoryUserRepository::new();
        let kv = MemoryKvStore::new();
        let outbox = Arc::new(Outbox::default());
        let (mailer, _failures) = MailDispatcher::spawn(outbox.clone(), &MailConfig::default());

        let service = AuthService::new(
            Arc::new(users.clone()),
            Arc::new(kv.clone()),
            mailer,
            SECRET,
            settings(),
        );

        Harness {
            service,
            users,
            kv,
            outbox,
        }
    }

    fn token_for(user_id: &str) -> String {
        TokenCodec::new(SECRET, TokenPurpose::Verification)
            .issue(user_id, Duration::from_secs(300))
            .unwrap()
    }

    async fn wait_for_mail(outbox: &Outbox, count: usize) -> Vec<MailMessage> {
        for _ in 0..200 {
            let sent = outbox.sent.lock().await;
            if sent.len() >= count {
                return sent.clone();
            }
            drop(sent);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        outbox.sent.lock().await.clone()
    }

    /// Signed-up and verified user, returning its id
    async fn verified_user(h: &Harness, email: &str) -> String {
        let id = h.service.sign_up("Ada", email, PASSWORD).await.unwrap();
        h.service.verify_email(&token_for(&id)).await.unwrap();
        id
    }

    async fn session_keys(kv: &MemoryKvStore, user_id: &str) -> Vec<String> {
        kv.set_members(&format!("refresh_token:{}", user_id))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_sign_in_before_verification_is_rejected() {
        let h = harness();
        h.service.sign_up("Ada", "ada@x.com", PASSWORD).await.unwrap();

        assert!(matches!(
            h.service.sign_in("ada@x.com", PASSWORD).await,
            Err(AuthError::NotVerified)
        ));
    }

    #[tokio::test]
    async fn test_duplicate_sign_up_leaves_one_record() {
        let h = harness();
        h.service.sign_up("Ada", "a@x.com", PASSWORD).await.unwrap();

        assert!(matches!(
            h.service.sign_up("Ada Again", "a@x.com", "other").await,
            Err(AuthError::DuplicateEmail)
        ));
        assert_eq!(h.users.len().await, 1);
    }

    #[tokio::test]
    async fn test_sign_up_sends_one_email_covering_both_paths() {
        let h = harness();
        let id = h.service.sign_up("Ada", "ada@x.com", PASSWORD).await.unwrap();

        let sent = wait_for_mail(&h.outbox, 1).await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "ada@x.com");
        assert!(sent[0].body.contains("/auth/verify-email?token="));
        assert!(sent[0].body.contains("/auth/verify-code?token="));

        let code = h
            .users
            .find_by_id(&id)
            .await
            .unwrap()
            .verification_code
            .unwrap();
        assert!(sent[0].body.contains(&code));
        assert!(!sent[0].body.contains(PASSWORD));
    }

    #[tokio::test]
    async fn test_mail_failure_does_not_fail_sign_up() {
        let users = MemoryUserRepository::new();
        let (mailer, mut failures) =
            MailDispatcher::spawn(Arc::new(Unreachable), &MailConfig::default());
        let service = AuthService::new(
            Arc::new(users.clone()),
            Arc::new(MemoryKvStore::new()),
            mailer,
            SECRET,
            settings(),
        );

        assert!(service.sign_up("Ada", "ada@x.com", PASSWORD).await.is_ok());

        let failure = tokio::time::timeout(Duration::from_secs(1), failures.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(failure.to, "ada@x.com");
    }

    #[tokio::test]
    async fn test_link_verification_completes_once() {
        let h = harness();
        let id = h.service.sign_up("Ada", "ada@x.com", PASSWORD).await.unwrap();
        let token = token_for(&id);

        h.service.verify_email(&token).await.unwrap();
        assert_eq!(
            h.users.find_by_id(&id).await.unwrap().status(),
            UserStatus::Verified
        );

        assert!(matches!(
            h.service.verify_email(&token).await,
            Err(AuthError::AlreadyVerified)
        ));
        // A freshly issued token makes no difference
        assert!(matches!(
            h.service.verify_email(&token_for(&id)).await,
            Err(AuthError::AlreadyVerified)
        ));
    }

    #[tokio::test]
    async fn test_code_verification_then_sign_in() {
        let h = harness();
        let id = h.service.sign_up("Ada", "ada@x.com", PASSWORD).await.unwrap();

        h.service.send_verification_code("ada@x.com").await.unwrap();
        let code = h
            .users
            .find_by_id(&id)
            .await
            .unwrap()
            .verification_code
            .unwrap();
        assert_eq!(code.len(), 7);

        let token = token_for(&id);
        assert!(matches!(
            h.service.verify_code(&token, "not-it").await,
            Err(AuthError::InvalidCode)
        ));
        h.service.verify_code(&token, &code).await.unwrap();

        // Single use
        assert!(matches!(
            h.service.verify_code(&token, &code).await,
            Err(AuthError::AlreadyVerified)
        ));
        assert!(h.service.sign_in("ada@x.com", PASSWORD).await.is_ok());
    }

    #[tokio::test]
    async fn test_correct_code_after_expiry_is_rejected() {
        let h = harness();
        let id = h.service.sign_up("Ada", "ada@x.com", PASSWORD).await.unwrap();
        h.users
            .set_verification_code("ada@x.com", "7654321", Utc::now() - chrono::Duration::seconds(5))
            .await
            .unwrap();

        assert!(matches!(
            h.service.verify_code(&token_for(&id), "7654321").await,
            Err(AuthError::CodeExpired)
        ));
        assert!(!h.users.find_by_id(&id).await.unwrap().verified);
    }

    #[tokio::test]
    async fn test_resend_flows() {
        let h = harness();
        assert!(matches!(
            h.service.resend_verification_email("nobody@x.com").await,
            Err(AuthError::NotFound)
        ));

        h.service.sign_up("Ada", "ada@x.com", PASSWORD).await.unwrap();
        assert!(h.service.resend_verification_email("ada@x.com").await.is_ok());
        assert_eq!(wait_for_mail(&h.outbox, 2).await.len(), 2);

        let id = h.users.find_by_email("ada@x.com").await.unwrap().id;
        h.service.verify_email(&token_for(&id)).await.unwrap();

        assert!(matches!(
            h.service.resend_verification_email("ada@x.com").await,
            Err(AuthError::AlreadyVerified)
        ));
        assert!(matches!(
            h.service.send_verification_code("ada@x.com").await,
            Err(AuthError::AlreadyVerified)
        ));
    }

    #[tokio::test]
    async fn test_wrong_password_creates_no_session() {
        let h = harness();
        let id = verified_user(&h, "a@x.com").await;

        assert!(matches!(
            h.service.sign_in("a@x.com", "wrong").await,
            Err(AuthError::CredentialMismatch)
        ));
        assert!(session_keys(&h.kv, &id).await.is_empty());
    }

    #[tokio::test]
    async fn test_sign_in_opens_session() {
        let h = harness();
        let id = verified_user(&h, "a@x.com").await;

        let tokens = h.service.sign_in("A@X.com", PASSWORD).await.unwrap();
        assert_eq!(tokens.access_ttl, settings().access_token_ttl);
        assert_ne!(tokens.access_token, tokens.refresh_token);
        assert_eq!(h.service.authenticate(&tokens.access_token).unwrap(), id);
        assert_eq!(session_keys(&h.kv, &id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_until_revoked() {
        let h = harness();
        verified_user(&h, "a@x.com").await;
        let tokens = h.service.sign_in("a@x.com", PASSWORD).await.unwrap();

        let refreshed = h.service.refresh_token(&tokens.refresh_token).await.unwrap();
        assert!(h.service.authenticate(&refreshed.access_token).is_ok());

        assert_eq!(
            h.service.revoke_token(&tokens.refresh_token).await.unwrap(),
            "refresh token blocked successfully"
        );
        assert!(matches!(
            h.service.refresh_token(&tokens.refresh_token).await,
            Err(AuthError::SessionBlocked)
        ));
        assert!(matches!(
            h.service.revoke_token(&tokens.refresh_token).await,
            Err(AuthError::SessionAlreadyBlocked)
        ));
        // Still blocked after the replay
        assert!(matches!(
            h.service.refresh_token(&tokens.refresh_token).await,
            Err(AuthError::SessionBlocked)
        ));
    }

    #[tokio::test]
    async fn test_sign_out_revokes() {
        let h = harness();
        verified_user(&h, "a@x.com").await;
        let tokens = h.service.sign_in("a@x.com", PASSWORD).await.unwrap();

        h.service.sign_out(&tokens.refresh_token).await.unwrap();
        assert!(matches!(
            h.service.refresh_token(&tokens.refresh_token).await,
            Err(AuthError::SessionBlocked)
        ));
    }

    #[tokio::test]
    async fn test_sign_in_again_right_after_revocation() {
        let h = harness();
        verified_user(&h, "a@x.com").await;

        let first = h.service.sign_in("a@x.com", PASSWORD).await.unwrap();
        h.service.revoke_token(&first.refresh_token).await.unwrap();

        let second = h.service.sign_in("a@x.com", PASSWORD).await.unwrap();
        assert_ne!(first.refresh_token, second.refresh_token);
        assert!(h.service.refresh_token(&second.refresh_token).await.is_ok());
        assert!(matches!(
            h.service.refresh_token(&first.refresh_token).await,
            Err(AuthError::SessionBlocked)
        ));
    }

    #[tokio::test]
    async fn test_access_token_is_not_a_refresh_token() {
        let h = harness();
        verified_user(&h, "a@x.com").await;
        let tokens = h.service.sign_in("a@x.com", PASSWORD).await.unwrap();

        assert!(matches!(
            h.service.refresh_token(&tokens.access_token).await,
            Err(AuthError::TokenInvalid)
        ));
    }

    #[tokio::test]
    async fn test_only_access_tokens_authenticate() {
        let h = harness();
        let id = verified_user(&h, "a@x.com").await;
        let tokens = h.service.sign_in("a@x.com", PASSWORD).await.unwrap();
        h.service.revoke_token(&tokens.refresh_token).await.unwrap();

        assert!(matches!(
            h.service.authenticate(&tokens.refresh_token),
            Err(AuthError::TokenInvalid)
        ));
        assert!(matches!(
            h.service.authenticate(&token_for(&id)),
            Err(AuthError::TokenInvalid)
        ));
        assert_eq!(h.service.authenticate(&tokens.access_token).unwrap(), id);
    }

    #[tokio::test]
    async fn test_foreign_refresh_token_rejected() {
        let h = harness();
        verified_user(&h, "a@x.com").await;
        let forged = TokenCodec::new("someone-else", TokenPurpose::Refresh)
            .issue("whoever", Duration::from_secs(3600))
            .unwrap();

        assert!(matches!(
            h.service.refresh_token(&forged).await,
            Err(AuthError::TokenInvalid)
        ));
        assert!(matches!(
            h.service.revoke_token("not.a.token").await,
            Err(AuthError::TokenInvalid)
        ));
    }

    #[tokio::test]
    async fn test_expired_refresh_token_rejected() {
        let h = harness();
        let id = verified_user(&h, "a@x.com").await;
        let token = TokenCodec::new(SECRET, TokenPurpose::Refresh)
            .issue(&id, Duration::ZERO)
            .unwrap();

        tokio::time::sleep(Duration::from_millis(1100)).await;

        let err = h.service.refresh_token(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::TokenExpired));
        assert!(err.is_token_invalid());
    }

    #[tokio::test]
    async fn test_forget_session() {
        let h = harness();
        let id = verified_user(&h, "a@x.com").await;
        let tokens = h.service.sign_in("a@x.com", PASSWORD).await.unwrap();

        h.service.forget_session(&tokens.refresh_token).await.unwrap();
        assert!(session_keys(&h.kv, &id).await.is_empty());
        assert!(matches!(
            h.service.refresh_token(&tokens.refresh_token).await,
            Err(AuthError::SessionNotFound)
        ));
        assert!(matches!(
            h.service.forget_session(&tokens.refresh_token).await,
            Err(AuthError::SessionNotFound)
        ));
    }

    #[tokio::test]
    async fn test_current_user_profile() {
        let h = harness();
        let id = verified_user(&h, "a@x.com").await;

        let profile = h.service.current_user(&id).await.unwrap();
        assert_eq!(profile.email, "a@x.com");
        assert_eq!(profile.status, UserStatus::Verified);

        assert!(matches!(
            h.service.current_user("missing").await,
            Err(AuthError::NotFound)
        ));
    }

    /// Directory whose lookups never finish in time
    struct Stalled;

    #[async_trait]
    impl UserRepository for Stalled {
        async fn create(&self, _user: NewUser) -> AuthResult<String> {
            Err(AuthError::BackendUnavailable("stalled".to_string()))
        }

        async fn find_by_id(&self, _user_id: &str) -> AuthResult<User> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Err(AuthError::NotFound)
        }

        async fn find_by_email(&self, _email: &str) -> AuthResult<User> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Err(AuthError::NotFound)
        }

        async fn set_verified(&self, _email: &str, _verified: bool) -> AuthResult<()> {
            Ok(())
        }

        async fn set_verification_code(
            &self,
            _email: &str,
            _code: &str,
            _expires_at: DateTime<Utc>,
        ) -> AuthResult<()> {
            Ok(())
        }

        async fn consume_verification_code(&self, _email: &str, _code: &str) -> AuthResult<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn test_stalled_store_reports_cancelled() {
        let (mailer, _failures) =
            MailDispatcher::spawn(Arc::new(Outbox::default()), &MailConfig::default());
        let service = AuthService::new(
            Arc::new(Stalled),
            Arc::new(MemoryKvStore::new()),
            mailer,
            SECRET,
            AuthSettings {
                store_timeout: Duration::from_millis(50),
                ..settings()
            },
        );

        assert!(matches!(
            service.sign_in("a@x.com", PASSWORD).await,
            Err(AuthError::Cancelled)
        ));
        assert!(matches!(
            service.sign_up("Ada", "a@x.com", PASSWORD).await,
            Err(AuthError::Cancelled)
        ));
    }

    /// Directory whose id lookups never finish in time; everything else works
    struct SlowIdLookups {
        inner: MemoryUserRepository,
    }

    #[async_trait]
    impl UserRepository for SlowIdLookups {
        async fn create(&self, user: NewUser) -> AuthResult<String> {
            self.inner.create(user).await
        }

        async fn find_by_id(&self, _user_id: &str) -> AuthResult<User> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Err(AuthError::NotFound)
        }

        async fn find_by_email(&self, email: &str) -> AuthResult<User> {
            self.inner.find_by_email(email).await
        }

        async fn set_verified(&self, email: &str, verified: bool) -> AuthResult<()> {
            self.inner.set_verified(email, verified).await
        }

        async fn set_verification_code(
            &self,
            email: &str,
            code: &str,
            expires_at: DateTime<Utc>,
        ) -> AuthResult<()> {
            self.inner.set_verification_code(email, code, expires_at).await
        }

        async fn consume_verification_code(&self, email: &str, code: &str) -> AuthResult<bool> {
            self.inner.consume_verification_code(email, code).await
        }
    }

    #[tokio::test]
    async fn test_sign_up_completes_once_the_row_is_written() {
        let users = MemoryUserRepository::new();
        let outbox = Arc::new(Outbox::default());
        let (mailer, _failures) = MailDispatcher::spawn(outbox.clone(), &MailConfig::default());
        let service = AuthService::new(
            Arc::new(SlowIdLookups {
                inner: users.clone(),
            }),
            Arc::new(MemoryKvStore::new()),
            mailer,
            SECRET,
            AuthSettings {
                store_timeout: Duration::from_millis(50),
                ..settings()
            },
        );

        let id = service.sign_up("Ada", "ada@x.com", PASSWORD).await.unwrap();
        assert_eq!(users.find_by_email("ada@x.com").await.unwrap().id, id);

        let sent = wait_for_mail(&outbox, 1).await;
        assert_eq!(sent.len(), 1);
        assert!(sent[0].body.contains("/auth/verify-email?token="));
    }
}
