//! Refresh-token session store
//!
//! Each session is its own hash at `refresh_token:{user_id}:{token}` carrying a
//! backend TTL, and every user has a set at `refresh_token:{user_id}` indexing
//! the record keys. Revoking one session touches one record only, and expiry is
//! left to the backend.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use super::error::{AuthError, AuthResult};
use super::jwt::expiry_after;
use crate::store::{CasOutcome, KeyValueStore, StoreError};

/// Type tag written on every refresh-token record
pub const SESSION_TYPE: &str = "Refresh_Token";

const FIELD_TYPE: &str = "Type";
const FIELD_TOKEN: &str = "Token";
const FIELD_USER_ID: &str = "UserId";
const FIELD_BLOCKED: &str = "Blocked";
const FIELD_EXPIRATION: &str = "Expiration";

/// Server-side state of one refresh token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub kind: String,
    pub token: String,
    pub user_id: String,
    pub blocked: bool,
    /// Absolute expiry (Unix timestamp)
    pub expires_at: i64,
}

impl SessionRecord {
    fn into_fields(self) -> HashMap<String, String> {
        HashMap::from([
            (FIELD_TYPE.to_string(), self.kind),
            (FIELD_TOKEN.to_string(), self.token),
            (FIELD_USER_ID.to_string(), self.user_id),
            (FIELD_BLOCKED.to_string(), self.blocked.to_string()),
            (FIELD_EXPIRATION.to_string(), self.expires_at.to_string()),
        ])
    }

    fn from_fields(mut fields: HashMap<String, String>) -> Option<Self> {
        Some(Self {
            kind: fields.remove(FIELD_TYPE)?,
            token: fields.remove(FIELD_TOKEN)?,
            user_id: fields.remove(FIELD_USER_ID)?,
            blocked: fields.get(FIELD_BLOCKED)?.parse().ok()?,
            expires_at: fields.get(FIELD_EXPIRATION)?.parse().ok()?,
        })
    }
}

fn record_key(user_id: &str, token: &str) -> String {
    format!("refresh_token:{}:{}", user_id, token)
}

fn index_key(user_id: &str) -> String {
    format!("refresh_token:{}", user_id)
}

fn backend(context: &str, e: StoreError) -> AuthError {
    AuthError::BackendUnavailable(format!("{}: {}", context, e))
}

/// Session persistence over a key-value backend
#[derive(Clone)]
pub struct SessionStore {
    kv: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Write an unblocked session for `token` and index it under the user.
    ///
    /// Writing the same token again overwrites the record. A blocked record is
    /// never overwritten; the check and the write are one atomic store call so a
    /// concurrent block cannot be undone.
    pub async fn create(&self, user_id: &str, token: &str, ttl: Duration) -> AuthResult<SessionRecord> {
        let key = record_key(user_id, token);

        let record = SessionRecord {
            kind: SESSION_TYPE.to_string(),
            token: token.to_string(),
            user_id: user_id.to_string(),
            blocked: false,
            expires_at: expiry_after(ttl),
        };

        let written = self
            .kv
            .hash_set_unless(&key, record.clone().into_fields(), ttl, FIELD_BLOCKED, "true")
            .await
            .map_err(|e| backend("create session", e))?;
        if !written {
            return Err(AuthError::SessionBlocked);
        }

        self.kv
            .set_add(&index_key(user_id), &key)
            .await
            .map_err(|e| backend("index session", e))?;

        Ok(record)
    }

    /// Live sessions of a user.
    ///
    /// Index entries whose record has expired are pruned on the way.
    pub async fn list_for_user(&self, user_id: &str) -> AuthResult<Vec<SessionRecord>> {
        let index = index_key(user_id);
        let keys = self
            .kv
            .set_members(&index)
            .await
            .map_err(|e| backend("list sessions", e))?;

        let now = Utc::now().timestamp();
        let mut sessions = Vec::with_capacity(keys.len());

        for key in keys {
            let fields = self
                .kv
                .hash_get_all(&key)
                .await
                .map_err(|e| backend("read session", e))?;

            let Some(fields) = fields else {
                self.kv
                    .set_remove(&index, &key)
                    .await
                    .map_err(|e| backend("prune session index", e))?;
                continue;
            };

            match SessionRecord::from_fields(fields) {
                Some(record) if record.expires_at >= now => sessions.push(record),
                Some(_) => {}
                None => tracing::warn!(user_id = %user_id, "Skipping malformed session record"),
            }
        }

        Ok(sessions)
    }

    /// The live session for `token`, if any
    pub async fn find(&self, user_id: &str, token: &str) -> AuthResult<Option<SessionRecord>> {
        Ok(self
            .list_for_user(user_id)
            .await?
            .into_iter()
            .find(|session| session.token == token))
    }

    /// Flip the blocked flag of the session for `token`
    pub async fn block(&self, user_id: &str, token: &str) -> AuthResult<&'static str> {
        let session = self
            .find(user_id, token)
            .await?
            .ok_or(AuthError::SessionNotFound)?;

        if session.blocked {
            return Err(AuthError::SessionAlreadyBlocked);
        }

        let outcome = self
            .kv
            .hash_compare_and_set(&record_key(user_id, token), FIELD_BLOCKED, "false", "true")
            .await
            .map_err(|e| backend("block session", e))?;

        match outcome {
            CasOutcome::Swapped => Ok("refresh token blocked successfully"),
            CasOutcome::Mismatch => Err(AuthError::SessionAlreadyBlocked),
            CasOutcome::Missing => Err(AuthError::SessionNotFound),
        }
    }

    /// Remove the session record and its index entry.
    ///
    /// Both removals are attempted; either one not removing exactly one entry
    /// is reported as `SessionNotFound`.
    pub async fn delete(&self, user_id: &str, token: &str) -> AuthResult<()> {
        let key = record_key(user_id, token);

        let deleted = self
            .kv
            .delete(&key)
            .await
            .map_err(|e| backend("delete session", e))?;
        let unindexed = self
            .kv
            .set_remove(&index_key(user_id), &key)
            .await
            .map_err(|e| backend("unindex session", e))?;

        if deleted != 1 || unindexed != 1 {
            return Err(AuthError::SessionNotFound);
        }

        Ok(())
    }
}
