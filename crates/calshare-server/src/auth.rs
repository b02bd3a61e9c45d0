//! Token-based authentication gate.
//!
//! Tokens live only in process memory; they are cheap to reissue, so
//! nothing is persisted. The token map sits behind its own mutex which is
//! never held across store I/O, keeping auth checks independent of
//! broadcast and database contention.

use std::collections::HashMap;

use chrono::{Duration, Utc};
use parking_lot::Mutex;
use rand::RngCore;
use thiserror::Error;
use tracing::{info, warn};

use calshare_shared::{password, validate, AuthToken, User};
use calshare_store::StoreError;

use crate::state::SharedDb;

/// Token lifetime from issuance.
const TOKEN_TTL_HOURS: i64 = 24;
/// Random bytes per token (hex-encoded on the wire).
const TOKEN_LEN: usize = 32;

/// Why a registration attempt was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegisterError {
    #[error("Username must be 3-20 letters, digits or underscores")]
    InvalidUsername,

    #[error("Invalid email address")]
    InvalidEmail,

    #[error("Password must be at least 6 characters")]
    WeakPassword,

    #[error("Username already exists")]
    UsernameTaken,

    #[error("Email already registered")]
    EmailTaken,

    #[error("Registration failed")]
    Store,
}

/// Issues, validates and revokes bearer tokens, and owns the user-facing
/// login/register flows.
pub struct AuthManager {
    db: SharedDb,
    tokens: Mutex<HashMap<String, AuthToken>>,
}

impl AuthManager {
    pub fn new(db: SharedDb) -> Self {
        Self {
            db,
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Authenticate a username/password pair.
    ///
    /// Returns the minted token and the user record on success; `None` on
    /// unknown user, wrong password, or a deactivated account. Never
    /// distinguishes the failure causes to the caller.
    pub fn login(&self, username: &str, password: &str) -> Option<(AuthToken, User)> {
        let mut user = {
            let db = self.db.lock();
            match db.get_user_by_username(username) {
                Ok(user) => user,
                Err(StoreError::NotFound) => return None,
                Err(e) => {
                    warn!(error = %e, "user lookup failed during login");
                    return None;
                }
            }
        };

        if !password::verify_password(password, &user.password_hash) {
            return None;
        }
        if !user.is_active {
            return None;
        }

        let now = Utc::now();
        if let Err(e) = self.db.lock().update_last_login(user.id, now) {
            warn!(error = %e, user_id = user.id, "failed to record last login");
        }
        user.last_login = now;

        let token = mint_token(user.id);
        self.tokens
            .lock()
            .insert(token.token.clone(), token.clone());

        info!(user_id = user.id, username = %user.username, "user logged in");
        Some((token, user))
    }

    /// Create a new account. Does not log the user in.
    pub fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<i64, RegisterError> {
        if !validate::is_valid_username(username) {
            return Err(RegisterError::InvalidUsername);
        }
        if !validate::is_valid_email(email) {
            return Err(RegisterError::InvalidEmail);
        }
        if !validate::is_valid_password(password) {
            return Err(RegisterError::WeakPassword);
        }

        // Case-sensitive exact-match uniqueness, checked up front so the
        // client gets a specific error instead of a constraint failure.
        {
            let db = self.db.lock();
            if db.get_user_by_username(username).is_ok() {
                return Err(RegisterError::UsernameTaken);
            }
            if db.get_user_by_email(email).is_ok() {
                return Err(RegisterError::EmailTaken);
            }
        }

        let user = User::new(username, email, password::hash_password(password), display_name);
        match self.db.lock().create_user(&user) {
            Ok(id) => {
                info!(user_id = id, username = %username, "user registered");
                Ok(id)
            }
            Err(e) => {
                warn!(error = %e, username = %username, "failed to create user");
                Err(RegisterError::Store)
            }
        }
    }

    /// Revoke a token. Idempotent: returns `false` when the token was
    /// already gone.
    pub fn logout(&self, token: &str) -> bool {
        let removed = self.tokens.lock().remove(token);
        if let Some(ref t) = removed {
            info!(user_id = t.user_id, "user logged out");
        }
        removed.is_some()
    }

    /// Whether the token exists and has not expired.
    pub fn validate(&self, token: &str) -> bool {
        let now = Utc::now();
        self.tokens
            .lock()
            .get(token)
            .map(|t| t.is_valid(now))
            .unwrap_or(false)
    }

    /// The user id behind a valid token, if any.
    pub fn user_id_for(&self, token: &str) -> Option<i64> {
        let now = Utc::now();
        self.tokens
            .lock()
            .get(token)
            .filter(|t| t.is_valid(now))
            .map(|t| t.user_id)
    }

    /// The full user record behind a valid token, if any.
    pub fn user_for(&self, token: &str) -> Option<User> {
        let user_id = self.user_id_for(token)?;
        self.db.lock().get_user_by_id(user_id).ok()
    }

    /// Exchange a valid token for a fresh one.
    ///
    /// Both the revocation of the old token and the insertion of the new
    /// one happen under a single lock acquisition, so a concurrent
    /// validator sees exactly one of the two tokens.
    pub fn refresh(&self, old_token: &str) -> Option<AuthToken> {
        let now = Utc::now();
        let mut tokens = self.tokens.lock();

        let user_id = match tokens.get(old_token) {
            Some(t) if t.is_valid(now) => t.user_id,
            _ => return None,
        };

        let new_token = mint_token(user_id);
        tokens.remove(old_token);
        tokens.insert(new_token.token.clone(), new_token.clone());
        Some(new_token)
    }

    /// Sweep expired tokens. Safe to call concurrently with every other
    /// operation.
    pub fn cleanup_expired(&self) {
        let now = Utc::now();
        let mut tokens = self.tokens.lock();
        let before = tokens.len();
        tokens.retain(|_, t| t.is_valid(now));
        let swept = before - tokens.len();
        if swept > 0 {
            info!(swept, "removed expired tokens");
        }
    }

    /// Number of tokens currently held (expired ones included until the
    /// next sweep).
    pub fn token_count(&self) -> usize {
        self.tokens.lock().len()
    }

    #[cfg(test)]
    pub(crate) fn insert_token(&self, token: AuthToken) {
        self.tokens.lock().insert(token.token.clone(), token);
    }
}

fn mint_token(user_id: i64) -> AuthToken {
    let mut bytes = [0u8; TOKEN_LEN];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    AuthToken {
        token: hex::encode(bytes),
        user_id,
        expires_at: Utc::now() + Duration::hours(TOKEN_TTL_HOURS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use calshare_store::Database;

    fn manager() -> AuthManager {
        let db = Arc::new(parking_lot::Mutex::new(Database::open_in_memory().unwrap()));
        AuthManager::new(db)
    }

    #[test]
    fn register_then_login() {
        let auth = manager();
        let id = auth
            .register("alice", "alice@x.com", "secret1", "Alice")
            .unwrap();
        assert!(id > 0);

        let (token, user) = auth.login("alice", "secret1").expect("login should succeed");
        assert_eq!(user.id, id);
        assert_eq!(user.display_name, "Alice");
        assert_eq!(token.user_id, id);
        assert_eq!(token.token.len(), 64);
        assert!(auth.validate(&token.token));
        assert_eq!(auth.user_id_for(&token.token), Some(id));

        let fetched = auth.user_for(&token.token).unwrap();
        assert_eq!(fetched.username, "alice");
    }

    #[test]
    fn register_validation_failures() {
        let auth = manager();
        assert_eq!(
            auth.register("ab", "a@x.com", "secret1", ""),
            Err(RegisterError::InvalidUsername)
        );
        assert_eq!(
            auth.register("alice", "not-an-email", "secret1", ""),
            Err(RegisterError::InvalidEmail)
        );
        assert_eq!(
            auth.register("alice", "a@x.com", "12345", ""),
            Err(RegisterError::WeakPassword)
        );
    }

    #[test]
    fn register_conflicts() {
        let auth = manager();
        auth.register("alice", "alice@x.com", "secret1", "").unwrap();

        assert_eq!(
            auth.register("alice", "other@x.com", "secret1", ""),
            Err(RegisterError::UsernameTaken)
        );
        assert_eq!(
            auth.register("alice2", "alice@x.com", "secret1", ""),
            Err(RegisterError::EmailTaken)
        );
        // Case-sensitive matching: a different casing is a new identity.
        assert!(auth.register("Alice", "upper@x.com", "secret1", "").is_ok());
    }

    #[test]
    fn login_failures() {
        let auth = manager();
        auth.register("alice", "alice@x.com", "secret1", "").unwrap();

        assert!(auth.login("alice", "wrongpw").is_none());
        assert!(auth.login("nobody", "secret1").is_none());
    }

    #[test]
    fn inactive_user_cannot_login() {
        let auth = manager();
        let mut user = User::new(
            "bob",
            "bob@x.com",
            password::hash_password("secret1"),
            "",
        );
        user.is_active = false;
        auth.db.lock().create_user(&user).unwrap();

        assert!(auth.login("bob", "secret1").is_none());
    }

    #[test]
    fn login_updates_last_login() {
        let auth = manager();
        auth.register("alice", "alice@x.com", "secret1", "").unwrap();

        let before = auth.db.lock().get_user_by_username("alice").unwrap();
        let (_, user) = auth.login("alice", "secret1").unwrap();
        assert!(user.last_login >= before.last_login);

        let stored = auth.db.lock().get_user_by_username("alice").unwrap();
        assert_eq!(stored.last_login, user.last_login);
    }

    #[test]
    fn logout_is_idempotent() {
        let auth = manager();
        auth.register("alice", "alice@x.com", "secret1", "").unwrap();
        let (token, _) = auth.login("alice", "secret1").unwrap();

        assert!(auth.logout(&token.token));
        assert!(!auth.logout(&token.token));
        assert!(!auth.validate(&token.token));
        assert_eq!(auth.user_id_for(&token.token), None);
    }

    #[test]
    fn expired_token_is_invalid_and_swept() {
        let auth = manager();
        auth.insert_token(AuthToken {
            token: "expired".into(),
            user_id: 1,
            expires_at: Utc::now() - Duration::hours(1),
        });

        assert!(!auth.validate("expired"));
        assert_eq!(auth.user_id_for("expired"), None);
        assert_eq!(auth.token_count(), 1);

        auth.cleanup_expired();
        assert_eq!(auth.token_count(), 0);
    }

    #[test]
    fn refresh_swaps_tokens_atomically() {
        let auth = manager();
        auth.register("alice", "alice@x.com", "secret1", "").unwrap();
        let (old, _) = auth.login("alice", "secret1").unwrap();

        let new = auth.refresh(&old.token).expect("refresh should succeed");
        assert_ne!(new.token, old.token);
        assert_eq!(new.user_id, old.user_id);
        assert!(!auth.validate(&old.token));
        assert!(auth.validate(&new.token));
        // Exactly one token remains.
        assert_eq!(auth.token_count(), 1);

        // A revoked token cannot be refreshed again.
        assert!(auth.refresh(&old.token).is_none());
    }
}
