//! services/api/src/adapters/auth.rs
//!
//! This module contains the authentication adapter, the concrete
//! implementation of the `AuthService` port. Credentials and sessions live
//! in the document store itself (argon2-hashed passwords, expiring session
//! documents); auth-state changes are published on a watch channel so
//! interested parties observe logins and logouts as they happen.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use inventory_core::domain::{User, UserCredentials};
use inventory_core::ports::{AuthService, IdentityProvider, PortError, PortResult};
use inventory_core::DocumentStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::error;
use uuid::Uuid;

const USERS_COLLECTION: &str = "users";
const SESSIONS_COLLECTION: &str = "auth_sessions";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionDoc {
    user_id: Uuid,
    email: String,
    expires_at: DateTime<Utc>,
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An `AuthService` backed by the document store.
pub struct StoreAuth {
    store: Arc<dyn DocumentStore>,
    session_ttl: Duration,
    state_tx: watch::Sender<Option<User>>,
}

impl StoreAuth {
    pub fn new(store: Arc<dyn DocumentStore>, session_ttl: Duration) -> Self {
        let (state_tx, _) = watch::channel(None);
        Self {
            store,
            session_ttl,
            state_tx,
        }
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn decode<T: serde::de::DeserializeOwned>(what: &str, fields: serde_json::Value) -> PortResult<T> {
    serde_json::from_value(fields)
        .map_err(|e| PortError::StoreRead(format!("malformed {} document: {}", what, e)))
}

//=========================================================================================
// `AuthService` Trait Implementation
//=========================================================================================

#[async_trait]
impl IdentityProvider for StoreAuth {
    async fn current_user(&self) -> PortResult<Option<User>> {
        Ok(self.state_tx.borrow().clone())
    }
}

#[async_trait]
impl AuthService for StoreAuth {
    async fn sign_up(&self, email: &str, password: &str) -> PortResult<User> {
        let email = normalize_email(email);
        if email.is_empty() || !email.contains('@') {
            return Err(PortError::InvalidRecord(
                "a valid email address is required".to_string(),
            ));
        }
        if password.is_empty() {
            return Err(PortError::InvalidRecord(
                "a password is required".to_string(),
            ));
        }

        let salt = SaltString::generate(&mut OsRng);
        let hashed_password = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| PortError::InvalidRecord(format!("password could not be hashed: {}", e)))?
            .to_string();

        let credentials = UserCredentials {
            user_id: Uuid::new_v4(),
            email: email.clone(),
            hashed_password,
        };
        let fields = serde_json::to_value(&credentials)
            .map_err(|e| PortError::StoreWrite(e.to_string()))?;

        // Create-only write, so two racing signups cannot share an email.
        let created = self
            .store
            .set_if_version(USERS_COLLECTION, &email, fields, false, None)
            .await?;
        if !created {
            return Err(PortError::InvalidRecord(format!(
                "an account for '{}' already exists",
                email
            )));
        }

        Ok(User {
            user_id: credentials.user_id,
            email: Some(email),
        })
    }

    async fn log_in(&self, email: &str, password: &str) -> PortResult<String> {
        let email = normalize_email(email);
        let doc = self
            .store
            .get(USERS_COLLECTION, &email)
            .await?
            .ok_or(PortError::NotAuthenticated)?;
        let credentials: UserCredentials = decode("user", doc.fields)?;

        let parsed_hash = PasswordHash::new(&credentials.hashed_password).map_err(|e| {
            error!("stored password hash for '{}' is unreadable: {}", email, e);
            PortError::NotAuthenticated
        })?;
        if Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_err()
        {
            return Err(PortError::NotAuthenticated);
        }

        let token = Uuid::new_v4().to_string();
        let session = SessionDoc {
            user_id: credentials.user_id,
            email: email.clone(),
            expires_at: Utc::now() + self.session_ttl,
        };
        let fields =
            serde_json::to_value(&session).map_err(|e| PortError::StoreWrite(e.to_string()))?;
        self.store
            .set(SESSIONS_COLLECTION, &token, fields, false)
            .await?;

        let user = User {
            user_id: credentials.user_id,
            email: Some(email),
        };
        self.state_tx.send_replace(Some(user));
        Ok(token)
    }

    async fn log_out(&self, session_token: &str) -> PortResult<()> {
        self.store.delete(SESSIONS_COLLECTION, session_token).await?;
        self.state_tx.send_replace(None);
        Ok(())
    }

    async fn resolve_session(&self, session_token: &str) -> PortResult<User> {
        let doc = self
            .store
            .get(SESSIONS_COLLECTION, session_token)
            .await?
            .ok_or(PortError::NotAuthenticated)?;
        let session: SessionDoc = decode("session", doc.fields)?;

        if session.expires_at < Utc::now() {
            // Expired sessions are reaped on sight.
            self.store.delete(SESSIONS_COLLECTION, session_token).await?;
            return Err(PortError::NotAuthenticated);
        }

        Ok(User {
            user_id: session.user_id,
            email: Some(session.email),
        })
    }

    fn subscribe(&self) -> watch::Receiver<Option<User>> {
        self.state_tx.subscribe()
    }
}

//=========================================================================================
// Tests
//=========================================================================================
