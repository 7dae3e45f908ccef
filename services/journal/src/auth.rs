//! Sign-in state for the journal owner.
//!
//! Identity comes from an external provider and arrives here as an
//! [`IdentityCredential`]. The signed-in user id is persisted through a
//! [`SessionStore`] so a restart can restore the session without asking the
//! provider again.

use crate::error::{AuthError, StoreError};
use crate::metadata_store::MetadataStore;
use crate::models::NewProfile;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

/// Account availability reported by the identity provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    #[default]
    Available,
    NoAccount,
    Restricted,
    TemporarilyUnavailable,
    CouldNotDetermine,
    Unknown,
}

impl AccountStatus {
    pub fn ensure_available(self) -> Result<(), AuthError> {
        match self {
            AccountStatus::Available => Ok(()),
            AccountStatus::NoAccount => Err(AuthError::NoAccount),
            AccountStatus::Restricted => Err(AuthError::Restricted),
            AccountStatus::TemporarilyUnavailable => Err(AuthError::TemporarilyUnavailable),
            AccountStatus::CouldNotDetermine => Err(AuthError::CouldNotDetermine),
            AccountStatus::Unknown => Err(AuthError::Unknown),
        }
    }
}

/// Result of a successful sign-in with the identity provider
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IdentityCredential {
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Persists the signed-in user id across restarts
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self) -> Result<Option<String>>;
    async fn save(&self, user_id: &str) -> Result<()>;
    async fn clear(&self) -> Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionFile {
    user_id: String,
}

/// Session store backed by a small JSON file readable only by its owner
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self) -> Result<Option<String>> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", self.path.display()))
            }
        };

        let session: SessionFile =
            serde_json::from_slice(&raw).context("Malformed session file")?;
        Ok(Some(session.user_id))
    }

    async fn save(&self, user_id: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create session directory")?;
        }

        let body = serde_json::to_vec(&SessionFile {
            user_id: user_id.to_string(),
        })?;
        tokio::fs::write(&self.path, body)
            .await
            .with_context(|| format!("Failed to write {}", self.path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .await
                .context("Failed to restrict session file permissions")?;
        }

        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", self.path.display())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AuthState {
    Unknown,
    SignedIn { user_id: String },
    SignedOut,
}

/// Tracks who is signed in and keeps the profile and session in step
pub struct Authenticator {
    sessions: Arc<dyn SessionStore>,
    store: Arc<dyn MetadataStore>,
    state: RwLock<AuthState>,
}

impl Authenticator {
    pub fn new(sessions: Arc<dyn SessionStore>, store: Arc<dyn MetadataStore>) -> Self {
        Self {
            sessions,
            store,
            state: RwLock::new(AuthState::Unknown),
        }
    }

    pub async fn state(&self) -> AuthState {
        self.state.read().await.clone()
    }

    /// Restore the persisted session if its profile still exists
    #[instrument(skip(self))]
    pub async fn restore(&self) -> Result<AuthState, AuthError> {
        let saved = self
            .sessions
            .load()
            .await
            .map_err(|e| AuthError::Session(format!("{:#}", e)))?;

        let next = match saved {
            Some(user_id) => match self.store.fetch_profile(&user_id).await? {
                Some(_) => AuthState::SignedIn { user_id },
                None => {
                    warn!(user_id = %user_id, "Saved session has no profile");
                    AuthState::SignedOut
                }
            },
            None => AuthState::SignedOut,
        };

        info!(state = ?next, "Session restored");
        *self.state.write().await = next.clone();
        Ok(next)
    }

    #[instrument(skip(self, credential), fields(user_id = %credential.user_id))]
    pub async fn complete_sign_in(
        &self,
        credential: IdentityCredential,
    ) -> Result<AuthState, AuthError> {
        match self.store.fetch_profile(&credential.user_id).await? {
            Some(mut profile) => {
                profile.last_sign_in = Utc::now();
                self.store.update_profile(&profile).await?;
            }
            None => {
                let new_profile = NewProfile {
                    id: credential.user_id.clone(),
                    display_name: credential.display_name.clone().unwrap_or_default(),
                    email: credential.email.clone(),
                    journal_settings: String::new(),
                    preferences: Vec::new(),
                };
                match self.store.create_profile(&new_profile).await {
                    Ok(_) => info!("Profile created on first sign-in"),
                    // A concurrent first sign-in created it
                    Err(StoreError::Conflict(_)) => {
                        info!("Profile already created by a concurrent sign-in")
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }

        self.sessions
            .save(&credential.user_id)
            .await
            .map_err(|e| AuthError::Session(format!("{:#}", e)))?;

        let next = AuthState::SignedIn {
            user_id: credential.user_id,
        };
        *self.state.write().await = next.clone();
        info!("Signed in");
        Ok(next)
    }

    /// Provider reported a failed sign-in
    pub async fn sign_in_failed(&self) -> Result<AuthState, AuthError> {
        warn!("Sign-in failed, clearing session");
        self.clear_session().await
    }

    pub async fn sign_out(&self) -> Result<AuthState, AuthError> {
        info!("User signed out");
        self.clear_session().await
    }

    async fn clear_session(&self) -> Result<AuthState, AuthError> {
        self.sessions
            .clear()
            .await
            .map_err(|e| AuthError::Session(format!("{:#}", e)))?;

        *self.state.write().await = AuthState::SignedOut;
        Ok(AuthState::SignedOut)
    }
}
