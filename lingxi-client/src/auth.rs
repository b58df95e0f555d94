//! The signed-in session shared by the REST client and the user store.

use crate::persistence::{self, PersistedSession, PersistenceError};
use lingxi_core::{TokenPair, UserIdentity};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

/// Current session, mirrored to disk when a path is configured.
#[derive(Debug, Clone, Default)]
pub struct SessionHandle {
    current: Arc<RwLock<Option<PersistedSession>>>,
    path: Option<PathBuf>,
}

impl SessionHandle {
    /// In-memory only.
    pub fn ephemeral(session: Option<PersistedSession>) -> Self {
        Self {
            current: Arc::new(RwLock::new(session)),
            path: None,
        }
    }

    /// Restore from `path` and keep writing changes back to it.
    pub fn restore(path: PathBuf) -> Result<Self, PersistenceError> {
        let session = persistence::load(&path)?;
        if let Some(session) = &session {
            tracing::debug!(user = %session.user.username, "Restored persisted session");
        }
        Ok(Self {
            current: Arc::new(RwLock::new(session)),
            path: Some(path),
        })
    }

    pub fn current(&self) -> Option<PersistedSession> {
        self.current.read().ok().and_then(|s| s.clone())
    }

    pub fn user(&self) -> Option<UserIdentity> {
        self.current().map(|s| s.user)
    }

    pub fn access_token(&self) -> Option<String> {
        self.read(|s| s.tokens.access_token.clone())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.read(|s| s.tokens.refresh_token.clone())
    }

    pub fn remember(&self) -> bool {
        self.read(|s| s.remember).unwrap_or(false)
    }

    pub fn is_signed_in(&self) -> bool {
        self.read(|_| ()).is_some()
    }

    pub fn sign_in(&self, user: UserIdentity, tokens: TokenPair, remember: bool) {
        let session = PersistedSession {
            user,
            tokens,
            remember,
        };
        if let Ok(mut current) = self.current.write() {
            *current = Some(session);
        }
        self.persist();
    }

    /// Swap in a refreshed access token. No-op when signed out.
    pub fn replace_access_token(&self, access_token: String) {
        if let Ok(mut current) = self.current.write() {
            if let Some(session) = current.as_mut() {
                session.tokens.access_token = access_token;
            }
        }
        self.persist();
    }

    pub fn sign_out(&self) {
        if let Ok(mut current) = self.current.write() {
            *current = None;
        }
        self.persist();
    }

    fn read<R>(&self, f: impl FnOnce(&PersistedSession) -> R) -> Option<R> {
        self.current.read().ok()?.as_ref().map(f)
    }

    // Disk failures are logged; the in-memory session stays authoritative.
    fn persist(&self) {
        let Some(path) = &self.path else {
            return;
        };
        let result = match self.current() {
            Some(session) => persistence::save(path, &session),
            None => persistence::clear(path),
        };
        if let Err(err) = result {
            tracing::error!(path = %path.display(), error = %err, "Failed to persist session");
        }
    }
}
