//! Persisted sign-in state.

use lingxi_core::{TokenPair, UserIdentity};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Identity, token pair and the "remember me" choice.
///
/// `remember` decides what happens when the refresh token is rejected:
/// remembered sessions survive, others are signed out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSession {
    pub user: UserIdentity,
    pub tokens: TokenPair,
    pub remember: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub fn load(path: &Path) -> Result<Option<PersistedSession>, PersistenceError> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path)?;
    let session = serde_json::from_str::<PersistedSession>(&contents)?;
    Ok(Some(session))
}

pub fn save(path: &Path, session: &PersistedSession) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let contents = serde_json::to_string_pretty(session)?;
    std::fs::write(path, contents)?;
    Ok(())
}

/// Remove the file. Missing is fine.
pub fn clear(path: &Path) -> Result<(), PersistenceError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lingxi_core::UserId;

    fn session() -> PersistedSession {
        PersistedSession {
            user: UserIdentity {
                user_id: UserId::new(42),
                username: "xiaoming".to_string(),
                token_balance: 1200,
                profile_picture: None,
            },
            tokens: TokenPair {
                access_token: "access".to_string(),
                refresh_token: "refresh".to_string(),
            },
            remember: true,
        }
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/session.json");
        save(&path, &session()).unwrap();
        assert_eq!(load(&path).unwrap(), Some(session()));
    }

    #[test]
    fn missing_file_is_none_and_clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        assert_eq!(load(&path).unwrap(), None);
        clear(&path).unwrap();
        save(&path, &session()).unwrap();
        clear(&path).unwrap();
        assert!(!path.exists());
    }
}
