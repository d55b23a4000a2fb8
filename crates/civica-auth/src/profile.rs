//! Local user-profile cache
//!
//! Single-row JSON file holding the signed-in user. Written on every
//! successful login/refresh/exchange, cleared on logout. Unreadable content
//! loads as empty; the profile is display data and the backend stays the
//! source of truth.

use std::path::PathBuf;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::storage::write_atomic;
use crate::token::UserInfo;

/// Single-row profile cache.
pub struct ProfileCache {
    path: PathBuf,
    row: Mutex<Option<UserInfo>>,
}

impl ProfileCache {
    /// Open the cache at the given file path, loading any persisted row.
    pub async fn open(path: PathBuf) -> Result<Self> {
        let row = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<UserInfo>(&bytes) {
                Ok(user) => Some(user),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "profile cache unreadable, treating as empty");
                    None
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(Error::Storage(format!("reading profile cache: {e}"))),
        };

        Ok(Self {
            path,
            row: Mutex::new(row),
        })
    }

    /// Replace the cached row.
    pub async fn save(&self, user: &UserInfo) -> Result<()> {
        let mut row = self.row.lock().await;
        let json = serde_json::to_vec(user)
            .map_err(|e| Error::Storage(format!("serializing profile: {e}")))?;
        write_atomic(&self.path, &json)
            .await
            .map_err(|e| Error::Storage(format!("writing profile cache: {e}")))?;
        *row = Some(user.clone());
        debug!(user_id = %user.id, "profile cached");
        Ok(())
    }

    /// The cached row, if any.
    pub async fn load(&self) -> Option<UserInfo> {
        self.row.lock().await.clone()
    }

    /// Forget the cached row (logout). Idempotent.
    pub async fn clear(&self) -> Result<()> {
        let mut row = self.row.lock().await;
        *row = None;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Storage(format!("clearing profile cache: {e}"))),
        }
    }
}
