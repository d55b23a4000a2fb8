//! Encrypted persistence for the access/refresh token pair
//!
//! Tokens live in an AES-256-GCM encrypted file; the 32-byte key sits in a
//! sibling 0600 key file generated on first use. The file layout is a random
//! 12-byte nonce followed by the ciphertext of the JSON token pair.
//!
//! The file is the ground truth; the in-memory state behind the tokio Mutex
//! is a best-effort mirror rewritten on every mutation. Concurrent writers
//! (interactive login vs background refresh) are serialized per write but not
//! versioned across operations, so the last writer wins.
//!
//! An unreadable store (bad key, truncated file, garbage ciphertext) is not
//! an error the caller sees: the store wipes itself and restarts empty.
//! Losing a token pair costs one re-login; refusing to start costs the app.

use std::path::PathBuf;

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Nonce};
use common::Secret;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::storage::write_atomic;

/// AES-GCM nonce length in bytes.
const NONCE_LEN: usize = 12;

/// Plaintext form of the stored pair.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredTokens {
    access_token: Option<String>,
    refresh_token: Option<String>,
}

/// Encrypted token pair store.
pub struct TokenStore {
    path: PathBuf,
    cipher: Aes256Gcm,
    state: Mutex<StoredTokens>,
}

impl TokenStore {
    /// Open the store, creating the key file on first use.
    ///
    /// `path` holds the encrypted pair, `key_path` the raw 32-byte key. A
    /// corrupt key or token file is wiped and recreated empty rather than
    /// reported (see the module docs).
    pub async fn open(path: PathBuf, key_path: PathBuf) -> Result<Self> {
        let cipher = load_or_create_cipher(&key_path).await?;

        let mut store = Self {
            path,
            cipher,
            state: Mutex::new(StoredTokens::default()),
        };

        match store.read_from_disk().await {
            Ok(Some(tokens)) => {
                debug!("token store loaded");
                store.state = Mutex::new(tokens);
            }
            Ok(None) => {
                debug!(path = %store.path.display(), "no token file, starting empty");
            }
            Err(e) => {
                warn!(path = %store.path.display(), error = %e, "token store unreadable, wiping and recreating");
                store.persist(&StoredTokens::default()).await?;
            }
        }

        Ok(store)
    }

    /// Replace both tokens (login, code exchange, rotation capture).
    pub async fn save(&self, access: &str, refresh: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.access_token = Some(access.to_owned());
        state.refresh_token = Some(refresh.to_owned());
        self.persist(&state).await?;
        debug!("token pair saved");
        Ok(())
    }

    /// Partial overwrite: a `None` field leaves the stored value untouched.
    pub async fn update(&self, access: Option<&str>, refresh: Option<&str>) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(access) = access {
            state.access_token = Some(access.to_owned());
        }
        if let Some(refresh) = refresh {
            state.refresh_token = Some(refresh.to_owned());
        }
        self.persist(&state).await?;
        debug!(
            access_updated = access.is_some(),
            refresh_updated = refresh.is_some(),
            "token pair updated"
        );
        Ok(())
    }

    /// The stored access token, if any.
    pub async fn access_token(&self) -> Option<String> {
        self.state.lock().await.access_token.clone()
    }

    /// The stored refresh token, if any.
    pub async fn refresh_token(&self) -> Option<String> {
        self.state.lock().await.refresh_token.clone()
    }

    /// Forget both tokens (logout).
    pub async fn clear(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        *state = StoredTokens::default();
        self.persist(&state).await?;
        info!("token store cleared");
        Ok(())
    }

    /// Decrypt the token file. `Ok(None)` means the file does not exist;
    /// `Err` means it exists but cannot be read back (corrupt or wrong key).
    async fn read_from_disk(&self) -> Result<Option<StoredTokens>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Storage(format!("reading token store: {e}"))),
        };

        if bytes.len() < NONCE_LEN {
            return Err(Error::Crypto("token file shorter than nonce".into()));
        }
        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| Error::Crypto("token file failed authentication".into()))?;

        let tokens = serde_json::from_slice(&plaintext)
            .map_err(|e| Error::Crypto(format!("token plaintext unparseable: {e}")))?;
        Ok(Some(tokens))
    }

    /// Encrypt and atomically write the given state.
    async fn persist(&self, tokens: &StoredTokens) -> Result<()> {
        let plaintext = serde_json::to_vec(tokens)
            .map_err(|e| Error::Storage(format!("serializing tokens: {e}")))?;

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_slice())
            .map_err(|_| Error::Crypto("encrypting token pair failed".into()))?;

        let mut bytes = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        bytes.extend_from_slice(nonce.as_slice());
        bytes.extend_from_slice(&ciphertext);

        write_atomic(&self.path, &bytes)
            .await
            .map_err(|e| Error::Storage(format!("writing token store: {e}")))
    }
}

/// Load the 32-byte key, or generate one if missing or the wrong size.
/// A malformed key file is replaced; the token file it encrypted becomes
/// unreadable and the store's wipe-and-recreate path takes over.
async fn load_or_create_cipher(key_path: &PathBuf) -> Result<Aes256Gcm> {
    match tokio::fs::read(key_path).await {
        Ok(bytes) if bytes.len() == 32 => {
            // Secret wipes the heap copy once the cipher holds the schedule
            let key = Secret::new(bytes);
            Aes256Gcm::new_from_slice(key.expose())
                .map_err(|e| Error::Crypto(format!("loading token store key: {e}")))
        }
        Ok(bytes) => {
            warn!(
                path = %key_path.display(),
                len = bytes.len(),
                "token store key has wrong length, regenerating"
            );
            create_key(key_path).await
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %key_path.display(), "generating token store key");
            create_key(key_path).await
        }
        Err(e) => Err(Error::Storage(format!("reading token store key: {e}"))),
    }
}

async fn create_key(key_path: &PathBuf) -> Result<Aes256Gcm> {
    let key = Secret::new(Aes256Gcm::generate_key(&mut OsRng).as_slice().to_vec());
    write_atomic(key_path, key.expose())
        .await
        .map_err(|e| Error::Storage(format!("writing token store key: {e}")))?;
    Aes256Gcm::new_from_slice(key.expose())
        .map_err(|e| Error::Crypto(format!("initializing token store key: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_store(dir: &tempfile::TempDir) -> TokenStore {
        TokenStore::open(dir.path().join("tokens.enc"), dir.path().join("tokens.key"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        store.save("A1", "R1").await.unwrap();

        // Reopen with the same key file
        let store2 = open_store(&dir).await;
        assert_eq!(store2.access_token().await.as_deref(), Some("A1"));
        assert_eq!(store2.refresh_token().await.as_deref(), Some("R1"));
    }

    #[tokio::test]
    async fn file_is_not_plaintext() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        store.save("A1-very-recognizable", "R1").await.unwrap();

        let raw = tokio::fs::read(dir.path().join("tokens.enc")).await.unwrap();
        let as_text = String::from_utf8_lossy(&raw);
        assert!(
            !as_text.contains("A1-very-recognizable"),
            "token must not appear in the file verbatim"
        );
    }

    #[tokio::test]
    async fn partial_update_leaves_other_field() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        store.save("A1", "R1").await.unwrap();

        store.update(Some("A4"), None).await.unwrap();
        assert_eq!(store.access_token().await.as_deref(), Some("A4"));
        assert_eq!(store.refresh_token().await.as_deref(), Some("R1"));

        store.update(None, Some("R9")).await.unwrap();
        assert_eq!(store.access_token().await.as_deref(), Some("A4"));
        assert_eq!(store.refresh_token().await.as_deref(), Some("R9"));
    }

    #[tokio::test]
    async fn clear_forgets_both() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        store.save("A1", "R1").await.unwrap();
        store.clear().await.unwrap();

        assert!(store.access_token().await.is_none());
        assert!(store.refresh_token().await.is_none());

        // Cleared state survives a reopen
        let store2 = open_store(&dir).await;
        assert!(store2.access_token().await.is_none());
    }

    #[tokio::test]
    async fn corrupt_file_recovers_to_empty_writable_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.enc");
        {
            let store = open_store(&dir).await;
            store.save("A1", "R1").await.unwrap();
        }

        // Flip ciphertext bytes so GCM authentication fails
        let mut bytes = tokio::fs::read(&path).await.unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        bytes[NONCE_LEN] ^= 0xFF;
        tokio::fs::write(&path, &bytes).await.unwrap();

        let store = open_store(&dir).await;
        assert!(store.access_token().await.is_none(), "corrupt store must read as empty");
        assert!(store.refresh_token().await.is_none());

        // Still writable after the wipe
        store.save("A2", "R2").await.unwrap();
        assert_eq!(store.access_token().await.as_deref(), Some("A2"));
    }

    #[tokio::test]
    async fn lost_key_recovers_to_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = open_store(&dir).await;
            store.save("A1", "R1").await.unwrap();
        }

        // Replace the key: the old ciphertext can no longer authenticate
        tokio::fs::remove_file(dir.path().join("tokens.key"))
            .await
            .unwrap();

        let store = open_store(&dir).await;
        assert!(store.access_token().await.is_none());
        store.save("A2", "R2").await.unwrap();
        assert_eq!(store.refresh_token().await.as_deref(), Some("R2"));
    }

    #[tokio::test]
    async fn truncated_file_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.enc");
        {
            let store = open_store(&dir).await;
            store.save("A1", "R1").await.unwrap();
        }

        tokio::fs::write(&path, b"short").await.unwrap();

        let store = open_store(&dir).await;
        assert!(store.access_token().await.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn key_file_is_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let _store = open_store(&dir).await;

        let mode = tokio::fs::metadata(dir.path().join("tokens.key"))
            .await
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(mode, 0o600, "key file must be 0600, got {mode:o}");
    }

    #[tokio::test]
    async fn concurrent_writers_leave_consistent_pair() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(open_store(&dir).await);

        let mut handles = vec![];
        for i in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .save(&format!("A{i}"), &format!("R{i}"))
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        // Last writer wins; whichever it was, the pair must match.
        let access = store.access_token().await.unwrap();
        let refresh = store.refresh_token().await.unwrap();
        assert_eq!(access[1..], refresh[1..], "pair must come from one writer");
    }
}
