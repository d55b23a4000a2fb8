//! PKCE (Proof Key for Code Exchange) generation and persistence per RFC 7636
//!
//! Generates the verifier/challenge/state triple used during the OAuth
//! sign-in flow, and persists the in-flight triple between "launch browser"
//! and "receive redirect". The verifier is held client-side and sent only to
//! the token-exchange endpoint; the challenge (its SHA-256 digest) is what
//! travels in the authorization URL. `state` is an opaque anti-CSRF value the
//! redirect must echo back unchanged.

use std::path::PathBuf;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::storage::write_atomic;

/// Random bytes behind the code verifier. RFC 7636 requires 43-128 verifier
/// characters; 64 bytes encode to 86, comfortably inside the range.
pub const VERIFIER_BYTES: usize = 64;

/// Random bytes behind the anti-CSRF state value.
pub const STATE_BYTES: usize = 32;

/// One sign-in attempt's PKCE material. A single instance is outstanding at
/// a time; starting a new attempt overwrites it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkceData {
    pub code_verifier: String,
    pub code_challenge: String,
    pub state: String,
}

/// Generate a fresh verifier/challenge/state triple from the OS CSPRNG.
///
/// RNG unavailability is fatal (panics inside `rand`); there is no degraded
/// mode for credential material.
pub fn generate() -> PkceData {
    let mut verifier_bytes = [0u8; VERIFIER_BYTES];
    rand::rng().fill(&mut verifier_bytes);
    let code_verifier = URL_SAFE_NO_PAD.encode(verifier_bytes);

    let mut state_bytes = [0u8; STATE_BYTES];
    rand::rng().fill(&mut state_bytes);
    let state = URL_SAFE_NO_PAD.encode(state_bytes);

    let code_challenge = compute_challenge(&code_verifier);

    PkceData {
        code_verifier,
        code_challenge,
        state,
    }
}

/// Compute the S256 code challenge from a verifier.
///
/// `challenge = BASE64URL(SHA256(verifier))`
pub fn compute_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// On-disk form. Fields are optional so a truncated or hand-edited file can
/// be detected: a slot missing any of the three values loads as empty.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredSlot {
    #[serde(default)]
    code_verifier: Option<String>,
    #[serde(default)]
    code_challenge: Option<String>,
    #[serde(default)]
    state: Option<String>,
}

impl StoredSlot {
    fn into_data(self) -> Option<PkceData> {
        match (self.code_verifier, self.code_challenge, self.state) {
            (Some(v), Some(c), Some(s)) if !v.is_empty() && !c.is_empty() && !s.is_empty() => {
                Some(PkceData {
                    code_verifier: v,
                    code_challenge: c,
                    state: s,
                })
            }
            _ => None,
        }
    }
}

/// Single-slot persistence for the in-flight PKCE triple.
///
/// Last write wins. Partial or unreadable state is treated as absent rather
/// than surfaced to the caller: a redirect arriving against a broken slot is
/// rejected the same way as one arriving with no attempt in flight.
pub struct PkceStore {
    path: PathBuf,
    slot: Mutex<Option<PkceData>>,
}

impl PkceStore {
    /// Open the store at the given file path, loading any persisted attempt.
    pub async fn open(path: PathBuf) -> Result<Self> {
        let slot = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<StoredSlot>(&bytes) {
                Ok(raw) => {
                    let data = raw.into_data();
                    if data.is_none() {
                        debug!(path = %path.display(), "pkce slot incomplete, treating as empty");
                    }
                    data
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "pkce slot unreadable, treating as empty");
                    None
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(Error::Storage(format!("reading pkce store: {e}"))),
        };

        Ok(Self {
            path,
            slot: Mutex::new(slot),
        })
    }

    /// Persist a new in-flight attempt, overwriting any previous one.
    pub async fn store(&self, data: PkceData) -> Result<()> {
        let mut slot = self.slot.lock().await;
        let raw = StoredSlot {
            code_verifier: Some(data.code_verifier.clone()),
            code_challenge: Some(data.code_challenge.clone()),
            state: Some(data.state.clone()),
        };
        let json = serde_json::to_vec(&raw)
            .map_err(|e| Error::Storage(format!("serializing pkce slot: {e}")))?;
        write_atomic(&self.path, &json)
            .await
            .map_err(|e| Error::Storage(format!("writing pkce store: {e}")))?;
        *slot = Some(data);
        debug!("pkce attempt stored");
        Ok(())
    }

    /// The in-flight attempt, if one is pending and complete.
    pub async fn load(&self) -> Option<PkceData> {
        self.slot.lock().await.clone()
    }

    /// Drop the in-flight attempt. Idempotent.
    pub async fn clear(&self) -> Result<()> {
        let mut slot = self.slot.lock().await;
        *slot = None;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Storage(format!("clearing pkce store: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifier_and_state_are_url_safe_base64() {
        let data = generate();
        // 64 bytes → 86 chars, 32 bytes → 43 chars (no padding)
        assert_eq!(data.code_verifier.len(), 86);
        assert_eq!(data.state.len(), 43);
        for value in [&data.code_verifier, &data.state] {
            assert!(
                value
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
                "must be URL-safe base64 (no padding): {value}"
            );
        }
    }

    #[test]
    fn generated_values_are_distinct_across_calls() {
        let a = generate();
        let b = generate();
        assert_ne!(a.code_verifier, b.code_verifier, "verifiers must not collide");
        assert_ne!(a.state, b.state, "states must not collide");
    }

    #[test]
    fn challenge_is_digest_of_verifier() {
        let data = generate();
        assert_eq!(data.code_challenge, compute_challenge(&data.code_verifier));
    }

    #[test]
    fn challenge_matches_known_value() {
        // Pre-computed: SHA256("hello") = 2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824
        // base64url of those 32 bytes = LPJNul-wow4m6DsqxbninhsWHlwfp0JecwQzYpOLmCQ
        assert_eq!(
            compute_challenge("hello"),
            "LPJNul-wow4m6DsqxbninhsWHlwfp0JecwQzYpOLmCQ"
        );
    }

    #[test]
    fn challenge_decodes_to_32_bytes() {
        let challenge = compute_challenge(&generate().code_verifier);
        let decoded = URL_SAFE_NO_PAD.decode(&challenge).expect("valid base64url");
        assert_eq!(decoded.len(), 32, "SHA-256 digest must be 32 bytes");
    }

    #[tokio::test]
    async fn store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pkce.json");

        let store = PkceStore::open(path.clone()).await.unwrap();
        let data = generate();
        store.store(data.clone()).await.unwrap();

        // Reopen from disk
        let store2 = PkceStore::open(path).await.unwrap();
        assert_eq!(store2.load().await, Some(data));
    }

    #[tokio::test]
    async fn last_write_wins() {
        let dir = tempfile::tempdir().unwrap();
        let store = PkceStore::open(dir.path().join("pkce.json")).await.unwrap();

        let first = generate();
        let second = generate();
        store.store(first).await.unwrap();
        store.store(second.clone()).await.unwrap();

        assert_eq!(store.load().await, Some(second));
    }

    #[tokio::test]
    async fn clear_empties_slot_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pkce.json");
        let store = PkceStore::open(path.clone()).await.unwrap();

        store.store(generate()).await.unwrap();
        store.clear().await.unwrap();
        store.clear().await.unwrap();

        assert!(store.load().await.is_none());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn partial_slot_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pkce.json");
        tokio::fs::write(&path, r#"{"code_verifier":"abc","state":"xyz"}"#)
            .await
            .unwrap();

        let store = PkceStore::open(path).await.unwrap();
        assert!(store.load().await.is_none(), "missing challenge must fail closed");
    }

    #[tokio::test]
    async fn empty_field_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pkce.json");
        tokio::fs::write(
            &path,
            r#"{"code_verifier":"abc","code_challenge":"","state":"xyz"}"#,
        )
        .await
        .unwrap();

        let store = PkceStore::open(path).await.unwrap();
        assert!(store.load().await.is_none(), "empty challenge must fail closed");
    }

    #[tokio::test]
    async fn garbage_file_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pkce.json");
        tokio::fs::write(&path, b"not json {{{").await.unwrap();

        let store = PkceStore::open(path).await.unwrap();
        assert!(store.load().await.is_none());
    }
}
