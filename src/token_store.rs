use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "token store IO error: {}", e),
            StoreError::Json(e) => write!(f, "token store JSON error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Json(err)
    }
}

/// Cached token pair for one account. An entry may hold an access token
/// without a refresh token; such a credential is usable until the next 401,
/// at which point it gets deleted rather than refreshed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub last_update: DateTime<Utc>,
}

struct Inner {
    path: PathBuf,
    cache: HashMap<String, Credential>,
}

/// Durable account → credential map, backed by a single JSON file.
///
/// The handle is cheap to clone and safe to share across group workers:
/// writes are keyed per account and no two workers ever own the same account,
/// so last-writer-wins on the file is acceptable.
#[derive(Clone)]
pub struct TokenStore {
    inner: Arc<Mutex<Inner>>,
}

impl TokenStore {
    pub fn open(path: PathBuf) -> Result<TokenStore, StoreError> {
        let cache = if path.exists() {
            serde_json::from_str(&fs::read_to_string(&path)?)?
        } else {
            HashMap::new()
        };
        Ok(TokenStore {
            inner: Arc::new(Mutex::new(Inner { path, cache })),
        })
    }

    pub fn load(&self, account: &str) -> Option<Credential> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.cache.get(account).cloned()
    }

    pub fn save(
        &self,
        account: &str,
        access_token: Option<&str>,
        refresh_token: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.cache.insert(
            account.to_string(),
            Credential {
                access_token: access_token.map(str::to_string),
                refresh_token: refresh_token.map(str::to_string),
                last_update: Utc::now(),
            },
        );
        flush(&inner)
    }

    pub fn delete(&self, account: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.cache.remove(account).is_none() {
            return Ok(());
        }
        flush(&inner)
    }

    /// Like `delete`, but a failed write only warns. Used on auth-failure
    /// paths where the caller has nothing useful to do with a store error.
    pub fn delete_logged(&self, account: &str) {
        if let Err(e) = self.delete(account) {
            warn!("{}: failed to delete cached credential: {}", account, e);
        }
    }
}

impl TokenStore {
    /// Inserts a credential verbatim, bypassing the `last_update` stamp.
    #[cfg(test)]
    pub fn insert_raw(&self, account: &str, credential: Credential) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.cache.insert(account.to_string(), credential);
    }
}

fn flush(inner: &Inner) -> Result<(), StoreError> {
    let raw = serde_json::to_string_pretty(&inner.cache)?;
    fs::write(&inner.path, raw)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(dir: &tempfile::TempDir) -> TokenStore {
        TokenStore::open(dir.path().join("tokens.json")).unwrap()
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir);
        store.save("x", Some("a1"), Some("r1")).unwrap();
        let cred = store.load("x").unwrap();
        assert_eq!(cred.access_token.as_deref(), Some("a1"));
        assert_eq!(cred.refresh_token.as_deref(), Some("r1"));
    }

    #[test]
    fn delete_then_load_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir);
        store.save("x", Some("a1"), Some("r1")).unwrap();
        store.delete("x").unwrap();
        assert!(store.load("x").is_none());
        // Deleting a missing entry is a no-op.
        store.delete("x").unwrap();
    }

    #[test]
    fn credentials_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        {
            let store = TokenStore::open(path.clone()).unwrap();
            store.save("x", Some("a1"), None).unwrap();
        }
        let store = TokenStore::open(path).unwrap();
        let cred = store.load("x").unwrap();
        assert_eq!(cred.access_token.as_deref(), Some("a1"));
        assert!(cred.refresh_token.is_none());
    }

    #[test]
    fn entries_are_keyed_per_account() {
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir);
        store.save("x", Some("ax"), Some("rx")).unwrap();
        store.save("y", Some("ay"), Some("ry")).unwrap();
        store.delete("x").unwrap();
        assert!(store.load("x").is_none());
        assert_eq!(store.load("y").unwrap().access_token.as_deref(), Some("ay"));
    }
}
