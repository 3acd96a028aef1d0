//! Session storage for the authenticated client
//!
//! The session is three whole values under fixed keys: access token, refresh
//! token, serialized user profile. Stores expose plain get/set/remove plus a
//! wholesale `clear`; there is no TTL and no expiry sweep. Expiry is found
//! reactively when the backend answers 401.
//!
//! `FileSessionStore` writes the full map with temp-file + rename so a crash
//! never leaves a torn session file. A tokio Mutex serializes writers.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};

use common::Secret;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::profile::UserProfile;

/// The fixed set of keys a session is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SessionKey {
    #[serde(rename = "accessToken")]
    AccessToken,
    #[serde(rename = "refreshToken")]
    RefreshToken,
    #[serde(rename = "userProfile")]
    UserProfile,
}

impl SessionKey {
    pub const ALL: [SessionKey; 3] = [
        SessionKey::AccessToken,
        SessionKey::RefreshToken,
        SessionKey::UserProfile,
    ];

    /// Persistence key name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKey::AccessToken => "accessToken",
            SessionKey::RefreshToken => "refreshToken",
            SessionKey::UserProfile => "userProfile",
        }
    }
}

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Key-value persistence boundary for the session.
///
/// Passed to the API client as `Arc<dyn SessionStore>`; every reader fetches
/// from the store at call time. Uses `Pin<Box<dyn Future>>` return types for
/// dyn-compatibility.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: SessionKey) -> StoreFuture<'_, Option<String>>;

    /// Overwrite the whole value under `key`.
    fn set(&self, key: SessionKey, value: String) -> StoreFuture<'_, ()>;

    fn remove(&self, key: SessionKey) -> StoreFuture<'_, ()>;

    /// Remove access token, refresh token and profile.
    fn clear(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            for key in SessionKey::ALL {
                self.remove(key).await?;
            }
            Ok(())
        })
    }
}

/// In-process session store.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    state: Mutex<BTreeMap<SessionKey, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held.
    pub async fn len(&self) -> usize {
        self.state.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: SessionKey) -> StoreFuture<'_, Option<String>> {
        Box::pin(async move { Ok(self.state.lock().await.get(&key).cloned()) })
    }

    fn set(&self, key: SessionKey, value: String) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.state.lock().await.insert(key, value);
            Ok(())
        })
    }

    fn remove(&self, key: SessionKey) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.state.lock().await.remove(&key);
            Ok(())
        })
    }

    fn clear(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.state.lock().await.clear();
            Ok(())
        })
    }
}

/// JSON-file session store, the CLI's counterpart of browser local storage.
///
/// The file holds `{"accessToken": ..., "refreshToken": ..., "userProfile": ...}`
/// with absent keys omitted. Reads are served from memory; every write
/// persists the whole map.
pub struct FileSessionStore {
    path: PathBuf,
    state: Mutex<BTreeMap<SessionKey, String>>,
}

impl FileSessionStore {
    /// Load the session file at `path`.
    ///
    /// A missing file is an empty session and is created as `{}`.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Store(format!("reading session file: {e}")))?;
            let state: BTreeMap<SessionKey, String> = serde_json::from_str(&contents)
                .map_err(|e| Error::Store(format!("parsing session file: {e}")))?;
            info!(path = %path.display(), keys = state.len(), "loaded session");
            state
        } else {
            info!(path = %path.display(), "session file not found, starting signed out");
            let state = BTreeMap::new();
            if let Some(dir) = path.parent()
                && !dir.as_os_str().is_empty()
            {
                tokio::fs::create_dir_all(dir)
                    .await
                    .map_err(|e| Error::Store(format!("creating session directory: {e}")))?;
            }
            write_atomic(&path, &state).await?;
            state
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

}

impl SessionStore for FileSessionStore {
    fn get(&self, key: SessionKey) -> StoreFuture<'_, Option<String>> {
        Box::pin(async move { Ok(self.state.lock().await.get(&key).cloned()) })
    }

    fn set(&self, key: SessionKey, value: String) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let mut next = state.clone();
            next.insert(key, value);
            write_atomic(&self.path, &next).await?;
            *state = next;
            debug!(key = key.as_str(), "session key set");
            Ok(())
        })
    }

    fn remove(&self, key: SessionKey) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            if !state.contains_key(&key) {
                return Ok(());
            }
            let mut next = state.clone();
            next.remove(&key);
            write_atomic(&self.path, &next).await?;
            *state = next;
            debug!(key = key.as_str(), "session key removed");
            Ok(())
        })
    }

    fn clear(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let empty = BTreeMap::new();
            write_atomic(&self.path, &empty).await?;
            *state = empty;
            debug!("session cleared");
            Ok(())
        })
    }
}

/// Distinguishes temp files of stores sharing a directory in one process.
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Write the session map atomically with 0600 permissions on unix.
async fn write_atomic(path: &Path, data: &BTreeMap<SessionKey, String>) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::Store(format!("serializing session: {e}")))?;

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
    let tmp_path = dir.join(format!(".session.tmp.{}.{seq}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Store(format!("writing temp session file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Store(format!("setting session file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Store(format!("renaming temp session file: {e}")))?;

    debug!(path = %path.display(), "persisted session");
    Ok(())
}

/// Current access token, if signed in.
pub async fn access_token(store: &dyn SessionStore) -> Result<Option<Secret<String>>> {
    Ok(store
        .get(SessionKey::AccessToken)
        .await?
        .filter(|t| !t.is_empty())
        .map(Secret::new))
}

/// Current refresh token, if any.
pub async fn refresh_token(store: &dyn SessionStore) -> Result<Option<Secret<String>>> {
    Ok(store
        .get(SessionKey::RefreshToken)
        .await?
        .filter(|t| !t.is_empty())
        .map(Secret::new))
}

/// Stored user profile, parsed.
///
/// Absent key is `Ok(None)`; a value that does not parse is `ProfileParse`.
pub async fn user_profile(store: &dyn SessionStore) -> Result<Option<UserProfile>> {
    match store.get(SessionKey::UserProfile).await? {
        Some(raw) => UserProfile::from_json(&raw).map(Some),
        None => Ok(None),
    }
}

/// Persist a freshly issued session.
///
/// The profile is stored verbatim as JSON. A login without a profile removes
/// any stale profile left by a previous user.
pub async fn begin(
    store: &dyn SessionStore,
    access: &Secret<String>,
    refresh: &Secret<String>,
    profile: Option<&serde_json::Value>,
) -> Result<()> {
    store
        .set(SessionKey::AccessToken, access.expose().clone())
        .await?;
    store
        .set(SessionKey::RefreshToken, refresh.expose().clone())
        .await?;
    match profile {
        Some(profile) => {
            store
                .set(SessionKey::UserProfile, profile.to_string())
                .await?
        }
        None => store.remove(SessionKey::UserProfile).await?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    #[tokio::test]
    async fn memory_store_get_set_remove() {
        let store = MemorySessionStore::new();
        assert_eq!(store.get(SessionKey::AccessToken).await.unwrap(), None);

        store
            .set(SessionKey::AccessToken, "at_1".into())
            .await
            .unwrap();
        assert_eq!(
            store.get(SessionKey::AccessToken).await.unwrap().as_deref(),
            Some("at_1")
        );

        store
            .set(SessionKey::AccessToken, "at_2".into())
            .await
            .unwrap();
        assert_eq!(
            store.get(SessionKey::AccessToken).await.unwrap().as_deref(),
            Some("at_2")
        );

        store.remove(SessionKey::AccessToken).await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn memory_store_clear_removes_all_keys() {
        let store = MemorySessionStore::new();
        let access = Secret::from("at_1");
        let refresh = Secret::from("rt_1");
        let profile = serde_json::json!({"id": 1, "email": "a@gym.test", "role": "coach"});
        begin(&store, &access, &refresh, Some(&profile))
            .await
            .unwrap();
        assert_eq!(store.len().await, 3);

        store.clear().await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn default_clear_goes_through_remove() {
        /// Store that only implements the required methods.
        #[derive(Default)]
        struct Minimal(Mutex<HashMap<SessionKey, String>>);

        impl SessionStore for Minimal {
            fn get(&self, key: SessionKey) -> StoreFuture<'_, Option<String>> {
                Box::pin(async move { Ok(self.0.lock().await.get(&key).cloned()) })
            }
            fn set(&self, key: SessionKey, value: String) -> StoreFuture<'_, ()> {
                Box::pin(async move {
                    self.0.lock().await.insert(key, value);
                    Ok(())
                })
            }
            fn remove(&self, key: SessionKey) -> StoreFuture<'_, ()> {
                Box::pin(async move {
                    self.0.lock().await.remove(&key);
                    Ok(())
                })
            }
        }

        let store = Minimal::default();
        for key in SessionKey::ALL {
            store.set(key, "x".into()).await.unwrap();
        }
        store.clear().await.unwrap();
        assert!(store.0.lock().await.is_empty());
    }

    #[tokio::test]
    async fn typed_accessors_ignore_empty_values() {
        let store = MemorySessionStore::new();
        store
            .set(SessionKey::AccessToken, String::new())
            .await
            .unwrap();
        assert!(access_token(&store).await.unwrap().is_none());
        assert!(refresh_token(&store).await.unwrap().is_none());
        assert!(user_profile(&store).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn begin_without_profile_drops_stale_profile() {
        let store = MemorySessionStore::new();
        store
            .set(
                SessionKey::UserProfile,
                r#"{"id":7,"email":"old@gym.test","role":"admin"}"#.into(),
            )
            .await
            .unwrap();

        begin(&store, &Secret::from("at"), &Secret::from("rt"), None)
            .await
            .unwrap();

        assert!(user_profile(&store).await.unwrap().is_none());
        assert_eq!(access_token(&store).await.unwrap().unwrap().expose(), "at");
        assert_eq!(refresh_token(&store).await.unwrap().unwrap().expose(), "rt");
    }

    #[tokio::test]
    async fn file_store_roundtrip_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = FileSessionStore::load(path.clone()).await.unwrap();
        store
            .set(SessionKey::AccessToken, "at_1".into())
            .await
            .unwrap();
        store
            .set(SessionKey::RefreshToken, "rt_1".into())
            .await
            .unwrap();

        let store2 = FileSessionStore::load(path).await.unwrap();
        assert_eq!(
            access_token(&store2).await.unwrap().unwrap().expose(),
            "at_1"
        );
        assert_eq!(
            refresh_token(&store2).await.unwrap().unwrap().expose(),
            "rt_1"
        );
    }

    #[tokio::test]
    async fn file_store_uses_camel_case_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = FileSessionStore::load(path.clone()).await.unwrap();
        store
            .set(SessionKey::AccessToken, "at_1".into())
            .await
            .unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: HashMap<String, String> = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed.get("accessToken").map(String::as_str), Some("at_1"));
    }

    #[tokio::test]
    async fn file_store_cold_start_creates_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        assert!(!path.exists());
        let store = FileSessionStore::load(path.clone()).await.unwrap();
        assert!(store.get(SessionKey::AccessToken).await.unwrap().is_none());
        assert!(path.exists());

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: HashMap<String, String> = serde_json::from_str(&contents).unwrap();
        assert!(parsed.is_empty());
    }

    #[tokio::test]
    async fn file_store_clear_persists_empty_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = FileSessionStore::load(path.clone()).await.unwrap();
        for key in SessionKey::ALL {
            store.set(key, "v".into()).await.unwrap();
        }
        store.clear().await.unwrap();

        let reloaded = FileSessionStore::load(path).await.unwrap();
        for key in SessionKey::ALL {
            assert!(reloaded.get(key).await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn file_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        tokio::fs::write(&path, "not json").await.unwrap();

        let result = FileSessionStore::load(path).await;
        assert!(matches!(result, Err(Error::Store(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_permissions_are_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = FileSessionStore::load(path.clone()).await.unwrap();
        store
            .set(SessionKey::RefreshToken, "rt_1".into())
            .await
            .unwrap();

        let metadata = tokio::fs::metadata(&path).await.unwrap();
        let mode = metadata.permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "session file must be 0600, got {mode:o}");
    }

    #[tokio::test]
    async fn concurrent_writes_dont_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let store = Arc::new(FileSessionStore::load(path.clone()).await.unwrap());

        let mut handles = vec![];
        for i in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .set(SessionKey::AccessToken, format!("at_{i}"))
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: HashMap<String, String> = serde_json::from_str(&contents).unwrap();
        assert!(parsed["accessToken"].starts_with("at_"));
    }

    #[tokio::test]
    async fn failed_write_keeps_cached_session() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("state");
        let store = FileSessionStore::load(sub.join("session.json"))
            .await
            .unwrap();
        store
            .set(SessionKey::AccessToken, "at_saved".into())
            .await
            .unwrap();

        // Directory gone: every write fails from here on
        std::fs::remove_dir_all(&sub).unwrap();

        assert!(
            store
                .set(SessionKey::AccessToken, "at_unsaved".into())
                .await
                .is_err()
        );
        assert!(store.clear().await.is_err());
        assert!(store.remove(SessionKey::AccessToken).await.is_err());
        assert_eq!(
            store.get(SessionKey::AccessToken).await.unwrap().as_deref(),
            Some("at_saved"),
            "memory must match the last successful write"
        );
    }

    #[tokio::test]
    async fn stores_sharing_a_directory_write_concurrently() {
        let dir = tempfile::tempdir().unwrap();
        let a = Arc::new(
            FileSessionStore::load(dir.path().join("a.json"))
                .await
                .unwrap(),
        );
        let b = Arc::new(
            FileSessionStore::load(dir.path().join("b.json"))
                .await
                .unwrap(),
        );

        let mut handles = vec![];
        for i in 0..20 {
            let store = if i % 2 == 0 { a.clone() } else { b.clone() };
            handles.push(tokio::spawn(async move {
                store
                    .set(SessionKey::RefreshToken, format!("rt_{i}"))
                    .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        for name in ["a.json", "b.json"] {
            let contents = tokio::fs::read_to_string(dir.path().join(name))
                .await
                .unwrap();
            let parsed: HashMap<String, String> = serde_json::from_str(&contents).unwrap();
            assert!(parsed["refreshToken"].starts_with("rt_"), "{name}: {contents}");
        }
        let leftovers = std::fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .starts_with(".session.tmp")
            })
            .count();
        assert_eq!(leftovers, 0);
    }
}
