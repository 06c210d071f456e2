//! Durable client session: access token, refresh token and profile.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{error, warn};

pub const TOKEN_KEY: &str = "slotbook:token";
pub const REFRESH_TOKEN_KEY: &str = "slotbook:refresh_token";
pub const USER_KEY: &str = "slotbook:user";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    pub email: String,
    pub avatar_url: Option<String>,
}

/// String key-value storage for the session.
///
/// Implementations must be cheap to call from async code: reads happen on
/// every outgoing request.
pub trait SessionStore: Send + Sync + 'static {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);

    fn access_token(&self) -> Option<String> {
        self.get(TOKEN_KEY)
    }

    fn refresh_token(&self) -> Option<String> {
        self.get(REFRESH_TOKEN_KEY)
    }

    fn user(&self) -> Option<UserProfile> {
        let raw = self.get(USER_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                warn!(error = %e, "Stored user profile is unreadable");
                None
            }
        }
    }

    fn set_user(&self, user: &UserProfile) {
        match serde_json::to_string(user) {
            Ok(raw) => self.set(USER_KEY, &raw),
            Err(e) => error!(error = %e, "Failed to serialize user profile"),
        }
    }

    fn save_session(&self, access_token: &str, refresh_token: &str, user: &UserProfile) {
        self.set(TOKEN_KEY, access_token);
        self.set(REFRESH_TOKEN_KEY, refresh_token);
        self.set_user(user);
    }

    /// Drop all three entries together.
    fn clear_session(&self) {
        self.remove(TOKEN_KEY);
        self.remove(REFRESH_TOKEN_KEY);
        self.remove(USER_KEY);
    }
}

fn lock_entries(entries: &Mutex<HashMap<String, String>>) -> MutexGuard<'_, HashMap<String, String>> {
    // A panic while holding the lock cannot leave the map half-written.
    entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
pub struct MemorySessionStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Option<String> {
        lock_entries(&self.entries).get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        lock_entries(&self.entries).insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        lock_entries(&self.entries).remove(key);
    }
}

/// Session persisted as a JSON object in a file, rewritten on every change.
pub struct FileSessionStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileSessionStore {
    /// Open a store at `path`. A missing file starts an empty session; an
    /// unreadable one is logged and replaced on the next write.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, std::io::Error> {
        let path = path.as_ref().to_path_buf();

        let entries = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Session file is corrupt, starting empty");
                HashMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e),
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    fn tmp_path(&self) -> PathBuf {
        self.path.with_extension("json.tmp")
    }

    /// Write a sibling temp file, then rename it over the session file. A
    /// crash leaves either the old or the new session on disk.
    fn persist(&self, entries: &HashMap<String, String>) {
        let tmp_path = self.tmp_path();
        let result = serde_json::to_vec_pretty(entries)
            .map_err(std::io::Error::other)
            .and_then(|bytes| std::fs::write(&tmp_path, bytes))
            .and_then(|()| restrict_permissions(&tmp_path))
            .and_then(|()| std::fs::rename(&tmp_path, &self.path));

        if let Err(e) = result {
            error!(path = %self.path.display(), error = %e, "Failed to write session file");
        }
    }
}

/// Owner read/write only.
#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

impl SessionStore for FileSessionStore {
    fn get(&self, key: &str) -> Option<String> {
        lock_entries(&self.entries).get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let mut entries = lock_entries(&self.entries);
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries);
    }

    fn remove(&self, key: &str) {
        let mut entries = lock_entries(&self.entries);
        if entries.remove(key).is_some() {
            self.persist(&entries);
        }
    }
}
