//! Token storage and management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use crate::models::{Role, UserProfile};

/// Access/refresh pair as issued by login or refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Everything persisted about the signed-in account.
///
/// Key names match the storage keys used by the web front-end so a
/// credentials file can be read by either.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(rename = "accessToken", skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(rename = "refreshToken", skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(rename = "userId", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,
}

/// Token store trait for different storage backends.
///
/// Shared between concurrent requests, so every method takes `&self`.
/// Token strings are opaque and never validated.
pub trait TokenStore: Send + Sync {
    /// Snapshot of the current credentials.
    fn credentials(&self) -> Credentials;

    /// Apply `f` to the credentials as one step.
    fn update(&self, f: &mut dyn FnMut(&mut Credentials));

    fn access_token(&self) -> Option<String> {
        non_empty(self.credentials().access_token)
    }

    fn refresh_token(&self) -> Option<String> {
        non_empty(self.credentials().refresh_token)
    }

    fn user(&self) -> Option<UserProfile> {
        self.credentials().user
    }

    fn user_id(&self) -> Option<String> {
        non_empty(self.credentials().user_id)
    }

    fn role(&self) -> Option<Role> {
        self.user().map(|u| u.role)
    }

    fn is_logged_in(&self) -> bool {
        self.access_token().is_some()
    }

    /// Overwrite tokens and user in one step.
    fn set_auth(&self, access_token: String, refresh_token: String, user: UserProfile) {
        self.update(&mut |c| {
            c.access_token = Some(access_token.clone());
            c.refresh_token = Some(refresh_token.clone());
            c.user_id = Some(user.id.clone());
            c.user = Some(user.clone());
        });
    }

    /// Store a refreshed pair, keeping the user.
    fn set_tokens(&self, pair: &TokenPair) {
        self.update(&mut |c| {
            c.access_token = Some(pair.access_token.clone());
            c.refresh_token = Some(pair.refresh_token.clone());
        });
    }

    /// Remove tokens, user and user id together.
    fn clear_auth(&self) {
        self.update(&mut |c| *c = Credentials::default());
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn lock(inner: &Mutex<Credentials>) -> MutexGuard<'_, Credentials> {
    inner.lock().unwrap_or_else(|e| e.into_inner())
}

/// In-process store, used for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    inner: Mutex<Credentials>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(credentials: Credentials) -> Self {
        Self {
            inner: Mutex::new(credentials),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn credentials(&self) -> Credentials {
        lock(&self.inner).clone()
    }

    fn update(&self, f: &mut dyn FnMut(&mut Credentials)) {
        f(&mut lock(&self.inner));
    }
}

/// Store persisted to a TOML file, written on every mutation.
pub struct FileTokenStore {
    path: PathBuf,
    inner: Mutex<Credentials>,
}

impl FileTokenStore {
    /// Open the store at `path`; a missing file means signed out.
    pub fn open(path: PathBuf) -> Result<Self> {
        let credentials = if path.exists() {
            let content = fs::read_to_string(&path).context("Failed to read credentials file")?;
            toml::from_str(&content).context("Failed to parse credentials file")?
        } else {
            Credentials::default()
        };

        Ok(Self {
            path,
            inner: Mutex::new(credentials),
        })
    }

    fn persist(&self, credentials: &Credentials) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).context("Failed to create config directory")?;
        }

        let content =
            toml::to_string_pretty(credentials).context("Failed to serialize credentials")?;

        // Tokens never touch disk with looser permissions than 0600.
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options
            .open(&self.path)
            .context("Failed to open credentials file")?;

        // `mode` only applies on creation; tighten files left by older runs.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(0o600))
                .context("Failed to set credentials permissions")?;
        }

        file.write_all(content.as_bytes())
            .context("Failed to write credentials file")?;
        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn credentials(&self) -> Credentials {
        lock(&self.inner).clone()
    }

    fn update(&self, f: &mut dyn FnMut(&mut Credentials)) {
        let mut guard = lock(&self.inner);
        f(&mut guard);
        // In-memory state stays authoritative; a failed write only loses persistence.
        if let Err(e) = self.persist(&guard) {
            tracing::warn!("Could not persist credentials: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(role: Role) -> UserProfile {
        UserProfile {
            id: "u1".to_string(),
            name: "Asha".to_string(),
            email: "asha@example.com".to_string(),
            role,
        }
    }

    #[test]
    fn test_set_auth_overwrites_everything() {
        let store = MemoryTokenStore::new();
        store.set_auth("a1".into(), "r1".into(), profile(Role::Worker));
        store.set_auth("a2".into(), "r2".into(), profile(Role::Admin));

        assert_eq!(store.access_token().as_deref(), Some("a2"));
        assert_eq!(store.refresh_token().as_deref(), Some("r2"));
        assert_eq!(store.user_id().as_deref(), Some("u1"));
        assert_eq!(store.role(), Some(Role::Admin));
        assert!(store.is_logged_in());
    }

    #[test]
    fn test_clear_auth_removes_all_fields() {
        let store = MemoryTokenStore::new();
        store.set_auth("a1".into(), "r1".into(), profile(Role::User));
        store.clear_auth();

        assert_eq!(store.access_token(), None);
        assert_eq!(store.refresh_token(), None);
        assert_eq!(store.user(), None);
        assert_eq!(store.user_id(), None);
        assert!(!store.is_logged_in());
    }

    #[test]
    fn test_set_tokens_keeps_user() {
        let store = MemoryTokenStore::new();
        store.set_auth("a1".into(), "r1".into(), profile(Role::User));
        store.set_tokens(&TokenPair {
            access_token: "a2".into(),
            refresh_token: "r2".into(),
        });
        assert_eq!(store.access_token().as_deref(), Some("a2"));
        assert_eq!(store.user().map(|u| u.name), Some("Asha".to_string()));
    }

    #[test]
    fn test_empty_token_reads_as_absent() {
        let store = MemoryTokenStore::with_credentials(Credentials {
            access_token: Some(String::new()),
            refresh_token: Some("r1".into()),
            ..Default::default()
        });
        assert_eq!(store.access_token(), None);
        assert_eq!(store.refresh_token().as_deref(), Some("r1"));
    }

    #[test]
    fn test_file_store_round_trips_with_fixed_keys() {
        let path = std::env::temp_dir().join(format!(
            "workmarket-credentials-{}.toml",
            std::process::id()
        ));
        let _ = fs::remove_file(&path);

        let store = FileTokenStore::open(path.clone()).unwrap();
        store.set_auth("a1".into(), "r1".into(), profile(Role::Worker));

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("accessToken"));
        assert!(raw.contains("userId"));

        let reopened = FileTokenStore::open(path.clone()).unwrap();
        assert_eq!(reopened.refresh_token().as_deref(), Some("r1"));
        assert_eq!(reopened.role(), Some(Role::Worker));

        reopened.clear_auth();
        let cleared = FileTokenStore::open(path.clone()).unwrap();
        assert_eq!(cleared.credentials(), Credentials::default());

        let _ = fs::remove_file(&path);
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let path = std::env::temp_dir().join(format!(
            "workmarket-credentials-mode-{}.toml",
            std::process::id()
        ));
        // Pre-existing world-readable file gets tightened too.
        fs::write(&path, "").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        let store = FileTokenStore::open(path.clone()).unwrap();
        store.set_auth("a1".into(), "r1".into(), profile(Role::User));

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        let _ = fs::remove_file(&path);
    }
}
