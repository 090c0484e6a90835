//! OAuth credentials and their on-disk cache.
//!
//! A [`Credential`] is persisted through a [`CredentialStore`]. The file
//! store keeps exactly one JSON record per path; every save overwrites it.
//! Tests can swap in a [`MemoryCredentialStore`].

use crate::error::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Seconds before the recorded expiry at which a credential stops being used.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// An OAuth access token with its refresh token and expiry.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Bearer token sent with mail API calls.
    pub access_token: String,
    /// Token type reported by the token endpoint (usually `Bearer`).
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Refresh token, when the grant issued one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// When the access token expires. `None` means unknown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl Credential {
    /// Creates a bearer credential with no refresh token and no expiry.
    #[must_use]
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: default_token_type(),
            refresh_token: None,
            expiry: None,
        }
    }

    /// Sets the refresh token.
    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Sets the expiry time.
    #[must_use]
    pub fn with_expiry(mut self, expiry: DateTime<Utc>) -> Self {
        self.expiry = Some(expiry);
        self
    }

    /// Returns `true` if the access token is expired or about to expire.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expiry
            .is_some_and(|exp| Utc::now() + Duration::seconds(EXPIRY_MARGIN_SECS) >= exp)
    }

    /// Returns `true` if the credential can be sent as-is.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.access_token.is_empty() && !self.is_expired()
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expiry", &self.expiry)
            .finish()
    }
}

/// Persistence for the single credential of a mailbox.
pub trait CredentialStore: Send + Sync {
    /// Loads the stored credential.
    ///
    /// A missing or unreadable record yields `None`.
    fn load(&self) -> Option<Credential>;

    /// Stores `credential`, replacing any previous record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TokenCache`] if the record cannot be written.
    fn save(&self, credential: &Credential) -> Result<()>;
}

/// Credential store backed by a JSON file.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// File name of the default token cache.
    pub const DEFAULT_FILE_NAME: &'static str = "mail-link-token.json";

    /// Creates a store that reads and writes `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the per-user default cache path, `~/.credentials/mail-link-token.json`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the home directory cannot be determined.
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or_else(|| Error::InvalidConfig {
            message: "cannot determine home directory for the token cache".into(),
        })?;
        Ok(home.join(".credentials").join(Self::DEFAULT_FILE_NAME))
    }

    /// Returns the cache file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_record(&self, content: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                create_private_dir(parent)?;
            }
        }
        let mut file = open_private_file(&self.path)?;
        file.write_all(content)?;
        file.sync_all()
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Option<Credential> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No cached credential");
                return None;
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Unreadable token cache, ignoring");
                return None;
            }
        };

        match serde_json::from_str::<Credential>(&content) {
            Ok(credential) if !credential.access_token.is_empty() => Some(credential),
            Ok(_) => {
                warn!(path = %self.path.display(), "Token cache has an empty access token, ignoring");
                None
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Corrupt token cache, ignoring");
                None
            }
        }
    }

    fn save(&self, credential: &Credential) -> Result<()> {
        let content = serde_json::to_vec_pretty(credential).map_err(|e| Error::TokenCache {
            path: self.path.clone(),
            source: e.into(),
        })?;

        self.write_record(&content)
            .map_err(|source| Error::TokenCache {
                path: self.path.clone(),
                source,
            })?;

        debug!(path = %self.path.display(), "Saved credential");
        Ok(())
    }
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)
}

#[cfg(unix)]
fn open_private_file(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_private_file(path: &Path) -> std::io::Result<fs::File> {
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

/// In-process credential store.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    slot: Mutex<Option<Credential>>,
}

impl MemoryCredentialStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `credential`.
    #[must_use]
    pub fn with_credential(credential: Credential) -> Self {
        Self {
            slot: Mutex::new(Some(credential)),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Option<Credential> {
        self.slot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn save(&self, credential: &Credential) -> Result<()> {
        *self
            .slot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(credential.clone());
        Ok(())
    }
}

impl<S: CredentialStore + ?Sized> CredentialStore for std::sync::Arc<S> {
    fn load(&self) -> Option<Credential> {
        (**self).load()
    }

    fn save(&self, credential: &Credential) -> Result<()> {
        (**self).save(credential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Credential {
        Credential::new("ya29.access")
            .with_refresh_token("1//refresh")
            .with_expiry(Utc::now() + Duration::seconds(3600))
    }

    #[test]
    fn test_validity() {
        assert!(Credential::new("token").is_valid());
        assert!(!Credential::new("").is_valid());

        let expired = Credential::new("token").with_expiry(Utc::now() - Duration::seconds(5));
        assert!(expired.is_expired());
        assert!(!expired.is_valid());

        // Inside the safety margin counts as expired
        let expiring = Credential::new("token").with_expiry(Utc::now() + Duration::seconds(30));
        assert!(expiring.is_expired());

        assert!(sample().is_valid());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("token.json"));
        let credential = sample();

        store.save(&credential).unwrap();
        assert_eq!(store.load(), Some(credential));
    }

    #[test]
    fn test_last_write_wins() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("token.json"));

        store.save(&sample()).unwrap();
        let newer = Credential::new("second");
        store.save(&newer).unwrap();

        assert_eq!(store.load(), Some(newer));
    }

    #[test]
    fn test_missing_file_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("nope.json"));
        assert_eq!(store.load(), None);
    }

    #[test]
    fn test_corrupt_file_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        fs::write(&path, "{not json").unwrap();
        assert_eq!(FileCredentialStore::new(&path).load(), None);

        fs::write(&path, r#"{"access_token": ""}"#).unwrap();
        assert_eq!(FileCredentialStore::new(&path).load(), None);
    }

    #[test]
    fn test_minimal_record_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        fs::write(&path, r#"{"access_token": "abc"}"#).unwrap();

        let credential = FileCredentialStore::new(&path).load().unwrap();
        assert_eq!(credential.token_type, "Bearer");
        assert!(credential.refresh_token.is_none());
        assert!(credential.expiry.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_creates_private_directory() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let cache_dir = dir.path().join(".credentials");
        let store = FileCredentialStore::new(cache_dir.join("token.json"));
        store.save(&sample()).unwrap();

        let dir_mode = fs::metadata(&cache_dir).unwrap().permissions().mode();
        assert_eq!(dir_mode & 0o777, 0o700);
        let file_mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(file_mode & 0o777, 0o600);
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryCredentialStore::new();
        assert_eq!(store.load(), None);
        store.save(&sample()).unwrap();
        assert_eq!(store.load().unwrap().access_token, "ya29.access");
    }

    #[test]
    fn test_tokens_not_in_debug() {
        let debug_str = format!("{:?}", sample());
        assert!(!debug_str.contains("ya29.access"));
        assert!(!debug_str.contains("1//refresh"));
        assert!(debug_str.contains("[REDACTED]"));
    }
}
