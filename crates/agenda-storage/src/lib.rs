//! Credential persistence for agenda-tools.
//!
//! Secrets live in a plain `KEY=value` text file (the same shape the MCP
//! host injects as environment variables). Updates rewrite matching keys in
//! place, append keys the file has not seen, and preserve comments and blank
//! lines, so a hand-edited credentials file survives token rotation intact.
//!
//! # Example
//!
//! ```ignore
//! use agenda_storage::{CredentialStore, EnvFileStore};
//!
//! let store = EnvFileStore::new("/home/me/.config/agenda-tools/credentials.env");
//! store.store("GOOGLE_REFRESH_TOKEN", "1//xyz")?;
//! let token = store.get("GOOGLE_REFRESH_TOKEN")?;
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use agenda_core::{CredentialSink, Error, Result};
use tracing::{debug, warn};

/// Directory under the user config dir holding the credentials file.
const CONFIG_DIR_NAME: &str = "agenda-tools";

/// Default credentials file name.
const CREDENTIALS_FILE_NAME: &str = "credentials.env";

/// Credential storage.
///
/// Implementations can use the env-style file, in-memory storage (for
/// testing), or other backends.
pub trait CredentialStore: Send + Sync {
    /// Store a credential, overwriting any existing value.
    fn store(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieve a stored credential. Returns `Ok(None)` if absent.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Delete a stored credential. Succeeds even if it did not exist.
    fn delete(&self, key: &str) -> Result<()>;

    /// Check whether a credential exists.
    fn exists(&self, key: &str) -> bool {
        matches!(self.get(key), Ok(Some(_)))
    }
}

// =============================================================================
// EnvFileStore - KEY=value file implementation
// =============================================================================

/// Credential store backed by a `KEY=value` text file.
///
/// The file is created with owner-only permissions (0o600 on unix). Comment
/// lines (`# ...`) and blank lines are preserved across updates.
#[derive(Debug)]
pub struct EnvFileStore {
    path: PathBuf,
}

impl EnvFileStore {
    /// Create a store over the given file path. The file does not need to
    /// exist yet; the first write creates it.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store over the default location,
    /// `<user config dir>/agenda-tools/credentials.env`.
    pub fn default_location() -> Result<Self> {
        let dir = dirs::config_dir()
            .ok_or_else(|| Error::Storage("Could not determine config directory".to_string()))?
            .join(CONFIG_DIR_NAME);
        Ok(Self::new(dir.join(CREDENTIALS_FILE_NAME)))
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_lines(&self) -> Result<Vec<String>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&self.path)
            .map_err(|e| Error::Storage(format!("Failed to read {}: {e}", self.path.display())))?;
        Ok(contents.lines().map(str::to_string).collect())
    }

    fn write_lines(&self, lines: &[String]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::Storage(format!("Failed to create {}: {e}", parent.display()))
            })?;
        }

        let mut contents = lines.join("\n");
        contents.push('\n');
        fs::write(&self.path, contents)
            .map_err(|e| Error::Storage(format!("Failed to write {}: {e}", self.path.display())))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600)).map_err(|e| {
                Error::Storage(format!(
                    "Failed to set permissions on {}: {e}",
                    self.path.display()
                ))
            })?;
        }

        Ok(())
    }

    /// Update several keys in one read-rewrite pass.
    pub fn store_many(&self, pairs: &[(&str, &str)]) -> Result<()> {
        let mut lines = self.read_lines()?;
        for (key, value) in pairs {
            upsert_line(&mut lines, key, value);
        }
        self.write_lines(&lines)?;
        debug!(path = %self.path.display(), keys = pairs.len(), "Updated credentials file");
        Ok(())
    }
}

/// Rewrite the `key=` line in place, or append one.
fn upsert_line(lines: &mut Vec<String>, key: &str, value: &str) {
    let entry = format!("{key}={value}");
    for line in lines.iter_mut() {
        if line_key(line) == Some(key) {
            *line = entry;
            return;
        }
    }
    lines.push(entry);
}

/// Key of a `KEY=value` line; `None` for comments and blank lines.
fn line_key(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    trimmed.split_once('=').map(|(key, _)| key.trim())
}

impl CredentialStore for EnvFileStore {
    fn store(&self, key: &str, value: &str) -> Result<()> {
        self.store_many(&[(key, value)])
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        for line in self.read_lines()? {
            if line_key(&line) == Some(key) {
                let value = line
                    .split_once('=')
                    .map(|(_, v)| v.trim().to_string())
                    .unwrap_or_default();
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut lines = self.read_lines()?;
        let before = lines.len();
        lines.retain(|line| line_key(line) != Some(key));
        if lines.len() != before {
            self.write_lines(&lines)?;
        }
        Ok(())
    }
}

// =============================================================================
// MemoryStore - In-memory implementation for testing
// =============================================================================

/// In-memory credential store for tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    credentials: std::sync::RwLock<std::collections::HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with credentials.
    pub fn with_credentials(credentials: impl IntoIterator<Item = (String, String)>) -> Self {
        let store = Self::new();
        {
            let mut creds = store.credentials.write().unwrap();
            creds.extend(credentials);
        }
        store
    }
}

impl CredentialStore for MemoryStore {
    fn store(&self, key: &str, value: &str) -> Result<()> {
        let mut creds = self
            .credentials
            .write()
            .map_err(|e| Error::Storage(format!("Lock poisoned: {e}")))?;
        creds.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let creds = self
            .credentials
            .read()
            .map_err(|e| Error::Storage(format!("Lock poisoned: {e}")))?;
        Ok(creds.get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut creds = self
            .credentials
            .write()
            .map_err(|e| Error::Storage(format!("Lock poisoned: {e}")))?;
        creds.remove(key);
        Ok(())
    }
}

// =============================================================================
// Token persistence bridge
// =============================================================================

/// Bridges a [`CredentialStore`] into the auth manager's [`CredentialSink`],
/// mapping the refreshed pair onto configurable keys.
pub struct TokenPersistence {
    store: Arc<dyn CredentialStore>,
    access_key: String,
    refresh_key: String,
}

impl TokenPersistence {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        access_key: impl Into<String>,
        refresh_key: impl Into<String>,
    ) -> Self {
        Self {
            store,
            access_key: access_key.into(),
            refresh_key: refresh_key.into(),
        }
    }
}

impl CredentialSink for TokenPersistence {
    fn persist_tokens(&self, access_token: &str, refresh_token: &str) -> Result<()> {
        self.store.store(&self.access_key, access_token)?;
        if let Err(e) = self.store.store(&self.refresh_key, refresh_token) {
            warn!(error = %e, "Stored access token but failed to store refresh token");
            return Err(e);
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
