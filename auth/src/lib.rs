//! API credential handling for nim-bench
//!
//! The NGC API key is kept as a single plaintext line in a file
//! (`.ngc_api_key` by default). [`resolve`] picks the key for a run from an
//! explicit value, the `NGC_API_KEY` environment variable or the file, in
//! that order. The resolved key is passed around as a
//! [`nim_bench_core::ApiKey`]; it is never written back into the process
//! environment.

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::path::{Path, PathBuf};

use nim_bench_core::ApiKey;
use thiserror::Error;

/// Credential file used when no path is configured
pub const DEFAULT_CREDENTIAL_PATH: &str = ".ngc_api_key";

/// Environment variable consulted before the credential file
pub const API_KEY_ENV: &str = "NGC_API_KEY";

/// Errors from the credential store
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The credential file could not be read or written
    #[error("cannot {action} credential file {}: {source}", path.display())]
    Io {
        /// What was being attempted
        action: &'static str,
        /// Credential file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The value to store was blank
    #[error("API key must not be empty")]
    Empty,

    /// No key was found anywhere
    #[error("no API key configured; set one from the menu or export {API_KEY_ENV}")]
    Missing,
}

/// Where a resolved key came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    /// Passed on the command line
    Explicit,
    /// Read from `NGC_API_KEY`
    Environment,
    /// Read from the credential file
    File,
}

impl std::fmt::Display for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            KeySource::Explicit => "command line",
            KeySource::Environment => API_KEY_ENV,
            KeySource::File => "credential file",
        })
    }
}

/// Single-line credential file
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// Store backed by `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored key
    ///
    /// A missing or blank file yields `None`.
    pub fn load(&self) -> Result<Option<ApiKey>, CredentialError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(contents.lines().next().and_then(ApiKey::new)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_error("read", e)),
        }
    }

    /// Store `raw`, replacing any previous key
    pub fn save(&self, raw: &str) -> Result<ApiKey, CredentialError> {
        let key = ApiKey::new(raw).ok_or(CredentialError::Empty)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error("create", e))?;
        }
        std::fs::write(&self.path, format!("{}\n", key.expose()))
            .map_err(|e| self.io_error("write", e))?;
        restrict_permissions(&self.path);
        tracing::info!(path = %self.path.display(), key = %key.masked(), "Saved API key");
        Ok(key)
    }

    fn io_error(&self, action: &'static str, source: std::io::Error) -> CredentialError {
        CredentialError::Io {
            action,
            path: self.path.clone(),
            source,
        }
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)) {
        tracing::warn!(error = %e, "Could not restrict credential file permissions");
    }
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) {}

/// Pick the key for this run
///
/// An explicit value wins over `env_value`, which wins over the file. Blank
/// values are ignored.
pub fn resolve(
    explicit: Option<&str>,
    env_value: Option<&str>,
    store: &CredentialStore,
) -> Result<(ApiKey, KeySource), CredentialError> {
    if let Some(key) = explicit.and_then(ApiKey::new) {
        return Ok((key, KeySource::Explicit));
    }
    if let Some(key) = env_value.and_then(ApiKey::new) {
        return Ok((key, KeySource::Environment));
    }
    store
        .load()?
        .map(|key| (key, KeySource::File))
        .ok_or(CredentialError::Missing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> CredentialStore {
        CredentialStore::new(dir.path().join(DEFAULT_CREDENTIAL_PATH))
    }

    #[test]
    fn test_missing_file_loads_none() {
        let dir = TempDir::new().unwrap();
        assert!(store(&dir).load().unwrap().is_none());
    }

    #[test]
    fn test_blank_file_loads_none() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        std::fs::write(store.path(), "   \n").unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.save("  nvapi-first  ").unwrap();
        assert_eq!(store.load().unwrap().unwrap().expose(), "nvapi-first");

        store.save("nvapi-rotated").unwrap();
        assert_eq!(store.load().unwrap().unwrap().expose(), "nvapi-rotated");
        assert_eq!(
            std::fs::read_to_string(store.path()).unwrap(),
            "nvapi-rotated\n"
        );
    }

    #[test]
    fn test_save_rejects_blank() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert!(matches!(store.save("  "), Err(CredentialError::Empty)));
        assert!(!store.path().exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_saved_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.save("nvapi-secret").unwrap();
        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_resolve_precedence() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.save("nvapi-file").unwrap();

        let (key, source) = resolve(Some("nvapi-cli"), Some("nvapi-env"), &store).unwrap();
        assert_eq!((key.expose(), source), ("nvapi-cli", KeySource::Explicit));

        let (key, source) = resolve(Some(" "), Some("nvapi-env"), &store).unwrap();
        assert_eq!((key.expose(), source), ("nvapi-env", KeySource::Environment));

        let (key, source) = resolve(None, None, &store).unwrap();
        assert_eq!((key.expose(), source), ("nvapi-file", KeySource::File));
    }

    #[test]
    fn test_resolve_missing() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            resolve(None, Some(""), &store(&dir)),
            Err(CredentialError::Missing)
        ));
    }
}
