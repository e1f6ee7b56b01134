//! Last-known-good endpoint cache.
//!
//! Persisted as a small JSON document so it survives restarts.

use std::path::{Path, PathBuf};

use tracing::debug;

use tether_protocol::Endpoint;

/// Errors from the endpoint cache.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Persistence for the last endpoint that resolved successfully.
pub trait ConfigStore: Send + Sync + 'static {
    /// Returns the cached endpoint, if any.
    fn load(&self) -> Result<Option<Endpoint>, StoreError>;

    /// Replaces the cached endpoint.
    fn save(&self, endpoint: &Endpoint) -> Result<(), StoreError>;
}

/// JSON file backed [`ConfigStore`].
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for FileStore {
    fn load(&self) -> Result<Option<Endpoint>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&self.path)?;
        let endpoint: Endpoint = serde_json::from_str(&data)?;
        debug!(%endpoint, path = ?self.path, "loaded cached endpoint");
        Ok(Some(endpoint))
    }

    fn save(&self, endpoint: &Endpoint) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(endpoint)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, json)?;
        set_permissions_0600(&self.path);
        debug!(%endpoint, path = ?self.path, "persisted endpoint");
        Ok(())
    }
}

fn set_permissions_0600(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
}

/// Returns the default cache path.
pub fn default_cache_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("tether").join("endpoint.json"))
}

/// Returns the platform-specific config directory.
fn config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
    }

    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA").ok().map(PathBuf::from)
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join(".config"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> (tempfile::TempDir, FileStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileStore::new(tmp.path().join("endpoint.json"));
        (tmp, store)
    }

    #[test]
    fn missing_file_loads_none() {
        let (_tmp, store) = test_store();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn save_and_load() {
        let (_tmp, store) = test_store();
        let ep = Endpoint::new("10.0.0.5", 9000).unwrap();
        store.save(&ep).unwrap();
        assert_eq!(store.load().unwrap(), Some(ep));
    }

    #[test]
    fn save_overwrites_previous() {
        let (_tmp, store) = test_store();
        store.save(&Endpoint::new("10.0.0.1", 8080).unwrap()).unwrap();
        store.save(&Endpoint::new("10.0.0.5", 9000).unwrap()).unwrap();
        assert_eq!(
            store.load().unwrap(),
            Some(Endpoint::new("10.0.0.5", 9000).unwrap())
        );
    }

    #[test]
    fn survives_a_new_store_instance() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("endpoint.json");

        FileStore::new(path.clone())
            .save(&Endpoint::new("relay.example.net", 7000).unwrap())
            .unwrap();

        let reopened = FileStore::new(path);
        assert_eq!(
            reopened.load().unwrap(),
            Some(Endpoint::new("relay.example.net", 7000).unwrap())
        );
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let (_tmp, store) = test_store();
        std::fs::write(store.path(), "{\"host\": \"\", \"port\": 0}").unwrap();
        assert!(matches!(store.load(), Err(StoreError::Json(_))));

        std::fs::write(store.path(), "garbage").unwrap();
        assert!(store.load().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn saved_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let (_tmp, store) = test_store();
        store.save(&Endpoint::new("10.0.0.1", 8080).unwrap()).unwrap();
        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn default_path_mentions_tether() {
        if let Some(path) = default_cache_path() {
            assert!(path.ends_with("tether/endpoint.json"));
        }
    }
}
