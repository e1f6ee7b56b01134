//! Agent configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/tether/agent.toml`
//! - Windows: `%APPDATA%/tether/agent.toml`
//!
//! A path given on the command line takes precedence.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use tether_connection::{ManagerConfig, NETWORK_POLL_INTERVAL, ReconnectConfig};
use tether_protocol::constants::{
    BACKOFF_BASE, BACKOFF_CAP, CONNECT_TIMEOUT, HEARTBEAT_PERIOD, MAX_UPLOAD_BYTES,
    RESOLVE_TIMEOUT, UPLOAD_BATCH_LIMIT, UPLOAD_INTERVAL,
};
use tether_uploader::{DEFAULT_EXTENSIONS, UploaderConfig};

/// Agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Display name announced to the server (hostname by default).
    #[serde(default = "default_name")]
    pub name: String,

    /// Stable client id, generated on first run.
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// URL serving the `host:port` to connect to.
    #[serde(default)]
    pub config_url: Option<String>,

    /// Fixed `host:port`, used when no `config_url` is set.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Where the last resolved endpoint is cached.
    #[serde(default)]
    pub cache_path: Option<PathBuf>,

    /// Directory scanned for items to upload.
    #[serde(default = "default_media_dir")]
    pub media_dir: PathBuf,

    /// File extensions picked up from `media_dir` (empty = all files).
    #[serde(default = "default_media_extensions")]
    pub media_extensions: Vec<String>,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_resolve_timeout")]
    pub resolve_timeout_secs: u64,

    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_backoff_cap")]
    pub backoff_cap_ms: u64,

    #[serde(default = "default_upload_interval")]
    pub upload_interval_secs: u64,

    /// Maximum items uploaded per scan.
    #[serde(default = "default_upload_batch")]
    pub upload_batch: usize,

    /// Items of this size or larger are skipped.
    #[serde(default = "default_max_item_bytes")]
    pub max_item_bytes: u64,

    #[serde(default = "default_network_poll")]
    pub network_poll_secs: u64,
}

fn default_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "tether-client".into())
}

fn default_client_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_media_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
    PathBuf::from(home).join("Pictures")
}

fn default_media_extensions() -> Vec<String> {
    DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect()
}

fn default_connect_timeout() -> u64 {
    CONNECT_TIMEOUT.as_secs()
}

fn default_resolve_timeout() -> u64 {
    RESOLVE_TIMEOUT.as_secs()
}

fn default_heartbeat_interval() -> u64 {
    HEARTBEAT_PERIOD.as_secs()
}

fn default_backoff_base() -> u64 {
    BACKOFF_BASE.as_millis() as u64
}

fn default_backoff_cap() -> u64 {
    BACKOFF_CAP.as_millis() as u64
}

fn default_upload_interval() -> u64 {
    UPLOAD_INTERVAL.as_secs()
}

fn default_upload_batch() -> usize {
    UPLOAD_BATCH_LIMIT
}

fn default_max_item_bytes() -> u64 {
    MAX_UPLOAD_BYTES
}

fn default_network_poll() -> u64 {
    NETWORK_POLL_INTERVAL.as_secs()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: default_name(),
            client_id: default_client_id(),
            config_url: None,
            endpoint: None,
            cache_path: None,
            media_dir: default_media_dir(),
            media_extensions: default_media_extensions(),
            connect_timeout_secs: default_connect_timeout(),
            resolve_timeout_secs: default_resolve_timeout(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            backoff_base_ms: default_backoff_base(),
            backoff_cap_ms: default_backoff_cap(),
            upload_interval_secs: default_upload_interval(),
            upload_batch: default_upload_batch(),
            max_item_bytes: default_max_item_bytes(),
            network_poll_secs: default_network_poll(),
        }
    }
}

impl Config {
    /// Loads configuration from `path` (or the default location), creating
    /// it with defaults if not found.
    pub fn load(path: Option<PathBuf>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => p,
            None => config_path()?,
        };
        Self::load_from(&path)
    }

    fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let config: Config =
                toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
            // Persist a freshly generated client id.
            if !content.contains("client_id") {
                config.save_to(path)?;
            }
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Saves the configuration to `path`.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        // Restrict permissions on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs.max(1)),
            reconnect: ReconnectConfig {
                base: Duration::from_millis(self.backoff_base_ms),
                cap: Duration::from_millis(self.backoff_cap_ms),
            },
        }
    }

    pub fn uploader_config(&self) -> UploaderConfig {
        UploaderConfig {
            interval: Duration::from_secs(self.upload_interval_secs.max(1)),
            batch_limit: self.upload_batch,
            max_item_bytes: self.max_item_bytes,
        }
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout_secs)
    }

    pub fn network_poll(&self) -> Duration {
        Duration::from_secs(self.network_poll_secs.max(1))
    }
}

/// Returns the platform-specific configuration file path.
fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("tether")
            .join("agent.toml"))
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata).join("tether").join("agent.toml"))
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        Ok(PathBuf::from("/tmp/tether/agent.toml"))
    }
}
