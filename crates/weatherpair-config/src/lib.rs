// weatherpair-config - Runtime configuration for the synchronizer
//
// Supports configuration from multiple sources:
// 1. Environment variables (highest priority)
// 2. Config file path from WEATHERPAIR_CONFIG env var
// 3. Config file contents from WEATHERPAIR_CONFIG_CONTENT env var
// 4. Default config file locations (./config.toml, ./.weatherpair.toml)
// 5. Built-in defaults (lowest priority)
//
// CLI flags are applied on top by the binary.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

mod env_overrides;
mod sources;
mod validation;

pub use env_overrides::{EnvSource, ENV_PREFIX};

/// Main runtime configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub devices: DeviceConfig,

    #[serde(default)]
    pub request: RequestConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

/// Pairing window and capture time zone
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub pair_window_secs: u64,
    /// Offset from UTC applied to capture stamps.
    pub utc_offset_minutes: i32,
}

impl SyncSettings {
    pub fn pair_window(&self) -> Duration {
        Duration::from_secs(self.pair_window_secs)
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            pair_window_secs: 17,
            utc_offset_minutes: 60,
        }
    }
}

/// Identifiers the two sensors report under.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub first: String,
    pub second: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            first: "ATOM_001".to_string(),
            second: "ATOM_002".to_string(),
        }
    }
}

/// Request handling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    pub max_payload_bytes: usize,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: 64 * 1024,
        }
    }
}

/// Storage backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub sqlite: SqliteConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            sqlite: SqliteConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Sqlite,
    Memory,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackend::Sqlite => write!(f, "sqlite"),
            StorageBackend::Memory => write!(f, "memory"),
        }
    }
}

impl std::str::FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(StorageBackend::Sqlite),
            "memory" | "mem" => Ok(StorageBackend::Memory),
            _ => anyhow::bail!("Unsupported storage backend: {}. Supported: sqlite, memory", s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    pub path: String,
    pub busy_timeout_ms: u64,
}

impl SqliteConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: "weather_data.db".to_string(),
            busy_timeout_ms: 5000,
        }
    }
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:5000".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl RuntimeConfig {
    /// Load configuration from all sources with priority
    pub fn load() -> Result<Self> {
        sources::load_config()
    }

    /// Load configuration starting from a specific file (CLI `--config`).
    ///
    /// The result is not validated; call [`RuntimeConfig::validate`] once
    /// every override has been applied.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        sources::load_from_file_path(path)
    }

    /// Like [`RuntimeConfig::load`], but an unreadable default file falls back
    /// to built-in defaults. Not validated, like
    /// [`RuntimeConfig::load_from_path`].
    pub fn load_or_default() -> Result<Self> {
        sources::load_or_default()
    }

    /// Build a configuration from inline TOML plus overrides supplied by an
    /// `EnvSource`.
    pub fn load_with_env<E: EnvSource>(inline_config: Option<&str>, env: &E) -> Result<Self> {
        sources::load_with_env(inline_config, env)
    }

    /// Replace every section with the one from `other`.
    ///
    /// Sections missing from a parsed file deserialize to their defaults, so
    /// this is equivalent to a per-section overlay.
    pub fn merge(&mut self, other: RuntimeConfig) {
        self.sync = other.sync;
        self.devices = other.devices;
        self.request = other.request;
        self.storage = other.storage;
        self.server = other.server;
    }

    /// Apply environment overrides from a custom source.
    pub fn apply_env_overrides_from<E: EnvSource>(&mut self, env: &E) -> Result<()> {
        env_overrides::apply_env_overrides(self, env)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}
