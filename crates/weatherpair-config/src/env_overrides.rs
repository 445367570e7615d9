use super::{LogFormat, RuntimeConfig, StorageBackend};
use anyhow::{anyhow, Context, Result};
use std::str::FromStr;

pub const ENV_PREFIX: &str = "WEATHERPAIR_";

/// Abstraction over environment-variable lookups so tests can supply their
/// own source of overrides.
pub trait EnvSource {
    fn get(&self, key: &str) -> Option<String>;

    /// Get an environment variable WITHOUT the WEATHERPAIR_ prefix.
    /// Used for `DATABASE_PATH`, which existing deployments already set.
    fn get_raw(&self, key: &str) -> Option<String>;
}

/// Apply environment-variable overrides (highest priority) to the runtime config.
pub fn apply_env_overrides<E: EnvSource>(config: &mut RuntimeConfig, env: &E) -> Result<()> {
    // Pairing
    if let Some(val) = get_env_parsed::<u64, _>(env, "PAIR_WINDOW_SECS")? {
        config.sync.pair_window_secs = val;
    }
    if let Some(val) = get_env_parsed::<i32, _>(env, "UTC_OFFSET_MINUTES")? {
        config.sync.utc_offset_minutes = val;
    }

    // Device identifiers
    if let Some(id) = env.get("DEVICE_FIRST") {
        config.devices.first = id;
    }
    if let Some(id) = env.get("DEVICE_SECOND") {
        config.devices.second = id;
    }

    // Request configuration
    if let Some(val) = get_env_parsed::<usize, _>(env, "MAX_PAYLOAD_BYTES")? {
        config.request.max_payload_bytes = val;
    }

    // Storage backend
    if let Some(backend) = env.get("STORAGE_BACKEND") {
        config.storage.backend = backend
            .parse::<StorageBackend>()
            .context("Invalid WEATHERPAIR_STORAGE_BACKEND value")?;
    }
    // Unprefixed DATABASE_PATH first so the prefixed variable wins
    if let Some(path) = env.get_raw("DATABASE_PATH") {
        config.storage.sqlite.path = path;
    }
    if let Some(path) = env.get("SQLITE_PATH") {
        config.storage.sqlite.path = path;
    }
    if let Some(val) = get_env_parsed::<u64, _>(env, "SQLITE_BUSY_TIMEOUT_MS")? {
        config.storage.sqlite.busy_timeout_ms = val;
    }

    // Server configuration (listen addr, log level/format)
    if let Some(addr) = env.get("LISTEN_ADDR") {
        config.server.listen_addr = addr;
    }
    if let Some(level) = env.get("LOG_LEVEL") {
        config.server.log_level = level;
    }
    if let Some(format) = env.get("LOG_FORMAT") {
        config.server.log_format = match format.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        };
    }

    Ok(())
}

fn get_env_parsed<T, E>(env: &E, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    E: EnvSource,
{
    match env.get(key) {
        Some(val) => {
            let parsed = val
                .trim()
                .parse::<T>()
                .map_err(|e| anyhow!("Failed to parse {}{}: {}", ENV_PREFIX, key, e))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}
