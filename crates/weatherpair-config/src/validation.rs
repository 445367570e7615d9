// Configuration validation
//
// Validates that required fields are present and values are sensible

use super::*;
use crate::env_overrides::ENV_PREFIX;
use anyhow::{bail, Result};
use tracing::warn;

const MAX_UTC_OFFSET_MINUTES: i32 = 18 * 60;

/// Slot names devices may also report with, in slot order.
const SLOT_NAMES: [&str; 2] = ["esp1", "esp2"];

pub fn validate_config(config: &RuntimeConfig) -> Result<()> {
    validate_sync_config(&config.sync)?;
    validate_device_config(&config.devices)?;
    validate_request_config(&config.request)?;
    validate_storage_config(&config.storage)?;
    validate_server_config(&config.server)?;
    Ok(())
}

fn validate_sync_config(config: &SyncSettings) -> Result<()> {
    if config.pair_window_secs == 0 {
        bail!("sync.pair_window_secs must be greater than 0");
    }

    if config.pair_window_secs > 300 {
        warn!(
            pair_window_secs = config.pair_window_secs,
            "sync.pair_window_secs is very long; unpaired readings will be delayed"
        );
    }

    if config.utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
        bail!(
            "sync.utc_offset_minutes must be within ±{} (got {})",
            MAX_UTC_OFFSET_MINUTES,
            config.utc_offset_minutes
        );
    }

    Ok(())
}

fn validate_device_config(config: &DeviceConfig) -> Result<()> {
    let first = config.first.trim();
    let second = config.second.trim();

    if first.is_empty() || second.is_empty() {
        bail!(
            "Both device identifiers are required\n\n\
            How to fix:\n\
              • Environment: export {}DEVICE_FIRST=ATOM_001 {}DEVICE_SECOND=ATOM_002\n\
              • TOML: [devices]\n              first = \"ATOM_001\"\n              second = \"ATOM_002\"\n",
            ENV_PREFIX,
            ENV_PREFIX
        );
    }

    if first == second {
        bail!("devices.first and devices.second must differ (both are '{}')", first);
    }

    // A device named after the other slot would be ambiguous.
    if first == SLOT_NAMES[1] {
        bail!(
            "devices.first must not be '{}', which names the second slot",
            SLOT_NAMES[1]
        );
    }
    if second == SLOT_NAMES[0] {
        bail!(
            "devices.second must not be '{}', which names the first slot",
            SLOT_NAMES[0]
        );
    }

    Ok(())
}

fn validate_request_config(config: &RequestConfig) -> Result<()> {
    if config.max_payload_bytes == 0 {
        bail!("request.max_payload_bytes must be greater than 0");
    }

    if config.max_payload_bytes > 10 * 1024 * 1024 {
        warn!(
            max_payload_bytes = config.max_payload_bytes,
            "request.max_payload_bytes is very large for a sensor reading"
        );
    }

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<()> {
    match config.backend {
        StorageBackend::Sqlite => {
            if config.sqlite.path.trim().is_empty() {
                bail!(
                    "SQLite database path is required\n\n\
                    How to fix:\n\
                      • Environment: export {}SQLITE_PATH=/data/weather_data.db\n\
                      • TOML: [storage.sqlite]\n              path = \"/data/weather_data.db\"\n",
                    ENV_PREFIX
                );
            }
            if config.sqlite.busy_timeout_ms == 0 {
                warn!("storage.sqlite.busy_timeout_ms is 0; concurrent readers may cause write failures");
            }
        }
        StorageBackend::Memory => {
            warn!("Memory storage backend selected; rows are lost on exit");
        }
    }

    Ok(())
}

fn validate_server_config(config: &ServerConfig) -> Result<()> {
    if config.listen_addr.is_empty() {
        bail!("server.listen_addr must not be empty");
    }

    if !config.listen_addr.contains(':') {
        bail!("server.listen_addr must be in format 'host:port'");
    }

    Ok(())
}
