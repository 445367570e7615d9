// Initialization utilities for server mode
//
// Storage sink, pairing resolver, and logging/tracing setup

use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use tracing::info;
use weatherpair_config::{LogFormat, RuntimeConfig, StorageBackend};
use weatherpair_core::{FixedZoneClock, MemorySink, RowSink, SlotRegistry};
use weatherpair_sync::{PairingResolver, SyncConfig};
use weatherpair_writer::SqliteSink;

/// Open the row sink selected by `storage.backend`.
pub fn init_sink(config: &RuntimeConfig) -> Result<Arc<dyn RowSink>> {
    info!(
        "Initializing row sink with storage backend: {}",
        config.storage.backend
    );

    match config.storage.backend {
        StorageBackend::Sqlite => {
            let sqlite = &config.storage.sqlite;
            info!("Using SQLite database at: {}", sqlite.path);
            let sink = SqliteSink::open(sqlite).context("Failed to open SQLite sink")?;
            Ok(Arc::new(sink))
        }
        StorageBackend::Memory => {
            info!("Using in-memory storage; rows are discarded on exit");
            Ok(Arc::new(MemorySink::new()))
        }
    }
}

/// Wire the resolver from config: device ids, pairing window, capture zone.
pub fn init_resolver(config: &RuntimeConfig, sink: Arc<dyn RowSink>) -> Result<PairingResolver> {
    let offset_minutes = config.sync.utc_offset_minutes;
    let clock = FixedZoneClock::from_offset_minutes(offset_minutes)
        .ok_or_else(|| anyhow!("Invalid UTC offset: {} minutes", offset_minutes))?;
    info!(offset = %clock.offset(), "Capture stamps use fixed UTC offset");

    let registry = SlotRegistry::new(
        config.devices.first.trim(),
        config.devices.second.trim(),
    );
    let sync = SyncConfig {
        pair_window: config.sync.pair_window(),
    };

    Ok(PairingResolver::new(sync, registry, Arc::new(clock), sink))
}

/// Initialize tracing/logging from RuntimeConfig
///
/// A second call is a no-op.
pub fn init_tracing(config: &RuntimeConfig) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    let _ = match config.server.log_format {
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
        LogFormat::Text => registry.with(fmt::layer()).try_init(),
    };
}
