//! Error types for the SQLite writer

use thiserror::Error;
use weatherpair_core::{DeviceSlot, SinkError};

/// Errors that can occur while opening or writing to the database
#[derive(Debug, Error)]
pub enum WriterError {
    /// The database file could not be opened or configured
    #[error("Failed to open SQLite database at '{path}': {source}\n\nTroubleshooting:\n  • Check that the parent directory exists and is writable\n  • Set WEATHERPAIR_SQLITE_PATH or DATABASE_PATH to a writable location")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },

    /// Table creation failed
    #[error("Failed to create tables: {0}")]
    Schema(#[source] rusqlite::Error),

    /// An insert failed
    #[error("Insert into {slot} failed: {source}")]
    Insert {
        slot: DeviceSlot,
        #[source]
        source: rusqlite::Error,
    },

    /// Readiness query failed
    #[error("Health query failed: {0}")]
    Ping(#[source] rusqlite::Error),

    /// Closing the connection failed
    #[error("Failed to close SQLite database: {0}")]
    Close(#[source] rusqlite::Error),

    /// The writer thread could not be started
    #[error("Failed to spawn SQLite writer thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// The writer thread is gone
    #[error("SQLite writer thread has shut down")]
    Shutdown,
}

impl From<WriterError> for SinkError {
    fn from(err: WriterError) -> Self {
        match err {
            WriterError::Insert { slot, source } => SinkError::write_failed(slot, source.to_string()),
            other => SinkError::unavailable(other.to_string()),
        }
    }
}
