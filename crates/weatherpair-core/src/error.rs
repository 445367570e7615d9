//! Error types shared by the synchronizer and its sinks

use thiserror::Error;

use crate::DeviceSlot;

/// Errors surfaced synchronously to the caller of the resolver.
///
/// Everything else (persistence failures, timer races) is terminal inside the
/// synchronizer and only observable through logs and metrics.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    /// The report names a device outside the known pair.
    #[error("unknown device '{device_id}' (expected one of: {expected})")]
    InvalidSlot { device_id: String, expected: String },
}

/// Errors raised by a [`RowSink`](crate::RowSink) implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SinkError {
    /// A single row could not be written.
    #[error("failed to write row for {slot}: {message}")]
    WriteFailed { slot: DeviceSlot, message: String },

    /// The sink cannot accept writes at all (closed, unreachable).
    #[error("sink unavailable: {message}")]
    Unavailable { message: String },
}

impl SinkError {
    pub fn write_failed(slot: DeviceSlot, message: impl Into<String>) -> Self {
        Self::WriteFailed {
            slot,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}
