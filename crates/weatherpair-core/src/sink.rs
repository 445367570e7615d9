// Persistence sink seam
//
// Implementations:
// - SqliteSink (weatherpair-writer)
// - MemorySink (memory backend and tests)

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;

use crate::{CaptureStamp, DeviceSlot, Measurements, SinkError};

/// One row destined for a slot's storage.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotRow {
    pub slot: DeviceSlot,
    pub measurements: Measurements,
    pub stamp: CaptureStamp,
}

impl SlotRow {
    pub fn new(slot: DeviceSlot, measurements: Measurements, stamp: CaptureStamp) -> Self {
        Self {
            slot,
            measurements,
            stamp,
        }
    }
}

/// Durable row storage used by the synchronizer.
#[async_trait]
pub trait RowSink: Send + Sync {
    /// Write one row for `row.slot`.
    async fn write_row(&self, row: &SlotRow) -> Result<(), SinkError>;

    /// Readiness check.
    async fn ping(&self) -> Result<(), SinkError> {
        Ok(())
    }

    /// Release the underlying storage once no more rows will be written.
    async fn close(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// In-memory sink that records every row in write order.
#[derive(Debug, Default)]
pub struct MemorySink {
    rows: Mutex<Vec<SlotRow>>,
    failing: Mutex<HashSet<DeviceSlot>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write for `slot` fail.
    pub fn fail_writes_for(&self, slot: DeviceSlot) {
        self.failing.lock().insert(slot);
    }

    pub fn rows(&self) -> Vec<SlotRow> {
        self.rows.lock().clone()
    }

    pub fn rows_for(&self, slot: DeviceSlot) -> Vec<SlotRow> {
        self.rows
            .lock()
            .iter()
            .filter(|row| row.slot == slot)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.lock().is_empty()
    }
}

#[async_trait]
impl RowSink for MemorySink {
    async fn write_row(&self, row: &SlotRow) -> Result<(), SinkError> {
        if self.failing.lock().contains(&row.slot) {
            return Err(SinkError::write_failed(row.slot, "injected failure"));
        }
        self.rows.lock().push(row.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(slot: DeviceSlot, temperature: f64) -> SlotRow {
        SlotRow::new(
            slot,
            Measurements::new(Some(temperature), None, None),
            CaptureStamp::new("2025-01-21", "12:00:00"),
        )
    }

    #[tokio::test]
    async fn memory_sink_records_in_order() {
        let sink = MemorySink::new();
        sink.write_row(&row(DeviceSlot::First, 1.0)).await.unwrap();
        sink.write_row(&row(DeviceSlot::Second, 2.0)).await.unwrap();
        sink.write_row(&row(DeviceSlot::First, 3.0)).await.unwrap();

        assert_eq!(sink.len(), 3);
        let first: Vec<_> = sink
            .rows_for(DeviceSlot::First)
            .into_iter()
            .map(|r| r.measurements.temperature)
            .collect();
        assert_eq!(first, vec![Some(1.0), Some(3.0)]);
        assert!(sink.ping().await.is_ok());
    }

    #[tokio::test]
    async fn injected_failures_are_per_slot() {
        let sink = MemorySink::new();
        sink.fail_writes_for(DeviceSlot::Second);

        assert!(sink.write_row(&row(DeviceSlot::First, 1.0)).await.is_ok());
        let err = sink
            .write_row(&row(DeviceSlot::Second, 2.0))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SinkError::write_failed(DeviceSlot::Second, "injected failure")
        );
        assert_eq!(sink.len(), 1);
    }
}
