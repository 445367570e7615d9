// Pending buffer
//
// At most one outstanding report per device slot. Every operation is a single
// short critical section; nothing here awaits or does I/O.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use weatherpair_core::{DeviceSlot, Report};

use crate::TimerHandle;

/// Process-unique ticket for a pending entry.
///
/// A timer only ever removes the entry it was armed for, never a later entry
/// that happens to occupy the same slot.
pub type EntryId = u64;

/// A report waiting for its partner.
#[derive(Debug)]
pub struct PendingEntry {
    id: EntryId,
    report: Report,
    arrived_at: Instant,
    timer: Option<TimerHandle>,
}

impl PendingEntry {
    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn report(&self) -> &Report {
        &self.report
    }

    pub fn into_report(self) -> Report {
        self.report
    }

    /// Time spent in the buffer so far.
    pub fn waited(&self) -> Duration {
        self.arrived_at.elapsed()
    }

    pub fn has_timer(&self) -> bool {
        self.timer.is_some()
    }

    /// Best-effort cancel of the deadline timer. A timer that already fired
    /// finds its entry gone and does nothing.
    pub fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
    }
}

/// Result of [`PendingBuffer::try_claim`].
#[derive(Debug)]
pub enum ClaimResult {
    /// The partner slot was waiting; its entry has been removed.
    Paired {
        report: Report,
        partner: PendingEntry,
    },
    /// The report is now pending. If the same slot already held an older
    /// entry it was removed and is handed back in `superseded`.
    Waiting {
        entry_id: EntryId,
        superseded: Option<PendingEntry>,
    },
}

/// Thread-safe slot → pending entry map.
#[derive(Debug, Default)]
pub struct PendingBuffer {
    slots: Mutex<HashMap<DeviceSlot, PendingEntry>>,
    next_id: AtomicU64,
}

impl PendingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pair with the waiting partner, or start waiting.
    ///
    /// When both slots claim at the same moment exactly one of them observes
    /// `Paired`.
    pub fn try_claim(&self, report: Report) -> ClaimResult {
        let slot = report.slot();
        let mut guard = self.slots.lock();

        if let Some(partner) = guard.remove(&slot.partner()) {
            return ClaimResult::Paired { report, partner };
        }

        let entry_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let superseded = guard.insert(
            slot,
            PendingEntry {
                id: entry_id,
                report,
                arrived_at: Instant::now(),
                timer: None,
            },
        );

        ClaimResult::Waiting {
            entry_id,
            superseded,
        }
    }

    /// Pop the entry for `slot` only if it is still entry `entry_id`.
    pub fn remove_if_present(&self, slot: DeviceSlot, entry_id: EntryId) -> Option<PendingEntry> {
        let mut guard = self.slots.lock();
        match guard.get(&slot) {
            Some(entry) if entry.id == entry_id => guard.remove(&slot),
            _ => None,
        }
    }

    /// Store the armed timer inside its entry.
    ///
    /// Hands the timer back if the entry was consumed in the meantime.
    pub fn attach_timer(
        &self,
        slot: DeviceSlot,
        entry_id: EntryId,
        timer: TimerHandle,
    ) -> Result<(), TimerHandle> {
        let mut guard = self.slots.lock();
        match guard.get_mut(&slot) {
            Some(entry) if entry.id == entry_id && entry.timer.is_none() => {
                entry.timer = Some(timer);
                Ok(())
            }
            _ => Err(timer),
        }
    }

    /// Remove every pending entry, in slot order.
    pub fn drain(&self) -> Vec<PendingEntry> {
        let mut guard = self.slots.lock();
        DeviceSlot::ALL
            .iter()
            .filter_map(|slot| guard.remove(slot))
            .collect()
    }

    pub fn contains(&self, slot: DeviceSlot) -> bool {
        self.slots.lock().contains_key(&slot)
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}
