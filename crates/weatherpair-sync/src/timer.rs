// Timeout scheduler
//
// One sleep task per pending entry. On expiry the task tries to pop its own
// entry; if a partner got there first the pop misses and the expiry is a
// no-op. Cancelling a timer is only an optimization, and a timer left running
// after its entry was consumed is harmless.

use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::{debug, info};
use weatherpair_core::DeviceSlot;

use crate::{CommitKind, Committer, EntryId, PendingBuffer};

/// Cancellable handle to an armed deadline.
#[derive(Debug)]
pub struct TimerHandle {
    abort: AbortHandle,
}

impl TimerHandle {
    pub fn new(abort: AbortHandle) -> Self {
        Self { abort }
    }

    /// Request cancellation. The timer may still fire if it is already past
    /// its sleep.
    pub fn cancel(self) {
        self.abort.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.abort.is_finished()
    }
}

/// What happened when a deadline elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpireOutcome {
    /// The entry was still waiting and has been committed alone.
    Committed,
    /// The entry had already been consumed.
    AlreadyResolved,
}

/// Arms deadlines and performs timeout commits.
pub struct TimeoutScheduler {
    buffer: Arc<PendingBuffer>,
    committer: Committer,
}

impl TimeoutScheduler {
    pub fn new(buffer: Arc<PendingBuffer>, committer: Committer) -> Self {
        Self { buffer, committer }
    }

    /// Spawn a one-shot timer for entry `entry_id` in `slot`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn arm(self: &Arc<Self>, slot: DeviceSlot, entry_id: EntryId, deadline: Duration) -> TimerHandle {
        let scheduler = Arc::clone(self);
        let task = tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            scheduler.on_expire(slot, entry_id).await;
        });

        debug!(
            slot = %slot,
            entry_id,
            deadline_secs = deadline.as_secs(),
            "Armed pairing deadline"
        );
        TimerHandle::new(task.abort_handle())
    }

    /// Deadline callback: commit the entry alone if nobody consumed it.
    pub async fn on_expire(&self, slot: DeviceSlot, entry_id: EntryId) -> ExpireOutcome {
        let Some(entry) = self.buffer.remove_if_present(slot, entry_id) else {
            counter!("weatherpair.race_noop").increment(1);
            debug!(slot = %slot, entry_id, "Deadline fired after entry was resolved");
            return ExpireOutcome::AlreadyResolved;
        };

        info!(
            slot = %slot,
            partner = %slot.partner(),
            entry_id,
            waited_ms = entry.waited().as_millis() as u64,
            "No partner within window; committing alone"
        );
        // Detached from this task so aborting the timer cannot cut the write short.
        let commit = self
            .committer
            .spawn_solo(entry.into_report(), CommitKind::Timeout);
        Committer::join(commit).await;
        ExpireOutcome::Committed
    }
}
