// Pairing resolver
//
// Entry point for every inbound reading:
//   Received -> PairedCommit
//   Received -> Waiting -> PairedCommit | TimeoutCommit
// Neither terminal state can be re-entered.

use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use weatherpair_core::{
    CaptureClock, DeviceSlot, InboundReading, Report, RowSink, SlotRegistry, SyncError,
};

use crate::{ClaimResult, CommitKind, Committer, PendingBuffer, SyncConfig, TimeoutScheduler};

/// Synchronous answer to a caller of [`PairingResolver::handle_report`].
///
/// There is no timeout variant: that resolution happens later, on the
/// scheduler's task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Both rows were written immediately.
    PairedCommit { slot: DeviceSlot },
    /// Accepted; resolution deferred up to the pairing window.
    Pending { slot: DeviceSlot },
}

impl Outcome {
    pub fn slot(&self) -> DeviceSlot {
        match self {
            Outcome::PairedCommit { slot } | Outcome::Pending { slot } => *slot,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::PairedCommit { .. } => "paired",
            Outcome::Pending { .. } => "pending",
        }
    }
}

/// Reconciles reports from the two device slots into row pairs.
pub struct PairingResolver {
    registry: SlotRegistry,
    clock: Arc<dyn CaptureClock>,
    buffer: Arc<PendingBuffer>,
    scheduler: Arc<TimeoutScheduler>,
    committer: Committer,
    pair_window: Duration,
}

impl PairingResolver {
    pub fn new(
        config: SyncConfig,
        registry: SlotRegistry,
        clock: Arc<dyn CaptureClock>,
        sink: Arc<dyn RowSink>,
    ) -> Self {
        let buffer = Arc::new(PendingBuffer::new());
        let committer = Committer::new(sink);
        let scheduler = Arc::new(TimeoutScheduler::new(
            Arc::clone(&buffer),
            committer.clone(),
        ));

        Self {
            registry,
            clock,
            buffer,
            scheduler,
            committer,
            pair_window: config.pair_window,
        }
    }

    pub fn registry(&self) -> &SlotRegistry {
        &self.registry
    }

    pub fn pair_window(&self) -> Duration {
        self.pair_window
    }

    pub fn sink(&self) -> &Arc<dyn RowSink> {
        self.committer.sink()
    }

    /// Number of reports currently waiting for a partner.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Validate, stamp and submit a reading.
    ///
    /// Only an unknown device is reported as an error; persistence problems
    /// are logged and never surface here.
    pub async fn handle_report(&self, reading: InboundReading) -> Result<Outcome, SyncError> {
        let slot = match self.registry.resolve(&reading.device_id) {
            Ok(slot) => slot,
            Err(e) => {
                counter!("weatherpair.reports.rejected").increment(1);
                warn!(device_id = %reading.device_id, "Rejected reading from unknown device");
                return Err(e);
            }
        };

        let report = Report::new(slot, reading.measurements(), self.clock.now());
        Ok(self.submit(report).await)
    }

    /// Submit an already stamped report.
    pub async fn submit(&self, report: Report) -> Outcome {
        let slot = report.slot();
        counter!("weatherpair.reports.accepted", "slot" => slot.as_str()).increment(1);

        match self.buffer.try_claim(report) {
            ClaimResult::Paired {
                report,
                mut partner,
            } => {
                partner.cancel_timer();
                info!(
                    slot = %slot,
                    partner = %partner.report().slot(),
                    waited_ms = partner.waited().as_millis() as u64,
                    date = %report.stamp().date,
                    hour = %report.stamp().hour,
                    "Partner was waiting; committing pair"
                );
                // The entry is gone from the buffer; the write must finish
                // even if this future is dropped.
                let commit = self.committer.spawn_paired(report, partner.into_report());
                Committer::join(commit).await;
                Outcome::PairedCommit { slot }
            }
            ClaimResult::Waiting {
                entry_id,
                superseded,
            } => {
                let timer = self.scheduler.arm(slot, entry_id, self.pair_window);
                if self.buffer.attach_timer(slot, entry_id, timer).is_err() {
                    // Already consumed; the timer will find nothing to remove.
                    debug!(slot = %slot, entry_id, "Entry resolved before its timer was attached");
                }

                if let Some(mut old) = superseded {
                    old.cancel_timer();
                    warn!(
                        slot = %slot,
                        replaced_entry = old.id(),
                        waited_ms = old.waited().as_millis() as u64,
                        "Device reported twice without a partner; committing older report alone"
                    );
                    let commit = self
                        .committer
                        .spawn_solo(old.into_report(), CommitKind::Superseded);
                    Committer::join(commit).await;
                }

                debug!(
                    slot = %slot,
                    entry_id,
                    window_secs = self.pair_window.as_secs(),
                    "Waiting for partner"
                );
                Outcome::Pending { slot }
            }
        }
    }

    /// Number of commits still being written.
    pub fn commits_in_flight(&self) -> usize {
        self.committer.in_flight()
    }

    /// Commit every waiting report alone and empty the buffer.
    ///
    /// Called on orderly shutdown. Also waits for commits already started by
    /// requests or expired deadlines, so every row is written on return.
    /// Returns the number of reports flushed.
    pub async fn flush_pending(&self) -> usize {
        let entries = self.buffer.drain();
        let flushed = entries.len();

        for mut entry in entries {
            entry.cancel_timer();
            // Tracked by the committer; awaited below together with the rest.
            let _ = self
                .committer
                .spawn_solo(entry.into_report(), CommitKind::Flushed);
        }

        let in_flight = self.committer.in_flight();
        if in_flight > 0 {
            debug!(in_flight, "Waiting for in-flight commits");
        }
        self.committer.wait_idle().await;

        if flushed > 0 {
            info!(flushed, "Flushed pending reports");
        }
        flushed
    }
}
