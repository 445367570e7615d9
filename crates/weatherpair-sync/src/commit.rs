// Commit paths
//
// Every resolved report produces exactly two rows, one per slot, both stamped
// with the capture stamp of the report that triggered the commit. Write
// failures are logged and counted, never retried.
//
// Once an entry has left the buffer its commit runs on its own task, so a
// dropped request future or an aborted timer cannot lose it halfway.

use metrics::counter;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error};
use weatherpair_core::{CaptureStamp, DeviceSlot, Measurements, Report, RowSink, SlotRow};

/// Why a pair of rows is being written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitKind {
    /// Second report arrived inside the window.
    Paired,
    /// Deadline elapsed with no partner.
    Timeout,
    /// A newer report from the same device replaced this one.
    Superseded,
    /// Drained on shutdown.
    Flushed,
}

impl CommitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitKind::Paired => "paired",
            CommitKind::Timeout => "timeout",
            CommitKind::Superseded => "superseded",
            CommitKind::Flushed => "flushed",
        }
    }
}

/// Rows written and rows that failed for one commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub written: usize,
    pub failed: usize,
}

impl CommitSummary {
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

/// Count of commit tasks still running.
#[derive(Debug, Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

struct InFlightGuard(Arc<InFlight>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// Writes row pairs to the sink.
#[derive(Clone)]
pub struct Committer {
    sink: Arc<dyn RowSink>,
    in_flight: Arc<InFlight>,
}

impl Committer {
    pub fn new(sink: Arc<dyn RowSink>) -> Self {
        Self {
            sink,
            in_flight: Arc::new(InFlight::default()),
        }
    }

    pub fn sink(&self) -> &Arc<dyn RowSink> {
        &self.sink
    }

    /// Run [`Committer::paired`] on a detached task.
    ///
    /// Dropping the returned handle does not stop the commit.
    pub fn spawn_paired(&self, current: Report, partner: Report) -> JoinHandle<CommitSummary> {
        let committer = self.clone();
        self.spawn_tracked(async move { committer.paired(&current, &partner).await })
    }

    /// Run [`Committer::solo`] on a detached task.
    pub fn spawn_solo(&self, report: Report, kind: CommitKind) -> JoinHandle<CommitSummary> {
        let committer = self.clone();
        self.spawn_tracked(async move { committer.solo(&report, kind).await })
    }

    /// Number of spawned commits that have not finished.
    pub fn in_flight(&self) -> usize {
        self.in_flight.count.load(Ordering::Acquire)
    }

    /// Wait until every spawned commit has finished.
    pub async fn wait_idle(&self) {
        loop {
            // Registered before the check so a wakeup in between is not missed.
            let notified = self.in_flight.idle.notified();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Await a spawned commit. A panicked task counts as two failed rows.
    pub async fn join(handle: JoinHandle<CommitSummary>) -> CommitSummary {
        match handle.await {
            Ok(summary) => summary,
            Err(e) => {
                counter!("weatherpair.sink.write_failures").increment(2);
                error!(error = %e, "Commit task did not complete");
                CommitSummary {
                    written: 0,
                    failed: 2,
                }
            }
        }
    }

    fn spawn_tracked<F>(&self, commit: F) -> JoinHandle<CommitSummary>
    where
        F: Future<Output = CommitSummary> + Send + 'static,
    {
        self.in_flight.count.fetch_add(1, Ordering::AcqRel);
        let guard = InFlightGuard(Arc::clone(&self.in_flight));
        tokio::spawn(async move {
            let _guard = guard;
            commit.await
        })
    }

    /// Both reports under their own slots, stamped with `current`'s capture time.
    pub async fn paired(&self, current: &Report, partner: &Report) -> CommitSummary {
        let stamp = current.stamp();
        let rows = [
            SlotRow::new(current.slot(), *current.measurements(), stamp.clone()),
            SlotRow::new(partner.slot(), *partner.measurements(), stamp.clone()),
        ];
        self.write_pair(CommitKind::Paired, stamp, rows).await
    }

    /// The report under its own slot, an all-null row under the partner slot.
    pub async fn solo(&self, report: &Report, kind: CommitKind) -> CommitSummary {
        let stamp = report.stamp();
        let rows = [
            SlotRow::new(report.slot(), *report.measurements(), stamp.clone()),
            SlotRow::new(report.slot().partner(), Measurements::empty(), stamp.clone()),
        ];
        self.write_pair(kind, stamp, rows).await
    }

    async fn write_pair(
        &self,
        kind: CommitKind,
        stamp: &CaptureStamp,
        mut rows: [SlotRow; 2],
    ) -> CommitSummary {
        // Rows always land in slot order so both tables advance together.
        rows.sort_by_key(|row| row.slot != DeviceSlot::First);

        let mut summary = CommitSummary::default();
        for row in &rows {
            match self.sink.write_row(row).await {
                Ok(()) => summary.written += 1,
                Err(e) => {
                    summary.failed += 1;
                    counter!("weatherpair.sink.write_failures").increment(1);
                    error!(
                        kind = kind.as_str(),
                        slot = %row.slot,
                        date = %stamp.date,
                        hour = %stamp.hour,
                        error = %e,
                        "Row write failed; not retried"
                    );
                }
            }
        }

        counter!("weatherpair.commits", "kind" => kind.as_str()).increment(1);
        debug!(
            kind = kind.as_str(),
            date = %stamp.date,
            hour = %stamp.hour,
            written = summary.written,
            failed = summary.failed,
            "Committed row pair"
        );
        summary
    }
}
