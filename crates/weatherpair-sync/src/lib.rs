// weatherpair-sync - Ingestion synchronizer for two paired sensors
//
// Two devices push readings independently and without a shared clock. Each
// arrival either completes a pair with the partner already waiting, or waits
// up to a fixed window and then commits alone with an all-null partner row.
//
// The pending buffer's claim is the single serialization point: whichever of
// "partner arrives" and "timer fires" consumes an entry first decides its
// fate, and the loser observes a no-op.

use std::time::Duration;

mod buffer;
mod commit;
mod resolver;
mod timer;

pub use buffer::{ClaimResult, EntryId, PendingBuffer, PendingEntry};
pub use commit::{CommitKind, CommitSummary, Committer};
pub use resolver::{Outcome, PairingResolver};
pub use timer::{ExpireOutcome, TimeoutScheduler, TimerHandle};

/// Wait window used when none is configured.
pub const DEFAULT_PAIR_WINDOW: Duration = Duration::from_secs(17);

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// How long a report waits for its partner before committing alone.
    pub pair_window: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            pair_window: DEFAULT_PAIR_WINDOW,
        }
    }
}
