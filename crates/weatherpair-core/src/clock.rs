// Capture clock
//
// The synchronizer stamps reports at arrival; devices are not trusted for time.

use chrono::{FixedOffset, Utc};
use parking_lot::Mutex;

use crate::CaptureStamp;

/// Source of capture stamps.
pub trait CaptureClock: Send + Sync {
    fn now(&self) -> CaptureStamp;
}

/// Wall clock converted into one fixed UTC offset.
#[derive(Debug, Clone, Copy)]
pub struct FixedZoneClock {
    offset: FixedOffset,
}

impl FixedZoneClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// Returns `None` when the offset falls outside ±24h.
    pub fn from_offset_minutes(minutes: i32) -> Option<Self> {
        FixedOffset::east_opt(minutes.checked_mul(60)?).map(Self::new)
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }
}

impl CaptureClock for FixedZoneClock {
    fn now(&self) -> CaptureStamp {
        CaptureStamp::from_datetime(&Utc::now().with_timezone(&self.offset))
    }
}

/// Clock that returns whatever stamp it was last set to. For tests and replay.
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<CaptureStamp>,
}

impl ManualClock {
    pub fn new(stamp: CaptureStamp) -> Self {
        Self {
            current: Mutex::new(stamp),
        }
    }

    pub fn set(&self, stamp: CaptureStamp) {
        *self.current.lock() = stamp;
    }
}

impl CaptureClock for ManualClock {
    fn now(&self) -> CaptureStamp {
        self.current.lock().clone()
    }
}
