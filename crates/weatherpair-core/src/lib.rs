// weatherpair-core - Shared types for the paired-sensor synchronizer
//
// Pure data and seams, no async runtime:
// - Report / Measurements / CaptureStamp: a normalized reading
// - DeviceSlot / SlotRegistry: the two known device slots
// - CaptureClock: arrival-time stamping in a single fixed time zone
// - RowSink: the persistence collaborator the synchronizer writes to

mod clock;
mod error;
mod report;
mod sink;
mod slot;

pub use clock::{CaptureClock, FixedZoneClock, ManualClock};
pub use error::{SinkError, SyncError};
pub use report::{CaptureStamp, InboundReading, Measurements, Report};
pub use sink::{MemorySink, RowSink, SlotRow};
pub use slot::{DeviceSlot, SlotRegistry};
