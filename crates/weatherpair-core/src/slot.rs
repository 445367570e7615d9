// Device slots and the mapping from device identifiers to slots

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::SyncError;

/// One of exactly two paired sensor sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceSlot {
    #[serde(rename = "esp1")]
    First,
    #[serde(rename = "esp2")]
    Second,
}

impl DeviceSlot {
    pub const ALL: [DeviceSlot; 2] = [DeviceSlot::First, DeviceSlot::Second];

    /// The other slot of the pair.
    pub fn partner(self) -> Self {
        match self {
            DeviceSlot::First => DeviceSlot::Second,
            DeviceSlot::Second => DeviceSlot::First,
        }
    }

    /// Stable name, also used as the storage table name.
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceSlot::First => "esp1",
            DeviceSlot::Second => "esp2",
        }
    }
}

impl fmt::Display for DeviceSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps the identifiers devices report themselves with onto slots.
///
/// Slot names (`esp1`, `esp2`) are accepted as well, so a device can be
/// addressed either by its hardware id or by the slot it feeds. Configured
/// identifiers are matched before slot names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotRegistry {
    first: String,
    second: String,
}

impl SlotRegistry {
    pub fn new(first: impl Into<String>, second: impl Into<String>) -> Self {
        Self {
            first: first.into(),
            second: second.into(),
        }
    }

    /// Device identifier bound to `slot`.
    pub fn device_id(&self, slot: DeviceSlot) -> &str {
        match slot {
            DeviceSlot::First => &self.first,
            DeviceSlot::Second => &self.second,
        }
    }

    pub fn resolve(&self, device_id: &str) -> Result<DeviceSlot, SyncError> {
        let id = device_id.trim();
        if id == self.first {
            Ok(DeviceSlot::First)
        } else if id == self.second {
            Ok(DeviceSlot::Second)
        } else if id == DeviceSlot::First.as_str() {
            Ok(DeviceSlot::First)
        } else if id == DeviceSlot::Second.as_str() {
            Ok(DeviceSlot::Second)
        } else {
            Err(SyncError::InvalidSlot {
                device_id: device_id.to_string(),
                expected: format!("{}, {}", self.first, self.second),
            })
        }
    }
}

impl Default for SlotRegistry {
    fn default() -> Self {
        Self::new("ATOM_001", "ATOM_002")
    }
}
