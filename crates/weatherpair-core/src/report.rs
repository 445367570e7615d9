// Report model
//
// InboundReading is what a device sends; Report is the normalized, stamped
// value the synchronizer works with.

use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};

use crate::DeviceSlot;

/// Environmental measurements; each field is independently nullable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Measurements {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
}

impl Measurements {
    pub fn new(temperature: Option<f64>, humidity: Option<f64>, pressure: Option<f64>) -> Self {
        Self {
            temperature,
            humidity,
            pressure,
        }
    }

    /// All-null measurements, written for a partner that never reported.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.humidity.is_none() && self.pressure.is_none()
    }
}

/// Wall-clock capture date (`YYYY-MM-DD`) and hour (`HH:MM:SS`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaptureStamp {
    pub date: String,
    pub hour: String,
}

impl CaptureStamp {
    pub fn new(date: impl Into<String>, hour: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            hour: hour.into(),
        }
    }

    /// Format an instant already converted into the capture time zone.
    /// Sub-second precision is dropped.
    pub fn from_datetime<Tz: TimeZone>(at: &DateTime<Tz>) -> Self
    where
        Tz::Offset: std::fmt::Display,
    {
        Self {
            date: at.format("%Y-%m-%d").to_string(),
            hour: at.format("%H:%M:%S").to_string(),
        }
    }
}

/// A reading accepted into the synchronizer. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    slot: DeviceSlot,
    measurements: Measurements,
    stamp: CaptureStamp,
}

impl Report {
    pub fn new(slot: DeviceSlot, measurements: Measurements, stamp: CaptureStamp) -> Self {
        Self {
            slot,
            measurements,
            stamp,
        }
    }

    pub fn slot(&self) -> DeviceSlot {
        self.slot
    }

    pub fn measurements(&self) -> &Measurements {
        &self.measurements
    }

    pub fn stamp(&self) -> &CaptureStamp {
        &self.stamp
    }
}

/// Body pushed by a sensor device.
///
/// Field names follow the firmware (`capteur_id`, `humidite`, `pression`);
/// English names are accepted too. Client timestamps are never read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundReading {
    #[serde(rename = "capteur_id", alias = "device_id")]
    pub device_id: String,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default, rename = "humidite", alias = "humidity")]
    pub humidity: Option<f64>,
    #[serde(default, rename = "pression", alias = "pressure")]
    pub pressure: Option<f64>,
}

impl InboundReading {
    pub fn new(device_id: impl Into<String>, measurements: Measurements) -> Self {
        Self {
            device_id: device_id.into(),
            temperature: measurements.temperature,
            humidity: measurements.humidity,
            pressure: measurements.pressure,
        }
    }

    pub fn measurements(&self) -> Measurements {
        Measurements::new(self.temperature, self.humidity, self.pressure)
    }
}
