//! Points of the pressure trend.

/// A single pressure observation.
///
/// `timestamp_ms` is the receipt time (milliseconds since the Unix epoch),
/// not the device's own clock.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PressurePoint {
    /// When the message carrying this reading was received.
    pub timestamp_ms: u64,

    /// Pressure sensor output, in volts.
    pub pressure_volts: f64,
}

impl PressurePoint {
    /// Create a new point.
    pub const fn new(timestamp_ms: u64, pressure_volts: f64) -> Self {
        Self {
            timestamp_ms,
            pressure_volts,
        }
    }
}
