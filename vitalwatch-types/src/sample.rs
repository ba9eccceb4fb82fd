//! A decoded, validated telemetry message.

/// One inbound device message after decoding.
///
/// Every field is independently optional: a device may publish heart rate
/// and oxygen saturation on one message and a pressure reading on the next.
/// Present fields are always finite numbers.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TelemetrySample {
    /// Heart rate in beats per minute.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub heart_rate_bpm: Option<f64>,

    /// Peripheral oxygen saturation, in percent.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub oxygen_saturation_pct: Option<f64>,

    /// Raw pressure sensor output, in volts.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub pressure_volts: Option<f64>,
}

impl TelemetrySample {
    /// Create a sample with no fields set.
    pub const fn new() -> Self {
        Self {
            heart_rate_bpm: None,
            oxygen_saturation_pct: None,
            pressure_volts: None,
        }
    }

    /// Set the heart rate.
    pub fn heart_rate(mut self, bpm: f64) -> Self {
        self.heart_rate_bpm = Some(bpm);
        self
    }

    /// Set the oxygen saturation.
    pub fn oxygen_saturation(mut self, pct: f64) -> Self {
        self.oxygen_saturation_pct = Some(pct);
        self
    }

    /// Set the pressure reading.
    pub fn pressure(mut self, volts: f64) -> Self {
        self.pressure_volts = Some(volts);
        self
    }

    /// True if no field is set.
    pub fn is_empty(&self) -> bool {
        self.heart_rate_bpm.is_none()
            && self.oxygen_saturation_pct.is_none()
            && self.pressure_volts.is_none()
    }

    /// Number of fields carried by this sample.
    pub fn field_count(&self) -> usize {
        [
            self.heart_rate_bpm,
            self.oxygen_saturation_pct,
            self.pressure_volts,
        ]
        .iter()
        .filter(|f| f.is_some())
        .count()
    }
}
