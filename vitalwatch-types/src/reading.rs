//! Latest-value store for the scalar vital signs.

use crate::TelemetrySample;

/// The most recent heart rate and oxygen saturation.
///
/// Each slot is overwritten in place when a sample carries the matching
/// field; absent fields never clear a slot.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LiveReading {
    /// Last heart rate received, in beats per minute.
    pub heart_rate_bpm: Option<f64>,

    /// Last oxygen saturation received, in percent.
    pub oxygen_saturation_pct: Option<f64>,
}

impl LiveReading {
    /// Create a reading with both slots unset.
    pub const fn new() -> Self {
        Self {
            heart_rate_bpm: None,
            oxygen_saturation_pct: None,
        }
    }

    /// Apply the scalar fields of a sample.
    ///
    /// Returns true if any slot was written.
    pub fn apply(&mut self, sample: &TelemetrySample) -> bool {
        let mut written = false;
        if let Some(bpm) = sample.heart_rate_bpm {
            self.heart_rate_bpm = Some(bpm);
            written = true;
        }
        if let Some(pct) = sample.oxygen_saturation_pct {
            self.oxygen_saturation_pct = Some(pct);
            written = true;
        }
        written
    }

    /// Unset both slots.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// True if neither slot has been set.
    pub fn is_unset(&self) -> bool {
        self.heart_rate_bpm.is_none() && self.oxygen_saturation_pct.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unset() {
        let live = LiveReading::new();
        assert!(live.is_unset());
    }

    #[test]
    fn spo2_only_sample_leaves_heart_rate_alone() {
        let mut live = LiveReading::new();
        live.apply(&TelemetrySample::new().heart_rate(72.0));

        let written = live.apply(&TelemetrySample::new().oxygen_saturation(96.0));

        assert!(written);
        assert_eq!(live.heart_rate_bpm, Some(72.0));
        assert_eq!(live.oxygen_saturation_pct, Some(96.0));
    }

    #[test]
    fn pressure_only_sample_writes_nothing() {
        let mut live = LiveReading::new();
        live.apply(&TelemetrySample::new().heart_rate(80.0));

        let written = live.apply(&TelemetrySample::new().pressure(1.4));

        assert!(!written);
        assert_eq!(live.heart_rate_bpm, Some(80.0));
        assert_eq!(live.oxygen_saturation_pct, None);
    }

    #[test]
    fn clear_unsets_both_slots() {
        let mut live = LiveReading::new();
        live.apply(&TelemetrySample::new().heart_rate(60.0).oxygen_saturation(99.0));
        live.clear();
        assert!(live.is_unset());
    }
}
