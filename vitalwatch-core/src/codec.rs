//! Decoding of raw telemetry payloads.
//!
//! Devices publish a JSON object with any subset of three numeric fields:
//!
//! ```text
//! { "bpm": 72, "spo2": 96.5, "pressureVolt": 1.21 }
//! ```
//!
//! A field counts only if it is present and a finite number; any other
//! shape is treated as absent. A payload that is not a JSON object, or that
//! carries none of the fields, is rejected with a [`DecodeError`].

use serde_json::{Map, Value};
use vitalwatch_types::TelemetrySample;

use crate::error::DecodeError;

/// Wire name of the heart rate field.
pub const FIELD_HEART_RATE: &str = "bpm";
/// Wire name of the oxygen saturation field.
pub const FIELD_OXYGEN_SATURATION: &str = "spo2";
/// Wire name of the pressure field.
pub const FIELD_PRESSURE: &str = "pressureVolt";

/// Decode a raw payload into a validated sample.
///
/// # Example
///
/// ```rust
/// use vitalwatch_core::codec;
///
/// let sample = codec::decode(br#"{"spo2": 96, "pressureVolt": 1.2}"#).unwrap();
/// assert_eq!(sample.heart_rate_bpm, None);
/// assert_eq!(sample.oxygen_saturation_pct, Some(96.0));
/// assert_eq!(sample.pressure_volts, Some(1.2));
///
/// assert!(codec::decode(b"not json").is_err());
/// ```
pub fn decode(payload: &[u8]) -> Result<TelemetrySample, DecodeError> {
    let value: Value = serde_json::from_slice(payload)?;
    let Value::Object(object) = value else {
        return Err(DecodeError::NotAnObject);
    };

    let sample = TelemetrySample {
        heart_rate_bpm: finite_field(&object, FIELD_HEART_RATE),
        oxygen_saturation_pct: finite_field(&object, FIELD_OXYGEN_SATURATION),
        pressure_volts: finite_field(&object, FIELD_PRESSURE),
    };

    if sample.is_empty() {
        return Err(DecodeError::NoReadings);
    }
    Ok(sample)
}

fn finite_field(object: &Map<String, Value>, name: &str) -> Option<f64> {
    object
        .get(name)
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite())
}
