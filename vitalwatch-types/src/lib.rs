//! # vitalwatch-types
//!
//! Core types shared by every part of vitalwatch: the decoded telemetry
//! sample, the live per-metric readings, points of the pressure trend and the
//! connection/session state enumerations exposed to a presentation layer.
//!
//! ## Features
//!
//! - `std` (default): Standard library support
//! - `serde`: Serialization of every public type via serde
//!
//! ## Example
//!
//! ```rust
//! use vitalwatch_types::{LiveReading, TelemetrySample};
//!
//! let mut live = LiveReading::new();
//! live.apply(&TelemetrySample::new().heart_rate(72.0));
//! live.apply(&TelemetrySample::new().oxygen_saturation(96.0).pressure(1.2));
//!
//! assert_eq!(live.heart_rate_bpm, Some(72.0));
//! assert_eq!(live.oxygen_saturation_pct, Some(96.0));
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

mod point;
mod reading;
mod sample;
mod state;

pub use point::*;
pub use reading::*;
pub use sample::*;
pub use state::*;

/// Topic the telemetry devices publish on.
pub const TELEMETRY_TOPIC: &str = "telemetry";

/// Number of pressure points kept for the live trend.
pub const DEFAULT_WINDOW_CAPACITY: usize = 200;
