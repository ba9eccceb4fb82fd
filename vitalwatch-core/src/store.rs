//! Live telemetry state shared between the ingest task and readers.

use std::num::NonZeroUsize;

use parking_lot::Mutex;
use vitalwatch_types::{LiveReading, PressurePoint, TelemetrySample};

use crate::window::SlidingWindow;

/// Counters describing what the ingest pipeline did with inbound messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IngestStats {
    /// Samples applied to the live reading and/or pressure window.
    pub samples_applied: u64,
    /// Messages discarded because they could not be decoded.
    pub decode_failures: u64,
    /// Well-formed objects with no valid reading in them.
    pub empty_messages: u64,
    /// Messages on topics other than the subscribed one.
    pub messages_ignored: u64,
}

/// Identifies one open period of the store.
///
/// Writers tag every mutation with the generation they were started under;
/// mutations from a stale generation are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generation(u64);

/// The live reading, the pressure window and the ingest counters.
///
/// All state sits behind one lock together with the open/closed gate, so once
/// [`close`](TelemetryStore::close) returns no writer can change anything.
#[derive(Debug)]
pub struct TelemetryStore {
    inner: Mutex<StoreInner>,
}

#[derive(Debug)]
struct StoreInner {
    generation: u64,
    accepting: bool,
    observed: bool,
    live: LiveReading,
    pressure: SlidingWindow<PressurePoint>,
    last_timestamp_ms: u64,
    stats: IngestStats,
}

impl TelemetryStore {
    /// Create a closed, empty store.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self::with_window(SlidingWindow::new(capacity))
    }

    fn with_window(pressure: SlidingWindow<PressurePoint>) -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                generation: 0,
                accepting: false,
                observed: false,
                live: LiveReading::new(),
                pressure,
                last_timestamp_ms: 0,
                stats: IngestStats::default(),
            }),
        }
    }

    /// Open the store for a new writer, optionally emptying it first.
    pub fn open(&self, reset: bool) -> Generation {
        let mut inner = self.inner.lock();
        if reset {
            inner.live.clear();
            inner.pressure.clear();
            inner.last_timestamp_ms = 0;
            inner.stats = IngestStats::default();
        }
        inner.generation += 1;
        inner.accepting = true;
        inner.observed = false;
        Generation(inner.generation)
    }

    /// Stop accepting writes from any generation.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.accepting = false;
        inner.observed = false;
    }

    /// Apply a decoded sample received at `received_ms`.
    ///
    /// Returns false if the store is closed or `generation` is stale.
    pub fn apply(&self, generation: Generation, sample: &TelemetrySample, received_ms: u64) -> bool {
        let mut inner = self.inner.lock();
        if !inner.admits(generation) {
            return false;
        }

        inner.live.apply(sample);
        if let Some(volts) = sample.pressure_volts {
            // Receipt order is the trend order, even if the wall clock steps back
            let timestamp_ms = received_ms.max(inner.last_timestamp_ms);
            inner.last_timestamp_ms = timestamp_ms;
            inner.pressure.append(PressurePoint::new(timestamp_ms, volts));
        }
        inner.stats.samples_applied += 1;
        true
    }

    pub fn record_decode_failure(&self, generation: Generation) {
        let mut inner = self.inner.lock();
        if inner.admits(generation) {
            inner.stats.decode_failures += 1;
        }
    }

    pub fn record_empty(&self, generation: Generation) {
        let mut inner = self.inner.lock();
        if inner.admits(generation) {
            inner.stats.empty_messages += 1;
        }
    }

    pub fn record_ignored(&self, generation: Generation) {
        let mut inner = self.inner.lock();
        if inner.admits(generation) {
            inner.stats.messages_ignored += 1;
        }
    }

    /// Note that the writer has seen its first connection notice.
    pub fn mark_observed(&self, generation: Generation) {
        let mut inner = self.inner.lock();
        if inner.admits(generation) {
            inner.observed = true;
        }
    }

    /// True once the current writer has seen a connection notice.
    pub fn is_observed(&self) -> bool {
        self.inner.lock().observed
    }

    /// True while a writer is admitted.
    pub fn is_open(&self) -> bool {
        self.inner.lock().accepting
    }

    pub fn live_reading(&self) -> LiveReading {
        self.inner.lock().live
    }

    /// Pressure points, oldest to newest.
    pub fn pressure_snapshot(&self) -> Vec<PressurePoint> {
        self.inner.lock().pressure.snapshot()
    }

    pub fn stats(&self) -> IngestStats {
        self.inner.lock().stats
    }
}

impl StoreInner {
    fn admits(&self, generation: Generation) -> bool {
        self.accepting && self.generation == generation.0
    }
}

impl Default for TelemetryStore {
    fn default() -> Self {
        Self::with_window(SlidingWindow::default())
    }
}
