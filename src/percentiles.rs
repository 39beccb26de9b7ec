//! Nearest-rank latency percentiles.
//!
//! A percentile is read directly out of an ascending-sorted sample at index
//! `floor(len * p / 100)`, clamped to the last element. There is no
//! interpolation between adjacent ranks, so reported numbers are always real
//! observations and reproducible for a given sample.

use std::time::Duration;

/// Returns the `p`-th percentile (0-100) of an ascending-sorted slice.
///
/// Returns `Duration::ZERO` for an empty slice. Callers should treat that as
/// "no data" rather than a real measurement.
pub fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }

    let p = if p.is_nan() { 0.0 } else { p.clamp(0.0, 100.0) };
    let index = (sorted.len() as f64 * p / 100.0).floor() as usize;
    sorted[index.min(sorted.len() - 1)]
}

/// Converts a duration to fractional milliseconds.
pub fn as_millis_f64(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// The three latency percentiles reported each cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencyPercentiles {
    pub p50: Duration,
    pub p95: Duration,
    pub p99: Duration,
}

impl LatencyPercentiles {
    /// Computes p50/p95/p99 from an ascending-sorted slice.
    ///
    /// Returns `None` when there is nothing to measure.
    pub fn from_sorted(sorted: &[Duration]) -> Option<Self> {
        if sorted.is_empty() {
            return None;
        }

        Some(Self {
            p50: percentile(sorted, 50.0),
            p95: percentile(sorted, 95.0),
            p99: percentile(sorted, 99.0),
        })
    }

    pub fn p50_ms(&self) -> f64 {
        as_millis_f64(self.p50)
    }

    pub fn p95_ms(&self) -> f64 {
        as_millis_f64(self.p95)
    }

    pub fn p99_ms(&self) -> f64 {
        as_millis_f64(self.p99)
    }

    /// Format as a human-readable string.
    pub fn format(&self) -> String {
        format!(
            "p50={:.2}ms, p95={:.2}ms, p99={:.2}ms",
            self.p50_ms(),
            self.p95_ms(),
            self.p99_ms()
        )
    }
}
