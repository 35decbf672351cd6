//! Receive-side bandwidth accounting.
//!
//! One meter per session, constructed at configure time and handed to the
//! datagram source explicitly. Track-selection strategies that want a
//! throughput estimate take an `Arc<BandwidthMeter>` as a dependency
//! instead of reaching for process-global state, which keeps sessions
//! independently testable.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Minimum observation window before a bitrate estimate is reported.
const MIN_ESTIMATE_WINDOW_MS: u128 = 200;

/// Byte/datagram counters plus an elapsed-time bitrate estimate.
///
/// Updated from the receive loop, read from anywhere; counters are
/// relaxed atomics, so snapshots are best-effort.
#[derive(Debug)]
pub struct BandwidthMeter {
    started: Instant,
    total_bytes: AtomicU64,
    total_datagrams: AtomicU64,
}

impl Default for BandwidthMeter {
    fn default() -> Self {
        Self::new()
    }
}

impl BandwidthMeter {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            total_bytes: AtomicU64::new(0),
            total_datagrams: AtomicU64::new(0),
        }
    }

    /// Record one received datagram payload.
    pub fn on_transfer(&self, bytes: usize) {
        self.total_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
        self.total_datagrams.fetch_add(1, Ordering::Relaxed);
    }

    /// Total payload bytes observed.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::Relaxed)
    }

    /// Total datagrams observed.
    pub fn total_datagrams(&self) -> u64 {
        self.total_datagrams.load(Ordering::Relaxed)
    }

    /// Average receive bitrate in bits per second since construction.
    ///
    /// Returns `None` until at least one datagram arrived and the
    /// observation window is long enough to mean anything.
    pub fn bitrate_bps(&self) -> Option<u64> {
        let bytes = self.total_bytes();
        let elapsed_ms = self.started.elapsed().as_millis();
        if bytes == 0 || elapsed_ms < MIN_ESTIMATE_WINDOW_MS {
            return None;
        }
        let bits = bytes.saturating_mul(8) as u128;
        Some((bits.saturating_mul(1000) / elapsed_ms) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn counters_accumulate() {
        let meter = BandwidthMeter::new();
        meter.on_transfer(1000);
        meter.on_transfer(500);
        assert_eq!(meter.total_bytes(), 1500);
        assert_eq!(meter.total_datagrams(), 2);
    }

    #[test]
    fn bitrate_unavailable_before_any_traffic() {
        let meter = BandwidthMeter::new();
        assert_eq!(meter.bitrate_bps(), None);
    }

    #[test]
    fn bitrate_reported_after_window_elapses() {
        let meter = BandwidthMeter::new();
        meter.on_transfer(125_000);
        std::thread::sleep(Duration::from_millis(250));
        let bps = meter.bitrate_bps().expect("window elapsed");
        // 125 kB over >=250 ms is at most 4 Mbit/s.
        assert!(bps > 0);
        assert!(bps <= 4_000_000);
    }
}
