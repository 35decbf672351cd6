use std::time::Duration;

/// Ingestion tuning parameters shared by the ring buffer and datagram source.
///
/// This replaces an ad-hoc per-prepare factory: every session builds its
/// ring and source from one explicit config value.
#[derive(Clone, Debug)]
pub struct IngestConfig {
    /// Largest single datagram payload accepted without truncation.
    ///
    /// 65507 is the IPv4 UDP payload ceiling; streams never exceed it.
    pub max_datagram_size: usize,
    /// Ring depth in maximum-size datagrams.
    ///
    /// Capacity in bytes is `max_datagram_size * depth_datagrams`. Live
    /// playback only needs enough depth to ride out demux stalls; old
    /// bytes are overwritten once the ring is full.
    pub depth_datagrams: usize,
    /// Receive poll interval. Bounds how long `close()` waits for the
    /// receive loop to observe shutdown.
    pub poll_interval: Duration,
}

impl Default for IngestConfig {
    /// Defaults sized for broadcast MPEG-TS over UDP (~16 MiB of ring).
    fn default() -> Self {
        Self {
            max_datagram_size: 65_507,
            depth_datagrams: 256,
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl IngestConfig {
    /// Ring capacity in bytes for this config.
    ///
    /// Zero inputs fall back to one maximum-size datagram so a
    /// misconfigured session still gets a usable ring.
    pub fn capacity_bytes(&self) -> usize {
        let datagram = self.max_datagram_size.max(1);
        datagram.saturating_mul(self.depth_datagrams.max(1))
    }
}
