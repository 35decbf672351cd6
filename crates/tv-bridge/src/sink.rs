//! Logging video sink.
//!
//! There is no real display surface behind the CLI; this sink makes the
//! attach/detach lifecycle observable in logs and still honors the
//! detach contract: the clear-to-black sequence completes before
//! `detach` returns, so no stale frame could stay visible.

use std::sync::atomic::{AtomicUsize, Ordering};

use tv_player::engine::VideoSink;

#[derive(Debug, Default)]
pub struct LogVideoSink {
    attaches: AtomicUsize,
    clears: AtomicUsize,
}

impl LogVideoSink {
    /// Completed clear-to-black sequences.
    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::Relaxed)
    }
}

impl VideoSink for LogVideoSink {
    fn attach(&self) {
        let n = self.attaches.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(attach = n, "video sink attached");
    }

    fn detach(&self) {
        tracing::debug!("clearing video sink to black");
        self.clears.fetch_add(1, Ordering::Relaxed);
        tracing::info!("video sink detached");
    }
}
