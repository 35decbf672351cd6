use std::time::Duration;

use clap::Parser;
use tv_player::config::IngestConfig;

#[derive(Parser, Debug)]
#[command(name = "tv-bridge", version)]
pub struct Args {
    /// Stream endpoint, e.g. udp://239.0.0.1:5000
    pub uri: String,

    /// Largest accepted datagram payload in bytes (IPv4 UDP ceiling)
    #[arg(long, default_value_t = 65_507)]
    pub max_datagram_size: usize,

    /// Ingestion ring depth in maximum-size datagrams
    #[arg(long, default_value_t = 256)]
    pub depth_datagrams: usize,

    /// Receive poll interval in milliseconds (bounds teardown latency)
    #[arg(long, default_value_t = 100)]
    pub poll_interval_ms: u64,

    /// Seconds between status log lines
    #[arg(long, default_value_t = 5)]
    pub status_interval_secs: u64,

    /// Configure the stream paused instead of autoplaying
    #[arg(long)]
    pub paused: bool,
}

impl Args {
    pub fn ingest_config(&self) -> IngestConfig {
        IngestConfig {
            max_datagram_size: self.max_datagram_size,
            depth_datagrams: self.depth_datagrams,
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
        }
    }
}
