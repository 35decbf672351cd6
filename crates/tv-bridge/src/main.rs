//! tv-bridge — plays a live UDP MPEG-TS stream through the tv-player
//! facade and logs the callback traffic.
//!
//! ## Wiring
//! 1. **Ingest**: a receive thread pumps datagrams into the ring buffer.
//! 2. **Probe engine**: drains the ring, acquires transport sync, and
//!    reports state/errors the way a real demux/decode pipeline would.
//! 3. **Facade**: the session controller translates engine events into the
//!    stable `on_info`/`on_error` contract, logged here.
//!
//! Runs until ctrl-c, a playback error, or end of stream.

mod cli;
mod probe;
mod sink;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::RecvTimeoutError;
use tracing_subscriber::EnvFilter;

use tv_player::engine::{PlaybackEngine, PlayerCallback};
use tv_player::session::TvPlayer;
use tv_player_types::{ErrorCategory, Info, PlayerState};

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tv_bridge=info")),
        )
        .init();

    let player = Arc::new(TvPlayer::with_config(
        Box::new(|| Box::new(probe::TsProbeEngine::new()) as Box<dyn PlaybackEngine>),
        args.ingest_config(),
    ));

    player
        .set_video_sink(Some(Arc::new(sink::LogVideoSink::default())))
        .context("set video sink")?;
    player.set_callback(Some(Arc::new(LogCallback)));
    if args.paused {
        player.pause().context("pause before configure")?;
    }
    player.configure(&args.uri).context("configure stream")?;

    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(());
    })
    .context("install ctrl-c handler")?;

    let interval = Duration::from_secs(args.status_interval_secs.max(1));
    loop {
        match shutdown_rx.recv_timeout(interval) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                tracing::info!("shutdown requested");
                break;
            }
            Err(RecvTimeoutError::Timeout) => {
                let status = player.status();
                tracing::info!(
                    state = ?status.state,
                    buffered_bytes = status.buffered_bytes,
                    received_bytes = status.received_bytes,
                    received_datagrams = status.received_datagrams,
                    bitrate_bps = ?status.bitrate_bps,
                    "stream status"
                );
                if matches!(status.state, PlayerState::Error | PlayerState::Ended) {
                    break;
                }
            }
        }
    }

    player.stop().context("stop playback")?;
    player.release().context("release player")?;
    Ok(())
}

/// Forwards the facade's callback contract into logs.
struct LogCallback;

impl PlayerCallback for LogCallback {
    fn on_error(&self, error: ErrorCategory) {
        tracing::error!(error = ?error, "playback error");
    }

    fn on_info(&self, info: Info) {
        tracing::info!(info = ?info, "playback info");
    }
}
