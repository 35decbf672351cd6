use serde::{Deserialize, Serialize};

/// Informational playback signal delivered to the host application.
///
/// State values map 1:1 onto the playback engine's lifecycle states;
/// `PositionDiscontinuity` is an independent signal that may arrive
/// interleaved with state changes.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Info {
    /// Engine is idle (no source prepared, or playback was stopped).
    Idle,
    /// Engine is stalled waiting for enough buffered stream data.
    Buffering,
    /// Engine has enough data and is rendering (or ready to render).
    Ready,
    /// The stream ended.
    Ended,
    /// Presentation position jumped non-monotonically (for example after
    /// underrun recovery on a live stream).
    PositionDiscontinuity,
}

/// Stable classification of a playback failure.
///
/// This is the whole error vocabulary hosts see; the engine's
/// implementation-specific failure space is folded into it exactly once
/// per failure.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Enumerating the platform's decoders failed outright.
    DecoderQueryFailure,
    /// The content requires a secure (DRM-capable) decoder and none exists.
    NoSecureDecoderAvailable,
    /// No decoder for the stream's format exists on this platform.
    NoDecoderAvailable,
    /// A decoder was selected but failed to initialize.
    DecoderInitializationFailure,
    /// Failure in the data-source/demux stage.
    SourceFailure,
    /// Anything the other categories do not cover.
    UnknownFailure,
}

/// Lifecycle state of a playback session.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlayerState {
    /// No source configured.
    #[default]
    Idle,
    /// Source configured, engine preparing.
    Preparing,
    /// Engine is rendering (or ready to render).
    Ready,
    /// Engine is stalled waiting for stream data.
    Buffering,
    /// The stream ended.
    Ended,
    /// A failure parked the session; restart is an explicit caller action.
    Error,
    /// Terminal. Every control operation now fails.
    Released,
}

/// Best-effort status snapshot of a playback session.
///
/// Counter fields are read from live atomics and may lag each other by a
/// few datagrams; this payload is meant for host UIs, not for control
/// decisions.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerStatus {
    /// Current session state.
    pub state: PlayerState,
    /// Configured endpoint as a `udp://host:port` string, when active.
    pub endpoint: Option<String>,
    /// Bytes currently buffered in the ingestion ring.
    pub buffered_bytes: usize,
    /// Ingestion ring capacity in bytes.
    pub capacity_bytes: usize,
    /// Total payload bytes received since configure.
    pub received_bytes: u64,
    /// Total datagrams received since configure.
    pub received_datagrams: u64,
    /// Estimated receive bitrate in bits per second, once measurable.
    pub bitrate_bps: Option<u64>,
}
