//! Collaborator seams: the playback engine, the video sink, and the
//! host-facing callback.
//!
//! The engine (demux/decode/render pipeline) is external to this crate.
//! It consumes the ingestion ring as its byte source and reports back over
//! a channel; everything the session needs from it fits the narrow
//! [`PlaybackEngine`] trait.

use std::sync::Arc;

use crossbeam_channel::Sender;
use tv_player_types::{ErrorCategory, Info};

use crate::ring::RingBuffer;

/// Playback lifecycle states an engine reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Buffering,
    Ready,
    Ended,
}

/// Raw failure record produced by an engine, classified exactly once.
#[derive(Clone, Debug)]
pub enum EngineError {
    /// Failure in the data-source/demux stage.
    Source { message: String },
    /// Failure in the decode/render stage.
    Renderer { cause: RendererCause },
    /// Failure outside both stages.
    Unexpected { message: String },
}

/// What went wrong inside the decode/render stage.
#[derive(Clone, Debug)]
pub enum RendererCause {
    /// Decoder selection/initialization failed.
    DecoderInit(DecoderInitFailure),
    /// Renderer failure unrelated to decoder initialization.
    Other { message: String },
}

/// Details of a decoder initialization failure.
#[derive(Clone, Debug)]
pub struct DecoderInitFailure {
    /// Name of the selected decoder; `None` when selection never produced
    /// a concrete decoder instance.
    pub decoder_name: Option<String>,
    /// The content requires a secure (DRM-capable) decoder.
    pub secure_decoder_required: bool,
    /// Decoder enumeration itself failed underneath the selection.
    pub caused_by_query_failure: bool,
}

/// Events an engine emits on the sender handed to [`PlaybackEngine::prepare`].
#[derive(Clone, Debug)]
pub enum EngineEvent {
    /// Playback lifecycle state changed.
    StateChanged(EngineState),
    /// Presentation position jumped non-monotonically.
    PositionDiscontinuity,
    /// Source loading resumed/paused. Logged, never surfaced.
    Loading(bool),
    /// The available track set changed. Logged, never surfaced.
    TracksChanged,
    /// The stream timeline changed. Logged, never surfaced.
    TimelineChanged,
    /// Playback failed.
    Error(EngineError),
}

/// Narrow interface the session drives an engine through.
///
/// Engines run their demux/decode loop on their own thread(s), polling the
/// ring handed to [`prepare`](Self::prepare) as the byte source and
/// reporting through the event sender. `release` must shut those threads
/// down and drop the sender.
pub trait PlaybackEngine: Send {
    /// Hand the engine its byte source and event channel. Called once per
    /// engine instance, before any other method.
    fn prepare(&mut self, source: Arc<RingBuffer>, events: Sender<EngineEvent>);

    /// Start or pause consumption. Pausing must not drain the source.
    fn set_play_when_ready(&mut self, play_when_ready: bool);

    /// Attach or clear the render target.
    fn set_video_sink(&mut self, sink: Option<Arc<dyn VideoSink>>);

    /// Stop playback; the engine may be prepared again afterwards.
    fn stop(&mut self);

    /// Terminal. Shut down engine threads and drop the event sender.
    fn release(&mut self);
}

/// Builds a fresh engine instance for each configured session.
pub type EngineFactory = Box<dyn Fn() -> Box<dyn PlaybackEngine> + Send>;

/// Display surface abstraction.
///
/// The session attaches the sink to the engine via
/// [`PlaybackEngine::set_video_sink`] and then notifies the sink itself
/// through this trait.
pub trait VideoSink: Send + Sync {
    /// The sink became the engine's render target.
    fn attach(&self);

    /// The sink is no longer a render target. Must complete the sink's
    /// clear-to-black sequence before returning so no stale frame stays
    /// visible.
    fn detach(&self);
}

/// Host-facing callback contract.
///
/// At most one live registration per session. Calls are delivered from the
/// session's internal dispatch thread (whichever thread the engine event
/// arrived on) — hosts that need main-thread delivery hop themselves.
pub trait PlayerCallback: Send + Sync {
    /// Playback failed; the session is now parked in the error state.
    fn on_error(&self, error: ErrorCategory);

    /// Informational state/discontinuity signal.
    fn on_info(&self, info: Info);
}
