//! Playback session controller.
//!
//! [`TvPlayer`] is the only type host applications talk to. It owns at most
//! one active endpoint + ring + datagram source + engine instance, drives
//! the session state machine, and translates engine events into the stable
//! callback contract on a dedicated dispatch thread.
//!
//! Control operations serialize on one controller-owned lock; they are not
//! reentrant against each other. Only teardown blocks the control thread,
//! bounded by the source poll interval and the dispatch poll interval.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, unbounded};
use tv_player_types::{ErrorCategory, Info, PlayerState, PlayerStatus};

use crate::bandwidth::BandwidthMeter;
use crate::classify::classify;
use crate::config::IngestConfig;
use crate::engine::{EngineEvent, EngineFactory, PlaybackEngine, PlayerCallback, VideoSink};
use crate::error::PlayerError;
use crate::ring::RingBuffer;
use crate::source::{DatagramSource, StreamEndpoint};
use crate::translate;

/// How often the dispatch loop re-checks its stop flag while waiting for
/// engine events. Bounds the dispatch share of teardown latency.
const DISPATCH_POLL: Duration = Duration::from_millis(50);

/// Live UDP stream playback facade.
///
/// One session per instance. Re-configuring while active tears the
/// previous session down first; `release` is terminal.
///
/// Callbacks fire on the session's internal dispatch thread. Do not call
/// control operations from inside a callback — post to another thread
/// instead, or teardown would wait on the thread it is called from.
pub struct TvPlayer {
    inner: Mutex<SessionInner>,
    shared: Arc<SharedState>,
}

/// State the dispatch thread shares with the control surface.
struct SharedState {
    state: Mutex<PlayerState>,
    callback: Mutex<Option<Arc<dyn PlayerCallback>>>,
    /// First classified failure per configured session wins; later engine
    /// errors are logged only.
    error_delivered: AtomicBool,
}

struct SessionInner {
    engine_factory: EngineFactory,
    config: IngestConfig,
    endpoint: Option<StreamEndpoint>,
    engine: Option<Box<dyn PlaybackEngine>>,
    ring: Option<Arc<RingBuffer>>,
    source: Option<DatagramSource>,
    meter: Option<Arc<BandwidthMeter>>,
    sink: Option<Arc<dyn VideoSink>>,
    sink_attached: bool,
    /// Last requested play intent. Survives stop/teardown and is applied
    /// again on the next configure (best-effort autoplay restore).
    play_when_ready: bool,
    dispatch: Option<DispatchHandle>,
}

struct DispatchHandle {
    stop: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

impl TvPlayer {
    /// Create a player with default ingestion tuning.
    ///
    /// `engine_factory` builds a fresh engine instance for every
    /// configured session.
    pub fn new(engine_factory: EngineFactory) -> Self {
        Self::with_config(engine_factory, IngestConfig::default())
    }

    pub fn with_config(engine_factory: EngineFactory, config: IngestConfig) -> Self {
        Self {
            inner: Mutex::new(SessionInner {
                engine_factory,
                config,
                endpoint: None,
                engine: None,
                ring: None,
                source: None,
                meter: None,
                sink: None,
                sink_attached: false,
                play_when_ready: true,
                dispatch: None,
            }),
            shared: Arc::new(SharedState {
                state: Mutex::new(PlayerState::Idle),
                callback: Mutex::new(None),
                error_delivered: AtomicBool::new(false),
            }),
        }
    }

    /// Register the observer. Replacing drops the previous registration;
    /// there is no multicast.
    pub fn set_callback(&self, callback: Option<Arc<dyn PlayerCallback>>) {
        *self.shared.callback.lock().unwrap() = callback;
    }

    /// Configure a new `udp://host:port` session.
    ///
    /// The URI is validated before anything is torn down or allocated. Any
    /// previously active session is then torn down (its sink runs the
    /// clear sequence), the ring + datagram source are built, a fresh
    /// engine is prepared against the ring, the recorded sink is attached,
    /// and the remembered play intent is applied. A bind failure is
    /// returned synchronously and parks the session in the error state —
    /// restart is an explicit caller action.
    pub fn configure(&self, uri: &str) -> Result<(), PlayerError> {
        let mut inner = self.inner.lock().unwrap();
        self.guard("configure")?;
        let endpoint = StreamEndpoint::parse(uri)?;
        tracing::info!(endpoint = %endpoint.uri(), "configure session");

        self.teardown_locked(&mut inner);
        self.shared.error_delivered.store(false, Ordering::Relaxed);

        let meter = Arc::new(BandwidthMeter::new());
        let ring = Arc::new(RingBuffer::with_config(&inner.config));
        let source =
            match DatagramSource::open(&endpoint, ring.clone(), meter.clone(), &inner.config) {
                Ok(source) => source,
                Err(e) => {
                    *self.shared.state.lock().unwrap() = PlayerState::Error;
                    return Err(e);
                }
            };

        let (events_tx, events_rx) = unbounded();
        let stop = Arc::new(AtomicBool::new(false));
        let shared_for_loop = self.shared.clone();
        let stop_for_loop = stop.clone();
        let join = thread::spawn(move || dispatch_loop(events_rx, shared_for_loop, stop_for_loop));

        let mut engine = (inner.engine_factory)();
        engine.prepare(ring.clone(), events_tx);
        if let Some(sink) = inner.sink.clone() {
            engine.set_video_sink(Some(sink.clone()));
            sink.attach();
            inner.sink_attached = true;
        }
        engine.set_play_when_ready(inner.play_when_ready);

        inner.endpoint = Some(endpoint);
        inner.meter = Some(meter);
        inner.ring = Some(ring);
        inner.source = Some(source);
        inner.engine = Some(engine);
        inner.dispatch = Some(DispatchHandle { stop, join });
        *self.shared.state.lock().unwrap() = PlayerState::Preparing;
        Ok(())
    }

    /// Record (and on a live session, swap) the video sink.
    ///
    /// Legal before `configure`; the sink is then attached when a session
    /// comes up. Swapping detaches the previous sink (its clear sequence
    /// completes first).
    pub fn set_video_sink(&self, sink: Option<Arc<dyn VideoSink>>) -> Result<(), PlayerError> {
        let mut inner = self.inner.lock().unwrap();
        self.guard("set_video_sink")?;

        if inner.engine.is_some() {
            if inner.sink_attached {
                inner.engine.as_mut().unwrap().set_video_sink(None);
                if let Some(old) = inner.sink.as_ref() {
                    old.detach();
                }
                inner.sink_attached = false;
            }
            if let Some(new_sink) = sink.clone() {
                inner.engine.as_mut().unwrap().set_video_sink(Some(new_sink.clone()));
                new_sink.attach();
                inner.sink_attached = true;
            }
        }
        inner.sink = sink;
        Ok(())
    }

    /// Resume (or begin) consumption as soon as the engine is ready.
    pub fn start(&self) -> Result<(), PlayerError> {
        let mut inner = self.inner.lock().unwrap();
        self.guard("start")?;
        inner.play_when_ready = true;
        if let Some(engine) = inner.engine.as_mut() {
            engine.set_play_when_ready(true);
        }
        Ok(())
    }

    /// Pause consumption without tearing the session down.
    pub fn pause(&self) -> Result<(), PlayerError> {
        let mut inner = self.inner.lock().unwrap();
        self.guard("pause")?;
        inner.play_when_ready = false;
        if let Some(engine) = inner.engine.as_mut() {
            engine.set_play_when_ready(false);
        }
        Ok(())
    }

    /// Tear down the active session and return to idle.
    ///
    /// The attached sink has run its clear-to-black sequence before this
    /// returns. The play intent is kept for the next configure.
    pub fn stop(&self) -> Result<(), PlayerError> {
        let mut inner = self.inner.lock().unwrap();
        self.guard("stop")?;
        self.teardown_locked(&mut inner);
        Ok(())
    }

    /// Terminal teardown. Idempotent; every other operation afterwards
    /// fails with an illegal-state error.
    pub fn release(&self) -> Result<(), PlayerError> {
        let mut inner = self.inner.lock().unwrap();
        if *self.shared.state.lock().unwrap() == PlayerState::Released {
            return Ok(());
        }
        self.teardown_locked(&mut inner);
        *self.shared.state.lock().unwrap() = PlayerState::Released;
        tracing::info!("player released");
        Ok(())
    }

    /// Current session state.
    pub fn state(&self) -> PlayerState {
        *self.shared.state.lock().unwrap()
    }

    /// Best-effort status snapshot. Legal in every state.
    pub fn status(&self) -> PlayerStatus {
        let inner = self.inner.lock().unwrap();
        PlayerStatus {
            state: self.state(),
            endpoint: inner.endpoint.as_ref().map(|e| e.uri()),
            buffered_bytes: inner.ring.as_ref().map_or(0, |r| r.occupied()),
            capacity_bytes: inner.ring.as_ref().map_or(0, |r| r.capacity()),
            received_bytes: inner.meter.as_ref().map_or(0, |m| m.total_bytes()),
            received_datagrams: inner.meter.as_ref().map_or(0, |m| m.total_datagrams()),
            bitrate_bps: inner.meter.as_ref().and_then(|m| m.bitrate_bps()),
        }
    }

    fn guard(&self, op: &'static str) -> Result<(), PlayerError> {
        let state = *self.shared.state.lock().unwrap();
        if state == PlayerState::Released {
            return Err(PlayerError::IllegalState { op, state });
        }
        Ok(())
    }

    /// Tear down dispatch, engine, sink attachment, source and ring, in
    /// that order, and return the session to idle.
    ///
    /// Dispatch stops first so teardown emits no callbacks; the source
    /// close completes (bounded by its poll interval) before this returns,
    /// so a subsequent configure can never race two receive loops onto one
    /// ring.
    fn teardown_locked(&self, inner: &mut SessionInner) {
        if let Some(dispatch) = inner.dispatch.take() {
            dispatch.stop.store(true, Ordering::Relaxed);
            let _ = dispatch.join.join();
        }
        if let Some(mut engine) = inner.engine.take() {
            if inner.sink_attached {
                engine.set_video_sink(None);
                if let Some(sink) = inner.sink.as_ref() {
                    sink.detach();
                }
                inner.sink_attached = false;
            }
            engine.stop();
            engine.release();
        }
        if let Some(mut source) = inner.source.take() {
            source.close();
        }
        inner.ring = None;
        inner.meter = None;
        inner.endpoint = None;
        *self.shared.state.lock().unwrap() = PlayerState::Idle;
    }
}

impl Drop for TvPlayer {
    fn drop(&mut self) {
        if self.inner.is_poisoned() || self.shared.state.is_poisoned() {
            return;
        }
        let _ = self.release();
    }
}

impl SharedState {
    fn is_parked(&self) -> bool {
        matches!(
            *self.state.lock().unwrap(),
            PlayerState::Error | PlayerState::Released
        )
    }

    /// Invoke the observer outside any lock held by the caller.
    fn notify_info(&self, info: Info) {
        let callback = self.callback.lock().unwrap().clone();
        if let Some(callback) = callback {
            callback.on_info(info);
        }
    }

    fn notify_error(&self, error: ErrorCategory) {
        let callback = self.callback.lock().unwrap().clone();
        if let Some(callback) = callback {
            callback.on_error(error);
        }
    }
}

/// Consume engine events until stopped or the engine drops its sender.
fn dispatch_loop(events: Receiver<EngineEvent>, shared: Arc<SharedState>, stop: Arc<AtomicBool>) {
    loop {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        match events.recv_timeout(DISPATCH_POLL) {
            Ok(event) => handle_event(&shared, event),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    tracing::debug!("event dispatch exited");
}

fn handle_event(shared: &SharedState, event: EngineEvent) {
    tracing::debug!(event = ?event, "engine event");
    match event {
        EngineEvent::StateChanged(engine_state) => {
            {
                let mut state = shared.state.lock().unwrap();
                if matches!(*state, PlayerState::Error | PlayerState::Released) {
                    // Parked; restart is an explicit caller action.
                    return;
                }
                *state = translate::player_state(engine_state);
            }
            shared.notify_info(translate::translate_state(engine_state));
        }
        EngineEvent::PositionDiscontinuity => {
            if !shared.is_parked() {
                shared.notify_info(translate::discontinuity());
            }
        }
        EngineEvent::Loading(loading) => {
            tracing::debug!(loading, "source loading changed");
        }
        EngineEvent::TracksChanged | EngineEvent::TimelineChanged => {
            // Engine bookkeeping; not part of the callback contract.
        }
        EngineEvent::Error(raw) => {
            let category = classify(&raw);
            tracing::error!(category = ?category, error = ?raw, "playback failed");
            {
                let mut state = shared.state.lock().unwrap();
                if *state == PlayerState::Released {
                    return;
                }
                *state = PlayerState::Error;
            }
            if !shared.error_delivered.swap(true, Ordering::Relaxed) {
                shared.notify_error(category);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{
        DecoderInitFailure, EngineError, EngineState, PlaybackEngine, RendererCause,
    };
    use crossbeam_channel::Sender;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    /// Shared recorder behind the mock engine factory.
    #[derive(Default)]
    struct EngineProbe {
        calls: Mutex<Vec<String>>,
        events: Mutex<Option<Sender<EngineEvent>>>,
        created: AtomicUsize,
    }

    impl EngineProbe {
        fn push(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn send(&self, event: EngineEvent) {
            self.events
                .lock()
                .unwrap()
                .as_ref()
                .expect("engine prepared")
                .send(event)
                .unwrap();
        }
    }

    struct MockEngine {
        probe: Arc<EngineProbe>,
    }

    impl PlaybackEngine for MockEngine {
        fn prepare(&mut self, _source: Arc<RingBuffer>, events: Sender<EngineEvent>) {
            self.probe.push("prepare");
            *self.probe.events.lock().unwrap() = Some(events);
        }

        fn set_play_when_ready(&mut self, play_when_ready: bool) {
            self.probe.push(format!("play_when_ready:{play_when_ready}"));
        }

        fn set_video_sink(&mut self, sink: Option<Arc<dyn VideoSink>>) {
            self.probe.push(format!("sink:{}", sink.is_some()));
        }

        fn stop(&mut self) {
            self.probe.push("stop");
        }

        fn release(&mut self) {
            self.probe.push("release");
            *self.probe.events.lock().unwrap() = None;
        }
    }

    fn probe_factory(probe: Arc<EngineProbe>) -> EngineFactory {
        Box::new(move || {
            probe.created.fetch_add(1, Ordering::Relaxed);
            Box::new(MockEngine {
                probe: probe.clone(),
            })
        })
    }

    #[derive(Default)]
    struct MockSink {
        attached: AtomicUsize,
        detached: AtomicUsize,
    }

    impl VideoSink for MockSink {
        fn attach(&self) {
            self.attached.fetch_add(1, Ordering::Relaxed);
        }

        fn detach(&self) {
            self.detached.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[derive(Default)]
    struct RecordingCallback {
        infos: Mutex<Vec<Info>>,
        errors: Mutex<Vec<ErrorCategory>>,
    }

    impl PlayerCallback for RecordingCallback {
        fn on_error(&self, error: ErrorCategory) {
            self.errors.lock().unwrap().push(error);
        }

        fn on_info(&self, info: Info) {
            self.infos.lock().unwrap().push(info);
        }
    }

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    fn test_player(probe: &Arc<EngineProbe>) -> TvPlayer {
        TvPlayer::with_config(
            probe_factory(probe.clone()),
            IngestConfig {
                max_datagram_size: 2048,
                depth_datagrams: 4,
                poll_interval: Duration::from_millis(20),
            },
        )
    }

    const LOOPBACK: &str = "udp://127.0.0.1:0";

    #[test]
    fn configure_rejects_tcp_scheme_without_allocating() {
        let probe = Arc::new(EngineProbe::default());
        let player = test_player(&probe);

        let err = player.configure("tcp://host:1").unwrap_err();
        assert!(matches!(err, PlayerError::Configuration(_)));
        // No engine was built, no socket bound, state untouched.
        assert_eq!(probe.created.load(Ordering::Relaxed), 0);
        assert_eq!(player.state(), PlayerState::Idle);
        assert_eq!(player.status().capacity_bytes, 0);
    }

    #[test]
    fn start_after_release_fails_illegal_state() {
        let probe = Arc::new(EngineProbe::default());
        let player = test_player(&probe);

        player.configure(LOOPBACK).unwrap();
        player.release().unwrap();
        assert_eq!(player.state(), PlayerState::Released);

        let err = player.start().unwrap_err();
        assert!(matches!(
            err,
            PlayerError::IllegalState {
                op: "start",
                state: PlayerState::Released,
            }
        ));
        assert!(player.configure(LOOPBACK).is_err());
        assert!(player.stop().is_err());
        // Release stays idempotent.
        player.release().unwrap();
    }

    #[test]
    fn configure_prepares_engine_attaches_sink_and_applies_autoplay() {
        let probe = Arc::new(EngineProbe::default());
        let player = test_player(&probe);
        let sink = Arc::new(MockSink::default());

        // Sink before configure is legal and recorded for later.
        player.set_video_sink(Some(sink.clone())).unwrap();
        assert_eq!(sink.attached.load(Ordering::Relaxed), 0);

        player.configure(LOOPBACK).unwrap();
        assert_eq!(player.state(), PlayerState::Preparing);
        assert_eq!(
            probe.calls(),
            vec!["prepare", "sink:true", "play_when_ready:true"]
        );
        assert_eq!(sink.attached.load(Ordering::Relaxed), 1);
        assert!(player.status().endpoint.unwrap().starts_with("udp://127.0.0.1:"));
    }

    #[test]
    fn stop_runs_sink_clear_before_returning() {
        let probe = Arc::new(EngineProbe::default());
        let player = test_player(&probe);
        let sink = Arc::new(MockSink::default());

        player.set_video_sink(Some(sink.clone())).unwrap();
        player.configure(LOOPBACK).unwrap();
        player.stop().unwrap();

        // Clear sequence already ran when stop returned.
        assert_eq!(sink.detached.load(Ordering::Relaxed), 1);
        assert_eq!(player.state(), PlayerState::Idle);
        let calls = probe.calls();
        assert!(calls.contains(&"sink:false".to_string()));
        assert!(calls.ends_with(&["stop".to_string(), "release".to_string()]));
    }

    #[test]
    fn pause_intent_survives_reconfigure() {
        let probe = Arc::new(EngineProbe::default());
        let player = test_player(&probe);

        player.pause().unwrap();
        player.configure(LOOPBACK).unwrap();
        assert!(probe.calls().contains(&"play_when_ready:false".to_string()));

        player.start().unwrap();
        player.configure(LOOPBACK).unwrap();
        assert_eq!(probe.created.load(Ordering::Relaxed), 2);
        assert_eq!(
            probe.calls().last().unwrap(),
            "play_when_ready:true"
        );
    }

    #[test]
    fn replacing_callback_drops_previous_registration() {
        struct FlagOnDrop(Arc<AtomicBool>);
        impl PlayerCallback for FlagOnDrop {
            fn on_error(&self, _: ErrorCategory) {}
            fn on_info(&self, _: Info) {}
        }
        impl Drop for FlagOnDrop {
            fn drop(&mut self) {
                self.0.store(true, Ordering::Relaxed);
            }
        }

        let probe = Arc::new(EngineProbe::default());
        let player = test_player(&probe);
        let dropped = Arc::new(AtomicBool::new(false));

        player.set_callback(Some(Arc::new(FlagOnDrop(dropped.clone()))));
        assert!(!dropped.load(Ordering::Relaxed));
        player.set_callback(Some(Arc::new(RecordingCallback::default())));
        assert!(dropped.load(Ordering::Relaxed));
    }

    #[test]
    fn engine_states_oscillate_and_reach_callback() {
        let probe = Arc::new(EngineProbe::default());
        let player = test_player(&probe);
        let callback = Arc::new(RecordingCallback::default());
        player.set_callback(Some(callback.clone()));

        player.configure(LOOPBACK).unwrap();
        probe.send(EngineEvent::StateChanged(EngineState::Buffering));
        assert!(wait_for(|| player.state() == PlayerState::Buffering));

        probe.send(EngineEvent::StateChanged(EngineState::Ready));
        assert!(wait_for(|| player.state() == PlayerState::Ready));

        probe.send(EngineEvent::PositionDiscontinuity);
        assert!(wait_for(|| {
            callback.infos.lock().unwrap().as_slice()
                == [Info::Buffering, Info::Ready, Info::PositionDiscontinuity]
        }));
        // Discontinuity did not disturb the session state.
        assert_eq!(player.state(), PlayerState::Ready);

        player.release().unwrap();
    }

    #[test]
    fn first_error_parks_session_and_later_events_are_ignored() {
        let probe = Arc::new(EngineProbe::default());
        let player = test_player(&probe);
        let callback = Arc::new(RecordingCallback::default());
        player.set_callback(Some(callback.clone()));

        player.configure(LOOPBACK).unwrap();
        probe.send(EngineEvent::Error(EngineError::Source {
            message: "demux failed".to_string(),
        }));
        assert!(wait_for(|| player.state() == PlayerState::Error));
        assert!(wait_for(|| {
            callback.errors.lock().unwrap().as_slice() == [ErrorCategory::SourceFailure]
        }));

        // Second failure and a late state change are logged, not surfaced.
        probe.send(EngineEvent::Error(EngineError::Renderer {
            cause: RendererCause::DecoderInit(DecoderInitFailure {
                decoder_name: None,
                secure_decoder_required: false,
                caused_by_query_failure: false,
            }),
        }));
        probe.send(EngineEvent::StateChanged(EngineState::Ready));
        thread::sleep(Duration::from_millis(150));
        assert_eq!(callback.errors.lock().unwrap().len(), 1);
        assert_eq!(player.state(), PlayerState::Error);
        assert!(callback.infos.lock().unwrap().is_empty());

        // Explicit restart clears the parked state.
        player.configure(LOOPBACK).unwrap();
        assert_eq!(player.state(), PlayerState::Preparing);
    }

    #[test]
    fn bind_conflict_surfaces_bind_error_and_parks_session() {
        let taken = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        let probe = Arc::new(EngineProbe::default());
        let player = test_player(&probe);

        let err = player
            .configure(&format!("udp://127.0.0.1:{port}"))
            .unwrap_err();
        assert!(matches!(err, PlayerError::Bind { .. }));
        assert_eq!(player.state(), PlayerState::Error);
        assert_eq!(probe.created.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn swapping_sink_on_live_session_detaches_previous() {
        let probe = Arc::new(EngineProbe::default());
        let player = test_player(&probe);
        let first = Arc::new(MockSink::default());
        let second = Arc::new(MockSink::default());

        player.set_video_sink(Some(first.clone())).unwrap();
        player.configure(LOOPBACK).unwrap();
        player.set_video_sink(Some(second.clone())).unwrap();

        assert_eq!(first.detached.load(Ordering::Relaxed), 1);
        assert_eq!(second.attached.load(Ordering::Relaxed), 1);

        player.stop().unwrap();
        assert_eq!(second.detached.load(Ordering::Relaxed), 1);
    }
}
