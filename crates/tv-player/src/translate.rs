//! Maps engine lifecycle signals onto the stable `Info` vocabulary.
//!
//! State values map 1:1 by direct match (no runtime scan over the enum);
//! the discontinuity signal maps independently and may interleave with
//! state changes. Track-set and timeline signals are engine bookkeeping
//! and have no mapping here.

use tv_player_types::{Info, PlayerState};

use crate::engine::EngineState;

/// Host-facing info value for an engine playback state.
pub fn translate_state(state: EngineState) -> Info {
    match state {
        EngineState::Idle => Info::Idle,
        EngineState::Buffering => Info::Buffering,
        EngineState::Ready => Info::Ready,
        EngineState::Ended => Info::Ended,
    }
}

/// Host-facing info value for a position discontinuity.
pub fn discontinuity() -> Info {
    Info::PositionDiscontinuity
}

/// Session state a live engine state drives the session into.
pub fn player_state(state: EngineState) -> PlayerState {
    match state {
        EngineState::Idle => PlayerState::Idle,
        EngineState::Buffering => PlayerState::Buffering,
        EngineState::Ready => PlayerState::Ready,
        EngineState::Ended => PlayerState::Ended,
    }
}
