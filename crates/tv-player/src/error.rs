//! Synchronous errors returned by the session control surface.
//!
//! Playback failures travel the other way — classified and delivered
//! asynchronously through [`PlayerCallback::on_error`] — because they
//! originate on the engine/ingestion threads.
//!
//! [`PlayerCallback::on_error`]: crate::engine::PlayerCallback::on_error

use std::io;

use thiserror::Error;
use tv_player_types::PlayerState;

#[derive(Debug, Error)]
pub enum PlayerError {
    /// The UDP socket could not be bound for the configured endpoint.
    #[error("failed to bind {endpoint}: {source}")]
    Bind {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    /// The endpoint URI is not a playable UDP endpoint. Raised before any
    /// resource is allocated.
    #[error("invalid stream endpoint: {0}")]
    Configuration(String),

    /// The operation is not valid in the session's current state.
    #[error("{op} is not allowed in {state:?} state")]
    IllegalState {
        op: &'static str,
        state: PlayerState,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_endpoint_and_state() {
        let err = PlayerError::Bind {
            endpoint: "udp://239.0.0.1:5000".to_string(),
            source: io::Error::new(io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(err.to_string().contains("udp://239.0.0.1:5000"));

        let err = PlayerError::IllegalState {
            op: "start",
            state: PlayerState::Released,
        };
        assert!(err.to_string().contains("start"));
        assert!(err.to_string().contains("Released"));
    }
}
