//! UDP datagram ingestion.
//!
//! [`StreamEndpoint`] validates the `udp://host:port` URI up front, before
//! any resource exists. [`DatagramSource`] owns the socket and a dedicated
//! receive thread that forwards datagram payloads into the ring.
//!
//! Datagram loss is normal UDP behavior and is tolerated silently: no
//! retransmission, no sequencing. This layer guarantees byte delivery into
//! the ring, never packet boundaries — the downstream demuxer already
//! tolerates gaps.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use crate::bandwidth::BandwidthMeter;
use crate::config::IngestConfig;
use crate::error::PlayerError;
use crate::ring::RingBuffer;

/// A validated UDP receive endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamEndpoint {
    addr: SocketAddr,
}

impl StreamEndpoint {
    /// Parse and validate a `udp://host:port` URI.
    ///
    /// Any other scheme, a hostname instead of an IP address, or a missing
    /// port is a configuration error; nothing is allocated on failure.
    pub fn parse(uri: &str) -> Result<Self, PlayerError> {
        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| PlayerError::Configuration(format!("missing scheme in {uri:?}")))?;

        if !scheme.eq_ignore_ascii_case("udp") {
            return Err(PlayerError::Configuration(format!(
                "unsupported scheme {scheme:?}, expected udp://IP_ADDR:PORT"
            )));
        }

        let addr = rest.parse::<SocketAddr>().map_err(|_| {
            PlayerError::Configuration(format!(
                "expected IP_ADDR:PORT after udp://, got {rest:?}"
            ))
        })?;

        Ok(Self { addr })
    }

    /// The receive socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Canonical `udp://host:port` form for logs and status payloads.
    pub fn uri(&self) -> String {
        format!("udp://{}", self.addr)
    }
}

/// Receive-only UDP socket plus the thread pumping it into the ring.
pub struct DatagramSource {
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
    local_addr: SocketAddr,
}

impl DatagramSource {
    /// Bind the endpoint (joining the multicast group when the address is
    /// multicast) and start the receive loop.
    ///
    /// The socket uses a short read timeout sized by
    /// `config.poll_interval` so [`close`](Self::close) is observed
    /// promptly instead of waiting for the next datagram indefinitely.
    pub fn open(
        endpoint: &StreamEndpoint,
        ring: Arc<RingBuffer>,
        meter: Arc<BandwidthMeter>,
        config: &IngestConfig,
    ) -> Result<Self, PlayerError> {
        let bind_err = |source: io::Error| PlayerError::Bind {
            endpoint: endpoint.uri(),
            source,
        };

        let socket = bind_receive_socket(endpoint.addr).map_err(bind_err)?;
        socket
            .set_read_timeout(Some(config.poll_interval))
            .map_err(bind_err)?;
        let local_addr = socket.local_addr().map_err(bind_err)?;

        let stop = Arc::new(AtomicBool::new(false));
        let stop_for_loop = stop.clone();
        let max_datagram_size = config.max_datagram_size.max(1);
        let join = thread::spawn(move || {
            receive_loop(socket, ring, meter, stop_for_loop, max_datagram_size);
        });

        tracing::info!(endpoint = %endpoint.uri(), local = %local_addr, "datagram source open");
        Ok(Self {
            stop,
            join: Some(join),
            local_addr,
        })
    }

    /// Address the socket actually bound (useful when the port was 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop the receive loop and join its thread. Idempotent; returns
    /// within roughly one poll interval.
    pub fn close(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(join) = self.join.take() {
            let _ = join.join();
            tracing::debug!(local = %self.local_addr, "datagram source closed");
        }
    }
}

impl Drop for DatagramSource {
    fn drop(&mut self) {
        self.close();
    }
}

/// Bind a receive socket for `addr`, joining the group for multicast
/// addresses.
fn bind_receive_socket(addr: SocketAddr) -> io::Result<UdpSocket> {
    match addr.ip() {
        IpAddr::V4(group) if group.is_multicast() => {
            let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, addr.port()))?;
            socket.join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)?;
            Ok(socket)
        }
        IpAddr::V6(group) if group.is_multicast() => {
            let socket = UdpSocket::bind((Ipv6Addr::UNSPECIFIED, addr.port()))?;
            socket.join_multicast_v6(&group, 0)?;
            Ok(socket)
        }
        _ => UdpSocket::bind(addr),
    }
}

/// One blocking receive per iteration, payload forwarded to the ring.
///
/// Timeouts just re-check the stop flag; a hard socket error ends the
/// loop (the engine then starves into its buffering state — no retry
/// policy lives here).
fn receive_loop(
    socket: UdpSocket,
    ring: Arc<RingBuffer>,
    meter: Arc<BandwidthMeter>,
    stop: Arc<AtomicBool>,
    max_datagram_size: usize,
) {
    let mut buf = vec![0u8; max_datagram_size];
    while !stop.load(Ordering::Relaxed) {
        match socket.recv_from(&mut buf) {
            Ok((0, _)) => continue,
            Ok((n, _)) => {
                meter.on_transfer(n);
                ring.write(&buf[..n]);
            }
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(e) => {
                tracing::warn!("datagram receive error: {e}");
                break;
            }
        }
    }
    tracing::debug!("datagram receive loop exited");
}
