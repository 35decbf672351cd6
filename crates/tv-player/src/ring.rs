//! Fixed-capacity byte ring between the datagram receiver and the engine.
//!
//! The receive thread writes datagram payloads in, the playback engine's
//! demux loop reads a continuous byte stream out. The ring absorbs the rate
//! mismatch between the two without growing.
//!
//! ## Design
//! - **Single producer / single consumer**, each on its own thread.
//! - **Overwrite-oldest**: a write that does not fit advances the read
//!   cursor over the oldest unread bytes and never blocks the producer.
//!   Losing old data beats stalling a live, non-seekable stream; the
//!   downstream demuxer already tolerates UDP gaps.
//! - Both ends are non-blocking; the consumer polls.
//! - One [`Mutex`] guards the buffer/read-cursor/occupied triple, so the
//!   two threads never observe a torn update.

use std::sync::Mutex;

use crate::config::IngestConfig;

/// Fixed-capacity circular byte buffer with overwrite-oldest semantics.
pub struct RingBuffer {
    inner: Mutex<RingInner>,
    capacity: usize,
}

struct RingInner {
    buf: Box<[u8]>,
    /// Index of the oldest unread byte.
    read_pos: usize,
    /// Unread bytes currently held. Invariant: `occupied <= capacity`.
    occupied: usize,
}

impl RingBuffer {
    /// Create a ring with a fixed capacity in bytes. No dynamic growth.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(RingInner {
                buf: vec![0u8; capacity].into_boxed_slice(),
                read_pos: 0,
                occupied: 0,
            }),
            capacity,
        }
    }

    /// Create a ring sized from an [`IngestConfig`].
    pub fn with_config(config: &IngestConfig) -> Self {
        Self::new(config.capacity_bytes())
    }

    /// Copy `bytes` into the ring, discarding the oldest unread bytes if
    /// there is not enough free space. Never blocks.
    ///
    /// A single write larger than the whole ring keeps only the trailing
    /// `capacity` bytes (the rest is already stale by definition).
    pub fn write(&self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let src = if bytes.len() > self.capacity {
            &bytes[bytes.len() - self.capacity..]
        } else {
            bytes
        };

        let mut g = self.inner.lock().unwrap();
        let free = self.capacity - g.occupied;
        if src.len() > free {
            let drop = src.len() - free;
            g.read_pos = (g.read_pos + drop) % self.capacity;
            g.occupied -= drop;
        }

        let mut write_pos = (g.read_pos + g.occupied) % self.capacity;
        let mut remaining = src;
        while !remaining.is_empty() {
            let run = remaining.len().min(self.capacity - write_pos);
            g.buf[write_pos..write_pos + run].copy_from_slice(&remaining[..run]);
            write_pos = (write_pos + run) % self.capacity;
            remaining = &remaining[run..];
        }
        g.occupied += src.len();
    }

    /// Copy up to `out.len()` bytes from the read cursor into `out` and
    /// return how many were copied. Returns 0 when the ring is empty
    /// (non-blocking; the caller polls).
    ///
    /// A single call never crosses the physical wrap point: when unread
    /// bytes wrap, this returns exactly the run up to the end of the
    /// buffer and the next call picks up the remainder. That keeps every
    /// read a single contiguous copy.
    pub fn read_into(&self, out: &mut [u8]) -> usize {
        if out.is_empty() {
            return 0;
        }
        let mut g = self.inner.lock().unwrap();
        if g.occupied == 0 {
            return 0;
        }

        let contiguous = (self.capacity - g.read_pos).min(g.occupied);
        let n = contiguous.min(out.len());
        out[..n].copy_from_slice(&g.buf[g.read_pos..g.read_pos + n]);
        g.read_pos = (g.read_pos + n) % self.capacity;
        g.occupied -= n;
        n
    }

    /// Bytes currently unread (best-effort snapshot).
    pub fn occupied(&self) -> usize {
        self.inner.lock().unwrap().occupied
    }

    /// Fixed capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// `true` when no unread bytes are buffered.
    pub fn is_empty(&self) -> bool {
        self.occupied() == 0
    }

    /// Reset both cursors, discarding all unread bytes.
    pub fn clear(&self) {
        let mut g = self.inner.lock().unwrap();
        g.read_pos = 0;
        g.occupied = 0;
    }
}
