//! Metrics collection for relay statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counter for thread-safe increments.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, val: u64) {
        self.0.fetch_add(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Counters for everything the pipeline does.
#[derive(Debug, Default)]
pub struct RelayStats {
    /// Carrier handshakes completed (SYN+ACK emitted).
    pub handshakes: Counter,
    /// Decapsulated packets redirected onto the upstream link.
    pub inbound_redirects: Counter,
    /// Bytes of inner packets redirected upstream.
    pub inbound_bytes: Counter,
    /// Return packets re-encapsulated back to a carrier.
    pub outbound_redirects: Counter,
    /// Bytes of inner packets returned to carriers.
    pub outbound_bytes: Counter,
    /// Frames dropped because a layer failed to parse.
    pub parse_drops: Counter,
    /// Return packets with no reverse NAT entry.
    pub nat_misses: Counter,
    /// Packets dropped because the TTL ran out.
    pub ttl_drops: Counter,
    /// Frames that failed to write to a handle.
    pub write_errors: Counter,
}

impl RelayStats {
    pub fn new() -> Self {
        Self::default()
    }
}
