//! Port allocation and NAT binding tables
//!
//! A forward table assigns each distinct inner flow a stable ephemeral
//! server-side source port; a reverse table maps the expected upstream
//! return quintuple back to the carrier endpoint and the original inner
//! source identity. Both tables live behind one guard so an allocation and
//! its reverse entry are installed atomically and can never diverge.

use crate::protocol::TransportKind;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Mutex;

/// First port of the ephemeral range
pub const EPHEMERAL_BASE: u16 = 49152;

/// Number of ports the allocator cycles through
pub const EPHEMERAL_SPAN: u16 = 16384;

/// Flow key: addresses are kept in canonical binary form so equality is
/// stable across textual spellings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Quintuple {
    pub src_ip: IpAddr,
    pub src_port: u16,
    pub dst_ip: IpAddr,
    pub dst_port: u16,
    pub protocol: TransportKind,
}

/// Index of the listen handle a carrier session arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandleId(pub usize);

/// Reverse NAT entry: where a return packet goes and what identity to
/// restore inside it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncappedPacketSrc {
    /// Carrier endpoint to reply to
    pub carrier_ip: IpAddr,
    pub carrier_port: u16,
    /// Inner source identity before the rewrite
    pub inner_src_ip: IpAddr,
    pub inner_src_port: u16,
    /// Listen handle that admitted the carrier traffic
    pub handle: HandleId,
}

#[derive(Debug, Default)]
struct NatInner {
    /// Forward: inner flow -> allocated server-side source port
    port_dist: HashMap<Quintuple, u16>,
    /// Reverse: expected upstream return quintuple -> carrier origin
    nat: HashMap<Quintuple, EncappedPacketSrc>,
}

/// Both NAT tables plus the port cursor.
///
/// No eviction: entries live until process exit. Past 16384 distinct flows
/// the cursor wraps and reuses ports.
#[derive(Debug, Default)]
pub struct NatTable {
    inner: Mutex<NatInner>,
    cursor: AtomicU16,
}

impl NatTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the port for an inner flow, allocating on first sight.
    ///
    /// On allocation, `install` receives the new port and produces the
    /// reverse key and entry, which are inserted under the same guard.
    pub fn lookup_or_allocate<F>(&self, forward: Quintuple, install: F) -> u16
    where
        F: FnOnce(u16) -> (Quintuple, EncappedPacketSrc),
    {
        let mut inner = self.inner.lock().unwrap();

        if let Some(port) = inner.port_dist.get(&forward) {
            return *port;
        }

        let cursor = self.cursor.fetch_add(1, Ordering::Relaxed);
        let port = EPHEMERAL_BASE + cursor % EPHEMERAL_SPAN;

        let (reverse_key, entry) = install(port);
        inner.port_dist.insert(forward, port);
        inner.nat.insert(reverse_key, entry);

        port
    }

    /// Match a return packet against the reverse table
    pub fn reverse_lookup(&self, key: &Quintuple) -> Option<EncappedPacketSrc> {
        self.inner.lock().unwrap().nat.get(key).copied()
    }

    /// Allocated port for an inner flow, if one exists
    pub fn forward_port(&self, key: &Quintuple) -> Option<u16> {
        self.inner.lock().unwrap().port_dist.get(key).copied()
    }

    /// Number of tracked flows
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().port_dist.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
