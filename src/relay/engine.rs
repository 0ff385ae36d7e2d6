//! Relay pipeline state
//!
//! One `Engine` holds everything the ingress and egress handlers share:
//! the capture handles, the carrier session table, the NAT tables and the
//! global IPv4 identification counter. The handlers themselves live in
//! `ingress` and `egress`.

use super::device::Device;
use super::nat::NatTable;
use super::session::SessionTable;
use crate::capture::Capture;
use crate::protocol::{LinkKind, LinkRepr};
use crate::telemetry::RelayStats;
use crate::{Error, Result};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

pub struct Engine<H: Capture> {
    pub(super) listen_port: u16,
    pub(super) updev: Device,
    pub(super) gateway: Device,
    pub(super) listen_handles: Vec<Arc<H>>,
    pub(super) up_handle: Arc<H>,
    pub(super) sessions: SessionTable,
    pub(super) nat: NatTable,
    /// Identification for every synthesized IPv4 header, shared across
    /// destinations
    pub(super) ipv4_id: AtomicU16,
    pub(super) stats: Arc<RelayStats>,
}

impl<H: Capture> Engine<H> {
    pub fn new(
        listen_port: u16,
        updev: Device,
        gateway: Device,
        listen_handles: Vec<Arc<H>>,
        up_handle: Arc<H>,
        stats: Arc<RelayStats>,
    ) -> Self {
        Self {
            listen_port,
            updev,
            gateway,
            listen_handles,
            up_handle,
            sessions: SessionTable::new(),
            nat: NatTable::new(),
            ipv4_id: AtomicU16::new(0),
            stats,
        }
    }

    pub fn listen_port(&self) -> u16 {
        self.listen_port
    }

    pub fn listen_handle(&self, index: usize) -> Option<Arc<H>> {
        self.listen_handles.get(index).cloned()
    }

    pub fn up_handle(&self) -> Arc<H> {
        self.up_handle.clone()
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    pub fn nat(&self) -> &NatTable {
        &self.nat
    }

    pub fn stats(&self) -> &RelayStats {
        &self.stats
    }

    /// Link layer the upstream device captures and emits
    pub fn updev_link_kind(&self) -> LinkKind {
        self.updev.link_kind()
    }

    /// Allocate the next IPv4 identification value
    pub(super) fn next_ipv4_id(&self) -> u16 {
        self.ipv4_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Count a dropped frame by failure class. I/O errors in a handler can
    /// only come from the frame write; everything else failed before it.
    pub(super) fn record_drop(&self, e: &Error) {
        match e {
            Error::Io(_) => self.stats.write_errors.inc(),
            _ => self.stats.parse_drops.inc(),
        }
    }

    /// Link layer for everything the relay emits: loopback iff the
    /// upstream device is loopback, Ethernet towards the gateway otherwise
    pub(super) fn link_repr(&self) -> Result<LinkRepr> {
        if self.updev.is_loopback {
            return Ok(LinkRepr::Loopback);
        }

        let src = self.updev.hardware_addr.ok_or_else(|| {
            Error::Config(format!("upstream device {} has no MAC", self.updev.name))
        })?;
        let dst = self
            .gateway
            .hardware_addr
            .ok_or_else(|| Error::Config("gateway has no MAC".into()))?;

        Ok(LinkRepr::Ethernet { src, dst })
    }
}
