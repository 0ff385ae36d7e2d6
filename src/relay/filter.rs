//! Reader-side traffic filters
//!
//! The capture backend delivers every frame on the device; these predicates
//! reproduce the two filter expressions the relay needs, applied in the
//! reader loop before a frame can reach a handler.

use crate::protocol::{PacketIndicator, TransportKind};

/// Which traffic a reader admits
#[derive(Debug, Clone, Copy)]
pub enum FrameFilter {
    /// `tcp && dst port {port}` - carrier traffic on a listen device
    Listen { port: u16 },
    /// `(tcp || udp) && not dst port {port}` - return traffic upstream
    Upstream { port: u16 },
}

impl FrameFilter {
    pub fn matches(&self, indicator: &PacketIndicator) -> bool {
        match self {
            FrameFilter::Listen { port } => {
                indicator.transport_kind() == TransportKind::Tcp
                    && indicator.dst_port() == *port
            }
            // Only TCP and UDP parse at all, so the transport check is
            // implicit here
            FrameFilter::Upstream { port } => indicator.dst_port() != *port,
        }
    }
}
