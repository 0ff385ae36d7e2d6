//! Packet capture backend
//!
//! The relay consumes an abstract capture handle: blocking-style reads and
//! writes of whole frames on a named device, opened promiscuous with a
//! fixed snap length. The concrete backend is an AF_PACKET raw socket.

mod af_packet;

pub use af_packet::AfPacketSocket;

use crate::Result;
use std::future::Future;

/// Snap length for all capture handles
pub const SNAPLEN: usize = 1600;

/// Information about a received frame
#[derive(Debug, Clone, Copy)]
pub struct RxInfo {
    /// Number of bytes received
    pub len: usize,
}

/// Capture handle trait
///
/// `recv` and `send` take `&self` so a single handle can serve its reader
/// task and concurrent egress writes.
pub trait Capture: Send + Sync + 'static {
    /// Receive one frame into the provided buffer
    fn recv(&self, buf: &mut [u8]) -> impl Future<Output = Result<RxInfo>> + Send;

    /// Send one frame
    fn send(&self, buf: &[u8]) -> impl Future<Output = Result<usize>> + Send;
}
