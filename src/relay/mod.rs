//! The relay pipeline
//!
//! Ingress decapsulates carrier traffic from clients and source-NATs it
//! upstream; egress matches return traffic in the reverse NAT table and
//! re-encapsulates it towards the carrier it belongs to.

mod device;
mod egress;
mod engine;
mod filter;
mod ingress;
mod nat;
mod server;
mod session;

pub use device::Device;
pub use engine::Engine;
pub use filter::FrameFilter;
pub use nat::{
    EncappedPacketSrc, HandleId, NatTable, Quintuple, EPHEMERAL_BASE, EPHEMERAL_SPAN,
};
pub use server::Server;
pub use session::{Session, SessionState, SessionTable};
