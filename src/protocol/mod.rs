//! Wire-format codecs
//!
//! Link, network and transport layers are parsed and rebuilt from scratch.
//! NAT rewrites mutate the owned layer buffers; length fields and checksums
//! are recomputed on serialization.

mod checksum;
pub mod ethernet;
pub mod indicator;
pub mod ipv4;
pub mod ipv6;
pub mod loopback;
pub mod tcp;
pub mod udp;
pub mod types;

pub use indicator::{
    parse_encapped, parse_frame, serialize_frame, serialize_packet, LinkRepr, NetworkRepr,
    PacketIndicator, TransportRepr,
};
pub use types::*;
