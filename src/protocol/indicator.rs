//! Packet indicator - the uniform parsed view of a captured frame
//!
//! `parse_frame` decodes a full frame from the link layer down;
//! `parse_encapped` decodes the carrier payload starting at the network
//! layer. Both yield a [`PacketIndicator`] whose network and transport
//! layers are owned buffers that NAT can mutate before re-serialization.

use super::ethernet::{self, Frame};
use super::ipv4::{Ipv4Header, Ipv4Packet};
use super::ipv6::{Ipv6Header, Ipv6Packet};
use super::tcp::{TcpFlags, TcpSegment};
use super::udp::UdpDatagram;
use super::{loopback, LinkKind, MacAddr, NetworkKind, TransportKind};
use crate::{Error, Result};
use std::net::{IpAddr, SocketAddr};

/// Link layer of a frame being synthesized
#[derive(Debug, Clone, Copy)]
pub enum LinkRepr {
    Ethernet { src: MacAddr, dst: MacAddr },
    Loopback,
}

impl LinkRepr {
    fn write(&self, out: &mut Vec<u8>, kind: NetworkKind) {
        match self {
            LinkRepr::Ethernet { src, dst } => ethernet::write_header(out, *src, *dst, kind),
            LinkRepr::Loopback => loopback::write_header(out, kind),
        }
    }

    fn header_len(&self) -> usize {
        match self {
            LinkRepr::Ethernet { .. } => ethernet::HEADER_SIZE,
            LinkRepr::Loopback => loopback::HEADER_SIZE,
        }
    }
}

/// Owned network layer of a parsed or synthesized packet
#[derive(Debug, Clone)]
pub enum NetworkRepr {
    V4(Ipv4Packet),
    V6(Ipv6Packet),
}

impl NetworkRepr {
    pub fn kind(&self) -> NetworkKind {
        match self {
            NetworkRepr::V4(_) => NetworkKind::Ipv4,
            NetworkRepr::V6(_) => NetworkKind::Ipv6,
        }
    }

    pub fn src_addr(&self) -> IpAddr {
        match self {
            NetworkRepr::V4(ip) => IpAddr::V4(ip.src_addr()),
            NetworkRepr::V6(ip) => IpAddr::V6(ip.src_addr()),
        }
    }

    pub fn dst_addr(&self) -> IpAddr {
        match self {
            NetworkRepr::V4(ip) => IpAddr::V4(ip.dst_addr()),
            NetworkRepr::V6(ip) => IpAddr::V6(ip.dst_addr()),
        }
    }

    /// Rewrite the source address in place; the family must match
    pub fn set_src_addr(&mut self, addr: IpAddr) -> Result<()> {
        match (self, addr) {
            (NetworkRepr::V4(ip), IpAddr::V4(a)) => {
                ip.set_src_addr(a);
                Ok(())
            }
            (NetworkRepr::V6(ip), IpAddr::V6(a)) => {
                ip.set_src_addr(a);
                Ok(())
            }
            (NetworkRepr::V4(_), _) => Err(Error::IpVersionTransition { family: "IPv4" }),
            (NetworkRepr::V6(_), _) => Err(Error::IpVersionTransition { family: "IPv6" }),
        }
    }

    /// TTL for IPv4, hop limit for IPv6
    pub fn ttl(&self) -> u8 {
        match self {
            NetworkRepr::V4(ip) => ip.ttl(),
            NetworkRepr::V6(ip) => ip.hop_limit(),
        }
    }

    pub fn ipv4_id(&self) -> Option<u16> {
        match self {
            NetworkRepr::V4(ip) => Some(ip.identification()),
            NetworkRepr::V6(_) => None,
        }
    }

    pub fn header_len(&self) -> usize {
        match self {
            NetworkRepr::V4(ip) => ip.header_len(),
            NetworkRepr::V6(ip) => ip.header_len(),
        }
    }

    fn finalize(&mut self, payload_len: usize) {
        match self {
            NetworkRepr::V4(ip) => ip.finalize(payload_len),
            NetworkRepr::V6(ip) => ip.finalize(payload_len),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            NetworkRepr::V4(ip) => ip.as_bytes(),
            NetworkRepr::V6(ip) => ip.as_bytes(),
        }
    }
}

/// Owned transport layer of a parsed or synthesized packet
#[derive(Debug, Clone)]
pub enum TransportRepr {
    Tcp(TcpSegment),
    Udp(UdpDatagram),
}

impl TransportRepr {
    pub fn kind(&self) -> TransportKind {
        match self {
            TransportRepr::Tcp(_) => TransportKind::Tcp,
            TransportRepr::Udp(_) => TransportKind::Udp,
        }
    }

    pub fn src_port(&self) -> u16 {
        match self {
            TransportRepr::Tcp(t) => t.src_port(),
            TransportRepr::Udp(u) => u.src_port(),
        }
    }

    pub fn dst_port(&self) -> u16 {
        match self {
            TransportRepr::Tcp(t) => t.dst_port(),
            TransportRepr::Udp(u) => u.dst_port(),
        }
    }

    pub fn set_src_port(&mut self, port: u16) {
        match self {
            TransportRepr::Tcp(t) => t.set_src_port(port),
            TransportRepr::Udp(u) => u.set_src_port(port),
        }
    }

    /// Application bytes carried after the transport header
    pub fn payload(&self) -> &[u8] {
        match self {
            TransportRepr::Tcp(t) => t.payload(),
            TransportRepr::Udp(u) => u.payload(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TransportRepr::Tcp(t) => t.len(),
            TransportRepr::Udp(u) => u.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn update_checksum(&mut self, src: IpAddr, dst: IpAddr) {
        match self {
            TransportRepr::Tcp(t) => t.update_checksum(src, dst),
            TransportRepr::Udp(u) => u.update_checksum(src, dst),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            TransportRepr::Tcp(t) => t.as_bytes(),
            TransportRepr::Udp(u) => u.as_bytes(),
        }
    }
}

/// Parsed view of a captured frame or of an encapsulated packet
#[derive(Debug, Clone)]
pub struct PacketIndicator {
    link: Option<LinkKind>,
    network: NetworkRepr,
    transport: TransportRepr,
}

impl PacketIndicator {
    pub fn link_kind(&self) -> Option<LinkKind> {
        self.link
    }

    pub fn network_kind(&self) -> NetworkKind {
        self.network.kind()
    }

    pub fn transport_kind(&self) -> TransportKind {
        self.transport.kind()
    }

    pub fn network(&self) -> &NetworkRepr {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut NetworkRepr {
        &mut self.network
    }

    pub fn transport(&self) -> &TransportRepr {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut TransportRepr {
        &mut self.transport
    }

    pub fn src_ip(&self) -> IpAddr {
        self.network.src_addr()
    }

    pub fn dst_ip(&self) -> IpAddr {
        self.network.dst_addr()
    }

    pub fn src_port(&self) -> u16 {
        self.transport.src_port()
    }

    pub fn dst_port(&self) -> u16 {
        self.transport.dst_port()
    }

    /// Source endpoint, the carrier session key on the listen side
    pub fn src_addr(&self) -> SocketAddr {
        SocketAddr::new(self.src_ip(), self.src_port())
    }

    pub fn dst_addr(&self) -> SocketAddr {
        SocketAddr::new(self.dst_ip(), self.dst_port())
    }

    pub fn ttl(&self) -> u8 {
        self.network.ttl()
    }

    pub fn ipv4_id(&self) -> Option<u16> {
        self.network.ipv4_id()
    }

    /// TCP sequence number; zero for UDP
    pub fn seq(&self) -> u32 {
        match &self.transport {
            TransportRepr::Tcp(t) => t.seq(),
            TransportRepr::Udp(_) => 0,
        }
    }

    pub fn tcp_flags(&self) -> Option<TcpFlags> {
        match &self.transport {
            TransportRepr::Tcp(t) => Some(t.flags()),
            TransportRepr::Udp(_) => None,
        }
    }

    pub fn is_syn(&self) -> bool {
        self.tcp_flags().map(|f| f.syn).unwrap_or(false)
    }

    /// Application bytes carried by the transport layer
    pub fn payload(&self) -> &[u8] {
        self.transport.payload()
    }

    /// Split into the owned layers for re-serialization
    pub fn into_parts(self) -> (Option<LinkKind>, NetworkRepr, TransportRepr) {
        (self.link, self.network, self.transport)
    }
}

/// Decode a full frame starting at the link layer
pub fn parse_frame(bytes: &[u8], link: LinkKind) -> Result<PacketIndicator> {
    let (kind, network_bytes) = match link {
        LinkKind::Ethernet => {
            let frame = Frame::parse(bytes)?;
            let kind = frame.network_kind()?;
            (kind, &bytes[ethernet::HEADER_SIZE..])
        }
        LinkKind::Loopback => {
            let header = loopback::Header::parse(bytes)?;
            (header.network_kind()?, &bytes[loopback::HEADER_SIZE..])
        }
    };

    let (network, transport) = parse_network(kind, network_bytes)?;

    Ok(PacketIndicator {
        link: Some(link),
        network,
        transport,
    })
}

/// Decode an encapsulated packet starting at the network layer
pub fn parse_encapped(bytes: &[u8]) -> Result<PacketIndicator> {
    if bytes.is_empty() {
        return Err(Error::Parse("empty encapsulated packet".into()));
    }

    let kind = match bytes[0] >> 4 {
        4 => NetworkKind::Ipv4,
        6 => NetworkKind::Ipv6,
        v => return Err(Error::Unsupported(format!("IP version {}", v))),
    };

    let (network, transport) = parse_network(kind, bytes)?;

    Ok(PacketIndicator {
        link: None,
        network,
        transport,
    })
}

fn parse_network(kind: NetworkKind, bytes: &[u8]) -> Result<(NetworkRepr, TransportRepr)> {
    match kind {
        NetworkKind::Ipv4 => {
            let header = Ipv4Header::parse(bytes)?;
            let total = header.total_length() as usize;

            if total < header.header_len() {
                return Err(Error::Parse("IPv4 total length below header".into()));
            }
            if total > bytes.len() {
                return Err(Error::Parse("IPv4 packet truncated".into()));
            }

            // Anything past total_length is link-layer padding
            let transport = parse_transport(
                TransportKind::from_ip_protocol(header.protocol())
                    .ok_or_else(|| Error::Unsupported(format!("IP protocol {}", header.protocol())))?,
                &bytes[header.header_len()..total],
            )?;

            Ok((NetworkRepr::V4(Ipv4Packet::from_header(&header)), transport))
        }
        NetworkKind::Ipv6 => {
            let header = Ipv6Header::parse(bytes)?;
            let payload_len = header.payload_length() as usize;
            let end = super::ipv6::HEADER_SIZE + payload_len;

            if end > bytes.len() {
                return Err(Error::Parse("IPv6 packet truncated".into()));
            }

            let transport = parse_transport(
                TransportKind::from_ip_protocol(header.next_header()).ok_or_else(|| {
                    Error::Unsupported(format!("IPv6 next header {}", header.next_header()))
                })?,
                &bytes[super::ipv6::HEADER_SIZE..end],
            )?;

            Ok((NetworkRepr::V6(Ipv6Packet::from_header(&header)), transport))
        }
    }
}

fn parse_transport(kind: TransportKind, bytes: &[u8]) -> Result<TransportRepr> {
    match kind {
        TransportKind::Tcp => Ok(TransportRepr::Tcp(TcpSegment::parse(bytes)?)),
        TransportKind::Udp => Ok(TransportRepr::Udp(UdpDatagram::parse(bytes)?)),
    }
}

/// Serialize network + transport into a contiguous IP packet.
///
/// Length fields and checksums are recomputed here, after any NAT
/// mutation; the transport checksum is taken against the final
/// network-layer pseudo-header.
pub fn serialize_packet(network: &mut NetworkRepr, transport: &mut TransportRepr) -> Vec<u8> {
    network.finalize(transport.len());
    transport.update_checksum(network.src_addr(), network.dst_addr());

    let mut out = Vec::with_capacity(network.header_len() + transport.len());
    out.extend_from_slice(network.as_bytes());
    out.extend_from_slice(transport.as_bytes());
    out
}

/// Serialize a complete frame: link + network + transport (+ payload)
pub fn serialize_frame(
    link: &LinkRepr,
    network: &mut NetworkRepr,
    transport: &mut TransportRepr,
) -> Vec<u8> {
    let kind = network.kind();
    let mut out = Vec::with_capacity(link.header_len() + network.header_len() + transport.len());
    link.write(&mut out, kind);
    out.extend_from_slice(&serialize_packet(network, transport));
    out
}
