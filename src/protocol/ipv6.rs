//! IPv6 protocol - RFC 8200
//!
//! Fixed-header handling only; packets carrying extension headers are
//! rejected as unsupported before they reach the relay pipeline.

use super::TransportKind;
use crate::{Error, Result};
use std::net::Ipv6Addr;

/// IPv6 fixed header size (always 40 bytes)
pub const HEADER_SIZE: usize = 40;

/// Default hop limit for synthesized packets
pub const DEFAULT_HOP_LIMIT: u8 = 64;

/// Parsed IPv6 header (zero-copy reference)
#[derive(Debug)]
pub struct Ipv6Header<'a> {
    buffer: &'a [u8],
}

impl<'a> Ipv6Header<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < HEADER_SIZE {
            return Err(Error::Parse("IPv6 header too short".into()));
        }

        let version = buffer[0] >> 4;
        if version != 6 {
            return Err(Error::Parse("not an IPv6 packet".into()));
        }

        Ok(Self { buffer })
    }

    /// Payload Length (excludes the 40-byte header)
    pub fn payload_length(&self) -> u16 {
        u16::from_be_bytes([self.buffer[4], self.buffer[5]])
    }

    pub fn next_header(&self) -> u8 {
        self.buffer[6]
    }

    /// Hop Limit (equivalent to IPv4 TTL)
    pub fn hop_limit(&self) -> u8 {
        self.buffer[7]
    }

    pub fn src_addr(&self) -> Ipv6Addr {
        let bytes: [u8; 16] = self.buffer[8..24].try_into().unwrap();
        Ipv6Addr::from(bytes)
    }

    pub fn dst_addr(&self) -> Ipv6Addr {
        let bytes: [u8; 16] = self.buffer[24..40].try_into().unwrap();
        Ipv6Addr::from(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer[..HEADER_SIZE]
    }
}

/// Owned, mutable IPv6 header for NAT rewrites
///
/// No header checksum exists at this layer; only the payload length needs
/// fixing up on serialization.
#[derive(Debug, Clone)]
pub struct Ipv6Packet {
    buffer: Vec<u8>,
}

impl Ipv6Packet {
    /// Copy a parsed header into an owned packet
    pub fn from_header(header: &Ipv6Header<'_>) -> Self {
        Self {
            buffer: header.as_bytes().to_vec(),
        }
    }

    /// Build a fresh header with the default hop limit; next-header is
    /// derived from the payload kind
    pub fn build(src: Ipv6Addr, dst: Ipv6Addr, payload: TransportKind) -> Self {
        let mut buffer = vec![0u8; HEADER_SIZE];

        buffer[0] = 0x60;
        buffer[6] = payload.ip_protocol();
        buffer[7] = DEFAULT_HOP_LIMIT;
        buffer[8..24].copy_from_slice(&src.octets());
        buffer[24..40].copy_from_slice(&dst.octets());

        Self { buffer }
    }

    pub fn src_addr(&self) -> Ipv6Addr {
        let bytes: [u8; 16] = self.buffer[8..24].try_into().unwrap();
        Ipv6Addr::from(bytes)
    }

    pub fn dst_addr(&self) -> Ipv6Addr {
        let bytes: [u8; 16] = self.buffer[24..40].try_into().unwrap();
        Ipv6Addr::from(bytes)
    }

    pub fn set_src_addr(&mut self, addr: Ipv6Addr) {
        self.buffer[8..24].copy_from_slice(&addr.octets());
    }

    pub fn set_dst_addr(&mut self, addr: Ipv6Addr) {
        self.buffer[24..40].copy_from_slice(&addr.octets());
    }

    pub fn next_header(&self) -> u8 {
        self.buffer[6]
    }

    pub fn hop_limit(&self) -> u8 {
        self.buffer[7]
    }

    pub fn set_hop_limit(&mut self, hop_limit: u8) {
        self.buffer[7] = hop_limit;
    }

    pub fn header_len(&self) -> usize {
        HEADER_SIZE
    }

    /// Fix up the payload length field
    pub fn finalize(&mut self, payload_len: usize) {
        self.buffer[4..6].copy_from_slice(&(payload_len as u16).to_be_bytes());
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }
}
