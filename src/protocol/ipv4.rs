//! IPv4 protocol - RFC 791

use super::checksum::{finish, sum_be_words};
use super::TransportKind;
use crate::{Error, Result};
use std::net::Ipv4Addr;

/// Minimum IPv4 header size (without options)
pub const MIN_HEADER_SIZE: usize = 20;

/// Parsed IPv4 header (zero-copy reference)
#[derive(Debug)]
pub struct Ipv4Header<'a> {
    buffer: &'a [u8],
    header_len: usize,
}

impl<'a> Ipv4Header<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < MIN_HEADER_SIZE {
            return Err(Error::Parse("IPv4 header too short".into()));
        }

        let version = buffer[0] >> 4;
        if version != 4 {
            return Err(Error::Parse("not an IPv4 packet".into()));
        }

        let ihl = (buffer[0] & 0x0F) as usize;
        let header_len = ihl * 4;

        if header_len < MIN_HEADER_SIZE {
            return Err(Error::Parse("IPv4 IHL too small".into()));
        }

        if buffer.len() < header_len {
            return Err(Error::Parse("IPv4 header truncated".into()));
        }

        Ok(Self { buffer, header_len })
    }

    pub fn total_length(&self) -> u16 {
        u16::from_be_bytes([self.buffer[2], self.buffer[3]])
    }

    pub fn identification(&self) -> u16 {
        u16::from_be_bytes([self.buffer[4], self.buffer[5]])
    }

    pub fn ttl(&self) -> u8 {
        self.buffer[8]
    }

    pub fn protocol(&self) -> u8 {
        self.buffer[9]
    }

    pub fn src_addr(&self) -> Ipv4Addr {
        Ipv4Addr::new(
            self.buffer[12],
            self.buffer[13],
            self.buffer[14],
            self.buffer[15],
        )
    }

    pub fn dst_addr(&self) -> Ipv4Addr {
        Ipv4Addr::new(
            self.buffer[16],
            self.buffer[17],
            self.buffer[18],
            self.buffer[19],
        )
    }

    pub fn header_len(&self) -> usize {
        self.header_len
    }

    /// Header bytes only (options included)
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer[..self.header_len]
    }
}

/// Owned, mutable IPv4 header for NAT rewrites
///
/// Holds the header bytes only; the transport layer travels separately and
/// the total length and checksum are fixed up on serialization.
#[derive(Debug, Clone)]
pub struct Ipv4Packet {
    buffer: Vec<u8>,
}

impl Ipv4Packet {
    /// Copy a parsed header into an owned packet
    pub fn from_header(header: &Ipv4Header<'_>) -> Self {
        Self {
            buffer: header.as_bytes().to_vec(),
        }
    }

    /// Build a fresh option-less header; don't-fragment is left clear and
    /// length/checksum are filled in by `finalize`
    pub fn build(src: Ipv4Addr, dst: Ipv4Addr, id: u16, ttl: u8, payload: TransportKind) -> Self {
        let mut buffer = vec![0u8; MIN_HEADER_SIZE];

        buffer[0] = 0x45; // version 4, IHL 5
        buffer[4..6].copy_from_slice(&id.to_be_bytes());
        buffer[8] = ttl;
        buffer[9] = payload.ip_protocol();
        buffer[12..16].copy_from_slice(&src.octets());
        buffer[16..20].copy_from_slice(&dst.octets());

        Self { buffer }
    }

    pub fn src_addr(&self) -> Ipv4Addr {
        Ipv4Addr::new(
            self.buffer[12],
            self.buffer[13],
            self.buffer[14],
            self.buffer[15],
        )
    }

    pub fn dst_addr(&self) -> Ipv4Addr {
        Ipv4Addr::new(
            self.buffer[16],
            self.buffer[17],
            self.buffer[18],
            self.buffer[19],
        )
    }

    pub fn set_src_addr(&mut self, addr: Ipv4Addr) {
        self.buffer[12..16].copy_from_slice(&addr.octets());
    }

    pub fn set_dst_addr(&mut self, addr: Ipv4Addr) {
        self.buffer[16..20].copy_from_slice(&addr.octets());
    }

    pub fn identification(&self) -> u16 {
        u16::from_be_bytes([self.buffer[4], self.buffer[5]])
    }

    pub fn ttl(&self) -> u8 {
        self.buffer[8]
    }

    pub fn set_ttl(&mut self, ttl: u8) {
        self.buffer[8] = ttl;
    }

    pub fn protocol(&self) -> u8 {
        self.buffer[9]
    }

    pub fn header_len(&self) -> usize {
        self.buffer.len()
    }

    /// Fix up total length and header checksum for the given payload size
    pub fn finalize(&mut self, payload_len: usize) {
        let total = (self.buffer.len() + payload_len) as u16;
        self.buffer[2..4].copy_from_slice(&total.to_be_bytes());

        self.buffer[10] = 0;
        self.buffer[11] = 0;
        let sum = header_checksum(&self.buffer);
        self.buffer[10..12].copy_from_slice(&sum.to_be_bytes());
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }
}

/// IPv4 header checksum over a header whose checksum field is zeroed
pub fn header_checksum(header: &[u8]) -> u16 {
    finish(sum_be_words(header))
}
