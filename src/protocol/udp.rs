//! UDP protocol - RFC 768

use super::checksum::{finish, pseudo_header_sum, sum_be_words};
use crate::{Error, Result};
use std::net::IpAddr;

/// UDP header size (fixed)
pub const HEADER_SIZE: usize = 8;

/// Owned UDP datagram (header plus payload) for NAT rewrites
#[derive(Debug, Clone)]
pub struct UdpDatagram {
    buffer: Vec<u8>,
}

impl UdpDatagram {
    /// Copy a raw datagram, trimming any bytes past the length field
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(Error::Parse("UDP datagram too short".into()));
        }

        let length = u16::from_be_bytes([data[4], data[5]]) as usize;
        if length < HEADER_SIZE {
            return Err(Error::Parse("UDP length field too small".into()));
        }
        if length > data.len() {
            return Err(Error::Parse("UDP datagram truncated".into()));
        }

        Ok(Self {
            buffer: data[..length].to_vec(),
        })
    }

    pub fn src_port(&self) -> u16 {
        u16::from_be_bytes([self.buffer[0], self.buffer[1]])
    }

    pub fn dst_port(&self) -> u16 {
        u16::from_be_bytes([self.buffer[2], self.buffer[3]])
    }

    pub fn set_src_port(&mut self, port: u16) {
        self.buffer[0..2].copy_from_slice(&port.to_be_bytes());
    }

    pub fn set_dst_port(&mut self, port: u16) {
        self.buffer[2..4].copy_from_slice(&port.to_be_bytes());
    }

    pub fn length(&self) -> u16 {
        u16::from_be_bytes([self.buffer[4], self.buffer[5]])
    }

    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes([self.buffer[6], self.buffer[7]])
    }

    pub fn payload(&self) -> &[u8] {
        &self.buffer[HEADER_SIZE..]
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Recompute the checksum against the final pseudo-header addresses.
    ///
    /// A zero checksum on an IPv4 datagram means "not computed" and is kept
    /// as such; IPv6 requires a checksum, so one is always produced there.
    pub fn update_checksum(&mut self, src: IpAddr, dst: IpAddr) {
        if self.checksum() == 0 && src.is_ipv4() {
            return;
        }

        self.buffer[6] = 0;
        self.buffer[7] = 0;

        let sum = udp_checksum(src, dst, &self.buffer);
        let sum = if sum == 0 { 0xFFFF } else { sum };
        self.buffer[6..8].copy_from_slice(&sum.to_be_bytes());
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }
}

/// UDP checksum over a datagram with its checksum field zeroed
pub fn udp_checksum(src: IpAddr, dst: IpAddr, datagram: &[u8]) -> u16 {
    let pseudo = pseudo_header_sum(src, dst, 17, datagram.len());
    finish(pseudo.wrapping_add(sum_be_words(datagram)))
}
