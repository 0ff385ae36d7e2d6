//! TCP protocol - RFC 793
//!
//! Parsing and synthesis for the pseudo-TCP carrier as well as NAT
//! rewrites of tunneled TCP flows. The carrier never negotiates options
//! and advertises a fixed window.

use super::checksum::{finish, pseudo_header_sum, sum_be_words};
use crate::{Error, Result};
use std::net::IpAddr;

/// Minimum TCP header size (without options)
pub const MIN_HEADER_SIZE: usize = 20;

/// Window advertised on synthesized carrier segments
pub const CARRIER_WINDOW: u16 = 65535;

/// TCP flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TcpFlags {
    pub fin: bool,
    pub syn: bool,
    pub rst: bool,
    pub psh: bool,
    pub ack: bool,
    pub urg: bool,
}

impl TcpFlags {
    /// Parse flags from the 14th byte of the TCP header
    pub fn from_byte(byte: u8) -> Self {
        Self {
            fin: (byte & 0x01) != 0,
            syn: (byte & 0x02) != 0,
            rst: (byte & 0x04) != 0,
            psh: (byte & 0x08) != 0,
            ack: (byte & 0x10) != 0,
            urg: (byte & 0x20) != 0,
        }
    }

    pub fn to_byte(&self) -> u8 {
        let mut byte = 0u8;
        if self.fin {
            byte |= 0x01;
        }
        if self.syn {
            byte |= 0x02;
        }
        if self.rst {
            byte |= 0x04;
        }
        if self.psh {
            byte |= 0x08;
        }
        if self.ack {
            byte |= 0x10;
        }
        if self.urg {
            byte |= 0x20;
        }
        byte
    }

    pub fn is_syn_ack(&self) -> bool {
        self.syn && self.ack
    }
}

/// Owned TCP segment (header plus payload) for mutation and synthesis
#[derive(Debug, Clone)]
pub struct TcpSegment {
    buffer: Vec<u8>,
    header_len: usize,
}

impl TcpSegment {
    /// Copy a raw segment; options are carried through untouched
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < MIN_HEADER_SIZE {
            return Err(Error::Parse("TCP segment too short".into()));
        }

        let data_offset = (data[12] >> 4) as usize;
        let header_len = data_offset * 4;

        if header_len < MIN_HEADER_SIZE {
            return Err(Error::Parse("TCP data offset too small".into()));
        }

        if data.len() < header_len {
            return Err(Error::Parse("TCP header truncated".into()));
        }

        Ok(Self {
            buffer: data.to_vec(),
            header_len,
        })
    }

    /// Build an option-less header with the given flags and no payload
    pub fn build(src_port: u16, dst_port: u16, seq: u32, ack: u32, flags: TcpFlags) -> Self {
        let mut buffer = vec![0u8; MIN_HEADER_SIZE];

        buffer[0..2].copy_from_slice(&src_port.to_be_bytes());
        buffer[2..4].copy_from_slice(&dst_port.to_be_bytes());
        buffer[4..8].copy_from_slice(&seq.to_be_bytes());
        buffer[8..12].copy_from_slice(&ack.to_be_bytes());
        buffer[12] = 0x50; // data offset 5
        buffer[13] = flags.to_byte();
        buffer[14..16].copy_from_slice(&CARRIER_WINDOW.to_be_bytes());

        Self {
            buffer,
            header_len: MIN_HEADER_SIZE,
        }
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

    pub fn seq(&self) -> u32 {
        u32::from_be_bytes([
            self.buffer[4],
            self.buffer[5],
            self.buffer[6],
            self.buffer[7],
        ])
    }

    pub fn ack_num(&self) -> u32 {
        u32::from_be_bytes([
            self.buffer[8],
            self.buffer[9],
            self.buffer[10],
            self.buffer[11],
        ])
    }

    pub fn flags(&self) -> TcpFlags {
        TcpFlags::from_byte(self.buffer[13])
    }

    pub fn window(&self) -> u16 {
        u16::from_be_bytes([self.buffer[14], self.buffer[15]])
    }

    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes([self.buffer[16], self.buffer[17]])
    }

    pub fn header_len(&self) -> usize {
        self.header_len
    }

    pub fn payload(&self) -> &[u8] {
        &self.buffer[self.header_len..]
    }

    /// Replace the payload, keeping the header
    pub fn set_payload(&mut self, payload: &[u8]) {
        self.buffer.truncate(self.header_len);
        self.buffer.extend_from_slice(payload);
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Recompute the checksum against the final pseudo-header addresses
    pub fn update_checksum(&mut self, src: IpAddr, dst: IpAddr) {
        self.buffer[16] = 0;
        self.buffer[17] = 0;

        let sum = tcp_checksum(src, dst, &self.buffer);
        self.buffer[16..18].copy_from_slice(&sum.to_be_bytes());
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }
}

/// Carrier SYN+ACK: the handshake reply
pub fn build_syn_ack(src_port: u16, dst_port: u16, seq: u32, ack: u32) -> TcpSegment {
    TcpSegment::build(
        src_port,
        dst_port,
        seq,
        ack,
        TcpFlags {
            syn: true,
            ack: true,
            ..Default::default()
        },
    )
}

/// Carrier data segment: plain ACK, payload attached by the caller
pub fn build_data_ack(src_port: u16, dst_port: u16, seq: u32, ack: u32) -> TcpSegment {
    TcpSegment::build(
        src_port,
        dst_port,
        seq,
        ack,
        TcpFlags {
            ack: true,
            ..Default::default()
        },
    )
}

/// TCP checksum over a segment with its checksum field zeroed
pub fn tcp_checksum(src: IpAddr, dst: IpAddr, segment: &[u8]) -> u16 {
    let pseudo = pseudo_header_sum(src, dst, 6, segment.len());
    finish(pseudo.wrapping_add(sum_be_words(segment)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn v4(a: u8, b: u8, c: u8, d: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(a, b, c, d))
    }

    #[test]
    fn test_flags_roundtrip() {
        let flags = TcpFlags::from_byte(0x12);
        assert!(flags.syn);
        assert!(flags.ack);
        assert!(flags.is_syn_ack());
        assert_eq!(flags.to_byte(), 0x12);

        let syn_only = TcpFlags::from_byte(0x02);
        assert!(syn_only.syn);
        assert!(!syn_only.is_syn_ack());
    }

    #[test]
    fn test_build_syn_ack_fields() {
        let seg = build_syn_ack(8080, 40000, 0, 43);
        assert_eq!(seg.src_port(), 8080);
        assert_eq!(seg.dst_port(), 40000);
        assert_eq!(seg.seq(), 0);
        assert_eq!(seg.ack_num(), 43);
        assert!(seg.flags().syn);
        assert!(seg.flags().ack);
        assert_eq!(seg.window(), CARRIER_WINDOW);
        assert_eq!(seg.header_len(), MIN_HEADER_SIZE);
        assert!(seg.payload().is_empty());
    }

    #[test]
    fn test_build_data_ack_has_no_syn() {
        let seg = build_data_ack(8080, 40000, 100, 200);
        assert!(!seg.flags().syn);
        assert!(seg.flags().ack);
    }

    #[test]
    fn test_parse_rejects_short_segment() {
        assert!(TcpSegment::parse(&[0u8; 19]).is_err());
    }

    #[test]
    fn test_parse_rejects_bad_offset() {
        let mut bytes = build_data_ack(1, 2, 0, 0).as_bytes().to_vec();
        bytes[12] = 0x10; // offset 1 word
        assert!(TcpSegment::parse(&bytes).is_err());
    }

    #[test]
    fn test_set_payload_and_ports() {
        let mut seg = build_data_ack(8080, 40000, 0, 0);
        seg.set_payload(b"hello");
        assert_eq!(seg.payload(), b"hello");
        assert_eq!(seg.len(), MIN_HEADER_SIZE + 5);

        seg.set_src_port(9090);
        assert_eq!(seg.src_port(), 9090);
        assert_eq!(seg.payload(), b"hello");
    }

    #[test]
    fn test_checksum_verifies_after_update() {
        let mut seg = build_data_ack(12345, 80, 1, 0);
        seg.set_payload(b"GET / HTTP/1.1\r\n");
        seg.update_checksum(v4(192, 168, 1, 100), v4(93, 184, 216, 34));

        // Summing the full segment with the pseudo-header yields zero
        let pseudo = pseudo_header_sum(
            v4(192, 168, 1, 100),
            v4(93, 184, 216, 34),
            6,
            seg.len(),
        );
        assert_eq!(finish(pseudo.wrapping_add(sum_be_words(seg.as_bytes()))), 0);
    }

    #[test]
    fn test_options_survive_parse() {
        // 24-byte header (offset 6) with an MSS option
        let mut bytes = build_data_ack(1, 2, 0, 0).as_bytes().to_vec();
        bytes[12] = 0x60;
        bytes.extend_from_slice(&[0x02, 0x04, 0x05, 0xb4]);

        let seg = TcpSegment::parse(&bytes).unwrap();
        assert_eq!(seg.header_len(), 24);
        assert_eq!(seg.as_bytes(), &bytes[..]);
    }
}
