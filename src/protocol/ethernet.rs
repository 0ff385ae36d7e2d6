//! Ethernet frame parsing and construction

use super::{EtherType, MacAddr, NetworkKind};
use crate::{Error, Result};

/// Minimum Ethernet frame size (without FCS)
pub const MIN_FRAME_SIZE: usize = 14;

/// Header size without VLAN tags (the relay never emits tagged frames)
pub const HEADER_SIZE: usize = 14;

/// Parsed Ethernet frame (zero-copy reference)
#[derive(Debug)]
pub struct Frame<'a> {
    buffer: &'a [u8],
}

impl<'a> Frame<'a> {
    /// Parse an Ethernet frame from a buffer
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < MIN_FRAME_SIZE {
            return Err(Error::Parse("Ethernet frame too short".into()));
        }

        Ok(Self { buffer })
    }

    pub fn dst_mac(&self) -> MacAddr {
        MacAddr(self.buffer[0..6].try_into().unwrap())
    }

    pub fn src_mac(&self) -> MacAddr {
        MacAddr(self.buffer[6..12].try_into().unwrap())
    }

    pub fn ethertype(&self) -> u16 {
        u16::from_be_bytes([self.buffer[12], self.buffer[13]])
    }

    /// Network layer kind, or an error for non-IP ethertypes
    pub fn network_kind(&self) -> Result<NetworkKind> {
        match EtherType::from_u16(self.ethertype()) {
            Some(EtherType::Ipv4) => Ok(NetworkKind::Ipv4),
            Some(EtherType::Ipv6) => Ok(NetworkKind::Ipv6),
            None => Err(Error::Unsupported(format!(
                "ethertype 0x{:04x}",
                self.ethertype()
            ))),
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.buffer[HEADER_SIZE..]
    }
}

/// Append an Ethernet header; EtherType is derived from the network kind
pub fn write_header(out: &mut Vec<u8>, src: MacAddr, dst: MacAddr, kind: NetworkKind) {
    let ethertype = match kind {
        NetworkKind::Ipv4 => EtherType::Ipv4 as u16,
        NetworkKind::Ipv6 => EtherType::Ipv6 as u16,
    };

    out.extend_from_slice(&dst.0);
    out.extend_from_slice(&src.0);
    out.extend_from_slice(&ethertype.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_parse() {
        let src = MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
        let dst = MacAddr([0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb]);

        let mut buf = Vec::new();
        write_header(&mut buf, src, dst, NetworkKind::Ipv4);
        buf.extend_from_slice(&[0u8; 20]);

        let frame = Frame::parse(&buf).unwrap();
        assert_eq!(frame.src_mac(), src);
        assert_eq!(frame.dst_mac(), dst);
        assert_eq!(frame.ethertype(), 0x0800);
        assert_eq!(frame.network_kind().unwrap(), NetworkKind::Ipv4);
        assert_eq!(frame.payload().len(), 20);
    }

    #[test]
    fn test_parse_too_short() {
        assert!(Frame::parse(&[0u8; 13]).is_err());
    }

    #[test]
    fn test_non_ip_ethertype_rejected() {
        let mut buf = vec![0u8; 14];
        buf[12] = 0x08;
        buf[13] = 0x06; // ARP

        let frame = Frame::parse(&buf).unwrap();
        assert!(matches!(frame.network_kind(), Err(Error::Unsupported(_))));
    }
}
