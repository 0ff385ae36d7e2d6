//! Null/loopback link layer
//!
//! A 4-byte address-family word in host byte order, as written by capture
//! drivers for loopback devices (DLT_NULL). IPv6 family values differ
//! between BSD flavors; all three are accepted on parse.

use super::NetworkKind;
use crate::{Error, Result};

/// Header size: the family word only
pub const HEADER_SIZE: usize = 4;

const FAMILY_INET: u32 = 2;
const FAMILY_INET6: [u32; 3] = [24, 28, 30];

/// Parsed loopback pseudo-header
#[derive(Debug, Clone, Copy)]
pub struct Header {
    family: u32,
}

impl Header {
    pub fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < HEADER_SIZE {
            return Err(Error::Parse("loopback header too short".into()));
        }

        let raw: [u8; 4] = buffer[0..4].try_into().unwrap();
        let native = u32::from_ne_bytes(raw);

        // A capture written on an opposite-endian host carries the family
        // byte-swapped; try both before giving up.
        let family = if is_known_family(native) {
            native
        } else {
            native.swap_bytes()
        };

        Ok(Self { family })
    }

    pub fn network_kind(&self) -> Result<NetworkKind> {
        if self.family == FAMILY_INET {
            Ok(NetworkKind::Ipv4)
        } else if FAMILY_INET6.contains(&self.family) {
            Ok(NetworkKind::Ipv6)
        } else {
            Err(Error::Unsupported(format!(
                "loopback family {}",
                self.family
            )))
        }
    }
}

fn is_known_family(value: u32) -> bool {
    value == FAMILY_INET || FAMILY_INET6.contains(&value)
}

/// Append a loopback header; the family word is derived from the network kind
pub fn write_header(out: &mut Vec<u8>, kind: NetworkKind) {
    let family: u32 = match kind {
        NetworkKind::Ipv4 => FAMILY_INET,
        NetworkKind::Ipv6 => FAMILY_INET6[2],
    };

    out.extend_from_slice(&family.to_ne_bytes());
}
