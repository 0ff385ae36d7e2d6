//! Common wire-format types

use std::fmt;
use std::str::FromStr;

/// MAC address (6 bytes)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const ZERO: MacAddr = MacAddr([0, 0, 0, 0, 0, 0]);
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Error type for MAC address parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseMacAddrError;

impl fmt::Display for ParseMacAddrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid MAC address")
    }
}

impl std::error::Error for ParseMacAddrError {}

impl FromStr for MacAddr {
    type Err = ParseMacAddrError;

    /// Parse a MAC address from colon- or hyphen-separated hex
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let sep = if s.contains('-') { '-' } else { ':' };
        let mut result = [0u8; 6];
        let mut count = 0;

        for (i, part) in s.split(sep).enumerate() {
            if i >= 6 || part.len() != 2 {
                return Err(ParseMacAddrError);
            }
            result[i] = u8::from_str_radix(part, 16).map_err(|_| ParseMacAddrError)?;
            count += 1;
        }

        if count != 6 {
            return Err(ParseMacAddrError);
        }

        Ok(MacAddr(result))
    }
}

/// EtherType values carried by the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum EtherType {
    Ipv4 = 0x0800,
    Ipv6 = 0x86DD,
}

impl EtherType {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0800 => Some(EtherType::Ipv4),
            0x86DD => Some(EtherType::Ipv6),
            _ => None,
        }
    }
}

/// Link layer of a captured frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Ethernet,
    Loopback,
}

/// Network layer of a parsed packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkKind {
    Ipv4,
    Ipv6,
}

impl fmt::Display for NetworkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkKind::Ipv4 => write!(f, "IPv4"),
            NetworkKind::Ipv6 => write!(f, "IPv6"),
        }
    }
}

/// Transport layer of a parsed packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Tcp,
    Udp,
}

impl TransportKind {
    /// IP protocol number (also the IPv6 next-header value)
    pub fn ip_protocol(&self) -> u8 {
        match self {
            TransportKind::Tcp => 6,
            TransportKind::Udp => 17,
        }
    }

    pub fn from_ip_protocol(value: u8) -> Option<Self> {
        match value {
            6 => Some(TransportKind::Tcp),
            17 => Some(TransportKind::Udp),
            _ => None,
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Tcp => write!(f, "TCP"),
            TransportKind::Udp => write!(f, "UDP"),
        }
    }
}
