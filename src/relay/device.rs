//! Capture device description
//!
//! Devices arrive fully described from configuration; interface discovery
//! happens outside this crate.

use crate::protocol::{LinkKind, MacAddr};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// A capture endpoint. Immutable after startup.
#[derive(Debug, Clone)]
pub struct Device {
    pub name: String,
    pub friendly_name: String,
    /// Absent on loopback devices
    pub hardware_addr: Option<MacAddr>,
    /// Bound addresses, in configuration order
    pub ip_addrs: Vec<IpAddr>,
    pub is_loopback: bool,
}

impl Device {
    /// First bound address, if any
    pub fn ip_addr(&self) -> Option<IpAddr> {
        self.ip_addrs.first().copied()
    }

    /// First bound IPv4 address, if any
    pub fn ipv4_addr(&self) -> Option<Ipv4Addr> {
        self.ip_addrs.iter().find_map(|a| match a {
            IpAddr::V4(v4) => Some(*v4),
            IpAddr::V6(_) => None,
        })
    }

    /// First bound IPv6 address, if any
    pub fn ipv6_addr(&self) -> Option<Ipv6Addr> {
        self.ip_addrs.iter().find_map(|a| match a {
            IpAddr::V6(v6) => Some(*v6),
            IpAddr::V4(_) => None,
        })
    }

    /// Link layer this device captures and emits
    pub fn link_kind(&self) -> LinkKind {
        if self.is_loopback {
            LinkKind::Loopback
        } else {
            LinkKind::Ethernet
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let addrs: Vec<String> = self.ip_addrs.iter().map(|a| a.to_string()).collect();
        match self.hardware_addr {
            Some(hw) if !self.is_loopback => {
                write!(f, "{} [{}]: {}", self.friendly_name, hw, addrs.join(", "))
            }
            _ => write!(f, "{}: {}", self.friendly_name, addrs.join(", ")),
        }
    }
}
