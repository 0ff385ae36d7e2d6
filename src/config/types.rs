//! Configuration types

use crate::protocol::MacAddr;
use crate::relay::Device;
use crate::telemetry::LogConfig;
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::IpAddr;

/// User-supplied configuration (TOML)
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Carrier listening port
    pub listen_port: u16,
    /// Names of the devices that accept carrier traffic
    pub listen: Vec<String>,
    /// Name of the device facing the internet
    pub upstream: String,
    #[serde(default)]
    pub interfaces: HashMap<String, InterfaceConfig>,
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub log: LogSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InterfaceConfig {
    pub friendly_name: Option<String>,
    /// Absent on loopback devices
    pub mac: Option<String>,
    #[serde(default)]
    pub addresses: Vec<String>,
    #[serde(default)]
    pub loopback: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub address: String,
    pub mac: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogSection {
    pub level: Option<String>,
    pub format: Option<String>,
}

impl LogSection {
    pub fn to_log_config(&self) -> LogConfig {
        let defaults = LogConfig::default();
        LogConfig {
            level: self.level.clone().unwrap_or(defaults.level),
            format: self.format.clone().unwrap_or(defaults.format),
        }
    }
}

/// Devices resolved from a validated configuration
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub listen_port: u16,
    pub listen_devs: Vec<Device>,
    pub upstream_dev: Device,
    pub gateway_dev: Device,
}

impl Config {
    /// Build the device for a configured interface
    pub fn device(&self, name: &str) -> Result<Device> {
        let iface = self
            .interfaces
            .get(name)
            .ok_or_else(|| Error::InterfaceNotFound {
                name: name.to_string(),
            })?;

        let hardware_addr = match &iface.mac {
            Some(mac) => Some(parse_mac(name, mac)?),
            None => None,
        };

        let mut ip_addrs = Vec::with_capacity(iface.addresses.len());
        for addr in &iface.addresses {
            let ip: IpAddr = addr.parse().map_err(|_| {
                Error::Config(format!("interfaces.{}: invalid address {}", name, addr))
            })?;
            ip_addrs.push(ip);
        }

        Ok(Device {
            name: name.to_string(),
            friendly_name: iface.friendly_name.clone().unwrap_or_else(|| name.to_string()),
            hardware_addr,
            ip_addrs,
            is_loopback: iface.loopback,
        })
    }

    /// Resolve every device the relay needs
    pub fn resolve(&self) -> Result<ResolvedConfig> {
        let mut listen_devs = Vec::with_capacity(self.listen.len());
        for name in &self.listen {
            listen_devs.push(self.device(name)?);
        }

        let upstream_dev = self.device(&self.upstream)?;

        let gateway_ip: IpAddr = self.gateway.address.parse().map_err(|_| {
            Error::Config(format!("gateway: invalid address {}", self.gateway.address))
        })?;
        let gateway_mac = match &self.gateway.mac {
            Some(mac) => Some(parse_mac("gateway", mac)?),
            None => None,
        };

        let gateway_dev = Device {
            name: "gateway".to_string(),
            friendly_name: "gateway".to_string(),
            hardware_addr: gateway_mac,
            ip_addrs: vec![gateway_ip],
            is_loopback: upstream_dev.is_loopback,
        };

        Ok(ResolvedConfig {
            listen_port: self.listen_port,
            listen_devs,
            upstream_dev,
            gateway_dev,
        })
    }
}

fn parse_mac(owner: &str, mac: &str) -> Result<MacAddr> {
    mac.parse()
        .map_err(|_| Error::Config(format!("{}: invalid MAC {}", owner, mac)))
}
