//! Configuration validation

use super::Config;
use std::net::IpAddr;

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn print_diagnostics(&self) {
        for warning in &self.warnings {
            eprintln!("[WARN] {}", warning);
        }
        for error in &self.errors {
            eprintln!("[ERROR] {}", error);
        }
    }
}

/// Validate configuration and return warnings/errors
pub fn validate(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    validate_listen(config, &mut result);
    validate_upstream(config, &mut result);
    validate_gateway(config, &mut result);
    validate_interfaces(config, &mut result);

    result
}

fn validate_listen(config: &Config, result: &mut ValidationResult) {
    if config.listen_port == 0 {
        result.error("listen_port must be nonzero");
    }

    if config.listen.is_empty() {
        result.error("missing listen device");
    }

    for name in &config.listen {
        if !config.interfaces.contains_key(name) {
            result.error(format!("listen device {} has no [interfaces.{}]", name, name));
        }
        if *name == config.upstream {
            result.warn(format!(
                "device {} is both a listen device and the upstream device",
                name
            ));
        }
    }
}

fn validate_upstream(config: &Config, result: &mut ValidationResult) {
    let Some(iface) = config.interfaces.get(&config.upstream) else {
        result.error(format!(
            "upstream device {} has no [interfaces.{}]",
            config.upstream, config.upstream
        ));
        return;
    };

    if iface.addresses.is_empty() {
        result.error(format!(
            "interfaces.{}: upstream device needs at least one address",
            config.upstream
        ));
    }

    if !iface.loopback && iface.mac.is_none() {
        result.error(format!(
            "interfaces.{}: upstream device needs a MAC unless loopback",
            config.upstream
        ));
    }

    // Egress picks the carrier family from the gateway address; the
    // upstream device must be able to source that family.
    if let Ok(gateway_ip) = config.gateway.address.parse::<IpAddr>() {
        let has_family = iface.addresses.iter().any(|a| {
            a.parse::<IpAddr>()
                .map(|ip| ip.is_ipv4() == gateway_ip.is_ipv4())
                .unwrap_or(false)
        });
        if !has_family {
            result.error(format!(
                "interfaces.{}: no address in the gateway's family",
                config.upstream
            ));
        }
    }
}

fn validate_gateway(config: &Config, result: &mut ValidationResult) {
    if config.gateway.address.parse::<IpAddr>().is_err() {
        result.error(format!(
            "gateway: invalid address {}",
            config.gateway.address
        ));
    }

    let upstream_is_loopback = config
        .interfaces
        .get(&config.upstream)
        .map(|i| i.loopback)
        .unwrap_or(false);

    if config.gateway.mac.is_none() && !upstream_is_loopback {
        result.error("gateway: mac is required unless the upstream device is loopback");
    }

    if let Some(mac) = &config.gateway.mac {
        if mac.parse::<crate::protocol::MacAddr>().is_err() {
            result.error(format!("gateway: invalid MAC {}", mac));
        }
    }
}

fn validate_interfaces(config: &Config, result: &mut ValidationResult) {
    for (name, iface) in &config.interfaces {
        if iface.addresses.is_empty() {
            result.warn(format!("interfaces.{}: no addresses configured", name));
        }

        for addr in &iface.addresses {
            if addr.parse::<IpAddr>().is_err() {
                result.error(format!("interfaces.{}: invalid address {}", name, addr));
            }
        }

        if let Some(mac) = &iface.mac {
            if mac.parse::<crate::protocol::MacAddr>().is_err() {
                result.error(format!("interfaces.{}: invalid MAC {}", name, mac));
            }
        }

        if iface.loopback && iface.mac.is_some() {
            result.warn(format!("interfaces.{}: MAC on a loopback device is ignored", name));
        }
    }
}
