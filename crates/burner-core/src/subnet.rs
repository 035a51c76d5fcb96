//! IPv4 subnet enumeration.

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use network_interface::{Addr, NetworkInterface, NetworkInterfaceConfig};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SubnetError {
    #[error("Invalid CIDR: {0}")]
    InvalidCidr(String),

    #[error("Failed to list network interfaces: {0}")]
    Interfaces(String),
}

/// Candidate host addresses of `cidr`, in numeric order.
///
/// Addresses in `exclude` are skipped. For networks of more than two
/// addresses the network and broadcast addresses are left out; `/31` and
/// `/32` are returned whole.
pub fn hosts(cidr: &str, exclude: &[Ipv4Addr]) -> Result<Vec<Ipv4Addr>, SubnetError> {
    let net: Ipv4Net = cidr
        .trim()
        .parse()
        .map_err(|_| SubnetError::InvalidCidr(cidr.to_string()))?;

    let first = u32::from(net.network());
    let last = u32::from(net.broadcast());
    let has_edges = last - first >= 2;

    Ok((first..=last)
        .filter(|&a| !(has_edges && (a == first || a == last)))
        .map(Ipv4Addr::from)
        .filter(|ip| {
            let skip = exclude.contains(ip);
            if skip {
                debug!(ip = %ip, "Skipping excluded address");
            }
            !skip
        })
        .collect())
}

/// Turn an operator-supplied network into CIDR form. A bare address becomes
/// a `/32`.
pub fn normalize_network(arg: &str) -> Result<String, SubnetError> {
    let arg = arg.trim();
    if let Ok(ip) = arg.parse::<Ipv4Addr>() {
        return Ok(format!("{ip}/32"));
    }
    arg.parse::<Ipv4Net>()
        .map(|net| net.to_string())
        .map_err(|_| SubnetError::InvalidCidr(arg.to_string()))
}

/// Networks attached to this machine, and its own addresses on them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalNetworks {
    pub networks: Vec<Ipv4Net>,
    pub own_addresses: Vec<Ipv4Addr>,
}

/// Every non-loopback IPv4 network of the local interfaces.
pub fn local_networks() -> Result<LocalNetworks, SubnetError> {
    let interfaces =
        NetworkInterface::show().map_err(|e| SubnetError::Interfaces(e.to_string()))?;

    let mut local = LocalNetworks::default();
    for iface in interfaces {
        for addr in &iface.addr {
            let Addr::V4(v4) = addr else {
                continue;
            };
            if v4.ip.is_loopback() {
                continue;
            }
            let Some(mask) = v4.netmask else {
                debug!(iface = %iface.name, ip = %v4.ip, "No netmask, ignoring");
                continue;
            };
            let prefix = u32::from(mask).count_ones() as u8;
            let Ok(net) = Ipv4Net::new(v4.ip, prefix) else {
                continue;
            };
            let net = net.trunc();
            debug!(iface = %iface.name, network = %net, "Local IPv4 network");
            if !local.networks.contains(&net) {
                local.networks.push(net);
            }
            local.own_addresses.push(v4.ip);
        }
    }
    Ok(local)
}
