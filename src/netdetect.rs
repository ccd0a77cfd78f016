use if_addrs::{get_if_addrs, IfAddr};
use ipnet::Ipv4Net;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

use crate::error::ProbeError;

/// Resolve a scan target (IP literal or hostname) to one address, IPv4 preferred.
pub async fn resolve_target(target: &str) -> Result<IpAddr, ProbeError> {
    let host = target.trim();
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, 0))
        .await
        .map_err(|e| ProbeError::Resolve {
            host: host.to_string(),
            reason: e.to_string(),
        })?
        .collect();
    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .map(SocketAddr::ip)
        .ok_or_else(|| ProbeError::Resolve {
            host: host.to_string(),
            reason: "no addresses returned".to_string(),
        })
}

/// Local IPv4 address to stamp into hand-built segments sent to `target`.
///
/// Prefers the interface whose network contains the target; otherwise asks the
/// kernel which address it would route from.
pub fn source_ipv4_for(target: Ipv4Addr) -> Result<Ipv4Addr, ProbeError> {
    if target.is_loopback() {
        return Ok(Ipv4Addr::LOCALHOST);
    }
    let mut nets = Vec::new();
    for iface in get_if_addrs()? {
        if let IfAddr::V4(v4) = iface.addr {
            if v4.ip.is_loopback() {
                continue;
            }
            if let Ok(net) = Ipv4Net::with_netmask(v4.ip, v4.netmask) {
                nets.push(net);
            }
        }
    }
    match pick_source(&nets, target) {
        Some(ip) => Ok(ip),
        None => routed_source_ipv4(target),
    }
}

/// Address of the first interface network that contains `target`.
pub fn pick_source(nets: &[Ipv4Net], target: Ipv4Addr) -> Option<Ipv4Addr> {
    nets.iter().find(|n| n.contains(&target)).map(Ipv4Net::addr)
}

fn routed_source_ipv4(target: Ipv4Addr) -> Result<Ipv4Addr, ProbeError> {
    // Connecting a UDP socket sends nothing; it only selects a route.
    let sock = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    sock.connect(SocketAddr::new(IpAddr::V4(target), 53))?;
    match sock.local_addr()?.ip() {
        IpAddr::V4(v4) if !v4.is_unspecified() => Ok(v4),
        other => Err(ProbeError::Io(format!("no usable IPv4 source address ({other})"))),
    }
}
