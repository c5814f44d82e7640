//! Server endpoint discovery from host interfaces

use std::net::{Ipv4Addr, SocketAddrV4};

use crate::error::{Error, Result};

/// Find the first non-loopback IPv4 address on the host, ignoring the
/// tunnel interface itself
pub fn detect_endpoint(tunnel_interface: &str) -> Result<Ipv4Addr> {
    let addrs = nix::ifaddrs::getifaddrs()
        .map_err(|e| Error::Network(format!("failed to enumerate interfaces: {}", e)))?;

    let candidates = addrs.filter_map(|ifaddr| {
        let sin = ifaddr.address.as_ref()?.as_sockaddr_in().copied()?;
        Some((ifaddr.interface_name, *SocketAddrV4::from(sin).ip()))
    });

    select_endpoint(candidates, tunnel_interface)
        .ok_or_else(|| Error::Network("no suitable IPv4 address found".to_string()))
}

fn select_endpoint<I>(candidates: I, tunnel_interface: &str) -> Option<Ipv4Addr>
where
    I: IntoIterator<Item = (String, Ipv4Addr)>,
{
    candidates
        .into_iter()
        .find(|(name, ip)| name != tunnel_interface && !ip.is_loopback() && !ip.is_unspecified())
        .map(|(_, ip)| ip)
}
