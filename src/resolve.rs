//! Hostname resolution.

use std::net::{IpAddr, Ipv4Addr};

use crate::error::{PingError, PingResult};

/// Resolves `host` to its first IPv4 address. IP literals are returned as is.
pub async fn resolve_host(host: &str) -> PingResult<Ipv4Addr> {
    if let Ok(ip) = host.parse::<Ipv4Addr>() {
        return Ok(ip);
    }

    let addrs = tokio::net::lookup_host((host, 0))
        .await
        .map_err(|source| PingError::Resolve {
            host: host.to_string(),
            source,
        })?;
    addrs
        .filter_map(|addr| match addr.ip() {
            IpAddr::V4(ip) => Some(ip),
            IpAddr::V6(_) => None,
        })
        .next()
        .ok_or_else(|| PingError::NoIpv4Address(host.to_string()))
}
