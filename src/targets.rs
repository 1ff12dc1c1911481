use crate::error::{Result, ScanError};
use anyhow::Context;
use if_addrs::{get_if_addrs, IfAddr};
use ipnet::{IpAddrRange, IpNet, Ipv4Net, Ipv6Net};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};

/// Parse a subnet in CIDR notation, or a bare address as a single-host network.
///
/// Host bits are dropped, so `10.112.23.90/24` becomes `10.112.23.0/24`.
pub fn parse_subnet(s: &str) -> Result<IpNet> {
    let s = s.trim();
    let invalid = |reason: String| ScanError::InvalidSubnetFormat {
        input: s.to_string(),
        reason,
    };

    if s.contains('/') {
        let net = s.parse::<IpNet>().map_err(|e| invalid(e.to_string()))?;
        return Ok(net.trunc());
    }

    let ip = s
        .parse::<IpAddr>()
        .map_err(|e| invalid(e.to_string()))?;
    let net = match ip {
        IpAddr::V4(v4) => Ipv4Net::new(v4, 32).map(IpNet::V4),
        IpAddr::V6(v6) => Ipv6Net::new(v6, 128).map(IpNet::V6),
    };
    net.map_err(|e| invalid(e.to_string()))
}

/// Usable host addresses of a subnet.
///
/// Iteration is lazy and restartable: every `iter()` call starts from the
/// first host again. For IPv4, network and broadcast are excluded unless the
/// prefix is /31 or /32.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubnetHosts {
    net: IpNet,
}

impl SubnetHosts {
    pub fn new(net: IpNet) -> Self {
        Self { net }
    }

    /// Parse and wrap in one step; fails with `InvalidSubnetFormat`.
    pub fn parse(s: &str) -> Result<Self> {
        parse_subnet(s).map(Self::new)
    }

    pub fn network(&self) -> IpNet {
        self.net
    }

    pub fn iter(&self) -> IpAddrRange {
        self.net.hosts()
    }

    /// Number of hosts `iter()` yields, without walking the range.
    pub fn host_count(&self) -> u128 {
        let bits = self.net.max_prefix_len() - self.net.prefix_len();
        let total: u128 = if bits >= 128 { u128::MAX } else { 1u128 << bits };
        match self.net {
            IpNet::V4(_) if bits >= 2 => total - 2,
            _ => total,
        }
    }
}

impl IntoIterator for SubnetHosts {
    type Item = IpAddr;
    type IntoIter = IpAddrRange;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl IntoIterator for &SubnetHosts {
    type Item = IpAddr;
    type IntoIter = IpAddrRange;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Resolve an IP literal or a DNS name to one address (first answer wins).
pub async fn resolve_host(host: &str) -> Result<IpAddr> {
    let host = host.trim();
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }
    let mut addrs = tokio::net::lookup_host((host, 0))
        .await
        .map_err(|_| ScanError::UnresolvableHost(host.to_string()))?;
    addrs
        .next()
        .map(|sa| sa.ip())
        .ok_or_else(|| ScanError::UnresolvableHost(host.to_string()))
}

/// Detect local non-loopback IPv4 addresses and convert each to its /24 network.
///
/// An interface address `192.168.1.42` becomes `192.168.1.0/24`. Duplicates
/// are removed and the result is sorted.
pub fn detect_local_cidrs() -> anyhow::Result<Vec<IpNet>> {
    let mut set = HashSet::<Ipv4Net>::new();
    for iface in get_if_addrs().context("failed to list network interfaces")? {
        if let IfAddr::V4(v4) = iface.addr {
            if v4.ip.is_loopback() {
                continue;
            }
            set.insert(ipv4_to_default_cidr(v4.ip));
        }
    }
    let mut cidrs: Vec<Ipv4Net> = set.into_iter().collect();
    cidrs.sort_by_key(|n| (u32::from(n.network()), n.prefix_len()));
    Ok(cidrs.into_iter().map(IpNet::V4).collect())
}

pub fn ipv4_to_default_cidr(ip: Ipv4Addr) -> Ipv4Net {
    let o = ip.octets();
    let net = Ipv4Addr::new(o[0], o[1], o[2], 0);
    Ipv4Net::new(net, 24).expect("/24 is always valid")
}
