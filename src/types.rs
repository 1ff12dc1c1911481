use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// One TCP destination: an address and a port.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint {
    pub ip: IpAddr,
    pub port: u16,
}

impl Endpoint {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self { ip, port }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip(), addr.port())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.socket_addr())
    }
}

/// What a single probe concluded about an endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProbeOutcome {
    Reachable,
    Unreachable,
}

/// Why a probe came back unreachable. Only used for diagnostics; the
/// partition collapses every kind into `Unreachable`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Refused,
    TimedOut,
    HostUnreachable,
    NetworkUnreachable,
    Other,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Refused => "refused",
            FailureKind::TimedOut => "timed out",
            FailureKind::HostUnreachable => "host unreachable",
            FailureKind::NetworkUnreachable => "network unreachable",
            FailureKind::Other => "other socket error",
        };
        f.write_str(s)
    }
}

/// Full result of one probe, as produced by a `Prober`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub endpoint: Endpoint,
    pub failure: Option<FailureKind>,
    pub latency_ms: u64,
}

impl ProbeReport {
    pub fn reachable(endpoint: Endpoint, latency_ms: u64) -> Self {
        Self { endpoint, failure: None, latency_ms }
    }

    pub fn unreachable(endpoint: Endpoint, kind: FailureKind, latency_ms: u64) -> Self {
        Self { endpoint, failure: Some(kind), latency_ms }
    }

    pub fn outcome(&self) -> ProbeOutcome {
        match self.failure {
            None => ProbeOutcome::Reachable,
            Some(_) => ProbeOutcome::Unreachable,
        }
    }
}

/// A finite, ordered list of endpoints handed to one scan.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkList {
    endpoints: Vec<Endpoint>,
}

impl WorkList {
    /// Single-host port scan: `ip` paired with every port, in order.
    pub fn ports_on_host(ip: IpAddr, ports: &[u16]) -> Self {
        ports.iter().map(|&port| Endpoint::new(ip, port)).collect()
    }

    /// Subnet discovery: every host paired with one fixed port, in order.
    pub fn hosts_on_port<I>(hosts: I, port: u16) -> Self
    where
        I: IntoIterator<Item = IpAddr>,
    {
        hosts.into_iter().map(|ip| Endpoint::new(ip, port)).collect()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Endpoint> {
        self.endpoints.iter()
    }

    pub fn as_slice(&self) -> &[Endpoint] {
        &self.endpoints
    }
}

impl From<Vec<Endpoint>> for WorkList {
    fn from(endpoints: Vec<Endpoint>) -> Self {
        Self { endpoints }
    }
}

impl FromIterator<Endpoint> for WorkList {
    fn from_iter<T: IntoIterator<Item = Endpoint>>(iter: T) -> Self {
        Self { endpoints: iter.into_iter().collect() }
    }
}

impl<'a> IntoIterator for &'a WorkList {
    type Item = &'a Endpoint;
    type IntoIter = std::slice::Iter<'a, Endpoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.endpoints.iter()
    }
}

/// Reachable and unreachable endpoints of one scan. Element order inside
/// each list follows completion order and carries no meaning.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultPartition {
    pub reachable: Vec<Endpoint>,
    pub unreachable: Vec<Endpoint>,
}

impl ResultPartition {
    pub fn len(&self) -> usize {
        self.reachable.len() + self.unreachable.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, endpoint: &Endpoint) -> bool {
        self.outcome_of(endpoint).is_some()
    }

    pub fn outcome_of(&self, endpoint: &Endpoint) -> Option<ProbeOutcome> {
        if self.reachable.contains(endpoint) {
            Some(ProbeOutcome::Reachable)
        } else if self.unreachable.contains(endpoint) {
            Some(ProbeOutcome::Unreachable)
        } else {
            None
        }
    }

    pub fn reachable_set(&self) -> HashSet<Endpoint> {
        self.reachable.iter().copied().collect()
    }

    pub fn unreachable_set(&self) -> HashSet<Endpoint> {
        self.unreachable.iter().copied().collect()
    }

    /// Reachable ports, ascending.
    pub fn reachable_ports(&self) -> Vec<u16> {
        sorted_ports(&self.reachable)
    }

    pub fn unreachable_ports(&self) -> Vec<u16> {
        sorted_ports(&self.unreachable)
    }

    /// Reachable hosts, ascending.
    pub fn reachable_hosts(&self) -> Vec<IpAddr> {
        sorted_hosts(&self.reachable)
    }

    pub fn unreachable_hosts(&self) -> Vec<IpAddr> {
        sorted_hosts(&self.unreachable)
    }

    /// Copy with both lists sorted, for stable presentation.
    pub fn sorted(&self) -> Self {
        let mut out = self.clone();
        out.reachable.sort();
        out.unreachable.sort();
        out
    }
}

fn sorted_ports(endpoints: &[Endpoint]) -> Vec<u16> {
    let mut ports: Vec<u16> = endpoints.iter().map(|e| e.port).collect();
    ports.sort_unstable();
    ports
}

fn sorted_hosts(endpoints: &[Endpoint]) -> Vec<IpAddr> {
    let mut hosts: Vec<IpAddr> = endpoints.iter().map(|e| e.ip).collect();
    hosts.sort_unstable();
    hosts
}

/// Partition plus bookkeeping for one scan invocation.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ScanReport {
    pub scanned_total: u64,
    pub started_at: String,
    pub finished_at: String,
    pub elapsed_ms: u64,
    /// Set when a deadline or cancellation cut the scan short. Items that
    /// never resolved are counted as unreachable.
    pub cancelled: bool,
    pub partition: ResultPartition,
}
