use crate::types::{Endpoint, FailureKind, ProbeReport};
use async_trait::async_trait;
use std::io;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{self, Instant};
use tracing::{debug, trace};

/// A single fallible reachability check against one endpoint.
///
/// Implementations must be safe to call from many tasks at once and must not
/// leak the resources they open, whatever the result.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, endpoint: Endpoint) -> ProbeReport;
}

/// Plain TCP connect probe bounded by a fixed timeout.
#[derive(Debug, Clone, Copy)]
pub struct TcpProber {
    timeout: Duration,
}

impl TcpProber {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl Prober for TcpProber {
    async fn probe(&self, endpoint: Endpoint) -> ProbeReport {
        probe_endpoint(endpoint, self.timeout).await
    }
}

/// Attempt one TCP handshake with `endpoint` within `timeout`.
///
/// The stream is dropped before returning on success; on timeout the pending
/// connect future is dropped, which closes its socket as well.
pub async fn probe_endpoint(endpoint: Endpoint, timeout: Duration) -> ProbeReport {
    let start = Instant::now();
    let connect_res = time::timeout(timeout, TcpStream::connect(endpoint.socket_addr())).await;
    let latency_ms = start.elapsed().as_millis() as u64;

    let report = match connect_res {
        Ok(Ok(stream)) => {
            drop(stream);
            ProbeReport::reachable(endpoint, latency_ms)
        }
        Ok(Err(e)) => {
            let kind = classify_io_error(&e);
            trace!(%endpoint, error = %e, "connect failed");
            ProbeReport::unreachable(endpoint, kind, latency_ms)
        }
        Err(_elapsed) => ProbeReport::unreachable(endpoint, FailureKind::TimedOut, latency_ms),
    };

    match report.failure {
        None => debug!(%endpoint, latency_ms, "reachable"),
        Some(kind) => debug!(%endpoint, latency_ms, reason = %kind, "unreachable"),
    }
    report
}

/// Map a connect error onto the diagnostic failure kinds.
pub fn classify_io_error(e: &io::Error) -> FailureKind {
    match e.kind() {
        io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset => FailureKind::Refused,
        io::ErrorKind::TimedOut => FailureKind::TimedOut,
        _ => match e.raw_os_error() {
            Some(EHOSTUNREACH) => FailureKind::HostUnreachable,
            Some(ENETUNREACH) => FailureKind::NetworkUnreachable,
            _ => FailureKind::Other,
        },
    }
}

#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
const EHOSTUNREACH: i32 = 65;
#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
const ENETUNREACH: i32 = 51;
#[cfg(windows)]
const EHOSTUNREACH: i32 = 10065;
#[cfg(windows)]
const ENETUNREACH: i32 = 10051;
#[cfg(not(any(target_os = "macos", target_os = "ios", target_os = "freebsd", windows)))]
const EHOSTUNREACH: i32 = 113;
#[cfg(not(any(target_os = "macos", target_os = "ios", target_os = "freebsd", windows)))]
const ENETUNREACH: i32 = 101;

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use tokio::net::TcpListener;

    #[test]
    fn classify_refused_and_timeout() {
        let refused = io::Error::from(io::ErrorKind::ConnectionRefused);
        assert_eq!(classify_io_error(&refused), FailureKind::Refused);
        let timed_out = io::Error::from(io::ErrorKind::TimedOut);
        assert_eq!(classify_io_error(&timed_out), FailureKind::TimedOut);
        let other = io::Error::from(io::ErrorKind::PermissionDenied);
        assert_eq!(classify_io_error(&other), FailureKind::Other);
    }

    #[tokio::test]
    async fn listener_is_reachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = Endpoint::from(listener.local_addr().unwrap());
        let report = TcpProber::new(Duration::from_secs(1)).probe(endpoint).await;
        assert_eq!(report.failure, None);
    }

    #[tokio::test]
    async fn closed_port_is_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let endpoint = Endpoint::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port);
        let report = probe_endpoint(endpoint, Duration::from_secs(1)).await;
        assert_eq!(report.failure, Some(FailureKind::Refused));
    }
}
