//! `GET /` dumper for hosts already known to be reachable.
use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use std::fmt;
use std::net::Ipv6Addr;
use std::time::Duration;
use ::time::{format_description::well_known, OffsetDateTime};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;
use tracing::debug;
use x509_parser::parse_x509_certificate;

/// Responses larger than this are truncated.
pub const MAX_RESPONSE_BYTES: usize = 1 << 20;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CertSummary {
    pub subject: String,
    pub issuer: String,
    pub not_after: String,
}

/// Status line, headers and body of one response.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HttpDump {
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub certificate: Option<CertSummary>,
}

impl HttpDump {
    /// First header with this name, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for HttpDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Status: {}", self.status)?;
        writeln!(f, "Reason: {}", self.reason)?;
        if let Some(cert) = &self.certificate {
            writeln!(f, "Certificate:")?;
            writeln!(f, "  subject  : {}", cert.subject)?;
            writeln!(f, "  issuer   : {}", cert.issuer)?;
            writeln!(f, "  not after: {}", cert.not_after)?;
        }
        writeln!(f, "Headers:")?;
        for (k, v) in &self.headers {
            writeln!(f, "  {k}: {v}")?;
        }
        writeln!(f, "Body:")?;
        write!(f, "{}", self.body)
    }
}

/// Issue `GET /` against `host:port` and return the parsed response.
///
/// `timeout` bounds the whole exchange (connect, TLS handshake, request and
/// read). With `tls`, certificate validation is disabled and the peer
/// certificate is summarised instead.
pub async fn fetch_root(host: &str, port: u16, tls: bool, timeout: Duration) -> Result<HttpDump> {
    time::timeout(timeout, fetch_root_inner(host, port, tls))
        .await
        .map_err(|_| anyhow!("timed out after {} ms fetching {host}:{port}", timeout.as_millis()))?
}

async fn fetch_root_inner(host: &str, port: u16, tls: bool) -> Result<HttpDump> {
    let stream = TcpStream::connect((host, port))
        .await
        .with_context(|| format!("failed to connect to {host}:{port}"))?;
    debug!(host, port, tls, "connected");

    if !tls {
        let mut stream = stream;
        let raw = exchange(&mut stream, host).await?;
        return parse_response(&raw);
    }

    let connector = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .build()
        .context("failed to build TLS connector")?;
    let connector = tokio_native_tls::TlsConnector::from(connector);
    let mut tls_stream = connector
        .connect(host, stream)
        .await
        .with_context(|| format!("TLS handshake with {host}:{port} failed"))?;

    let certificate = match tls_stream.get_ref().peer_certificate() {
        Ok(Some(cert)) => cert.to_der().ok().and_then(|der| summarize_certificate(&der)),
        _ => None,
    };

    let raw = exchange(&mut tls_stream, host).await?;
    let mut dump = parse_response(&raw)?;
    dump.certificate = certificate;
    Ok(dump)
}

async fn exchange<S>(stream: &mut S, host: &str) -> Result<Vec<u8>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let req = format!(
        "GET / HTTP/1.0\r\nHost: {}\r\nUser-Agent: reachscan/{}\r\nAccept: */*\r\nAccept-Encoding: identity\r\nConnection: close\r\n\r\n",
        host_header(host),
        env!("CARGO_PKG_VERSION")
    );
    stream
        .write_all(req.as_bytes())
        .await
        .context("failed to send request")?;

    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = stream.read(&mut chunk).await.context("failed to read response")?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.len() >= MAX_RESPONSE_BYTES {
            buf.truncate(MAX_RESPONSE_BYTES);
            break;
        }
    }
    let _ = stream.shutdown().await;
    Ok(buf)
}

/// `Host` header value: IPv6 literals go in brackets.
fn host_header(host: &str) -> String {
    if host.parse::<Ipv6Addr>().is_ok() {
        format!("[{host}]")
    } else {
        host.to_string()
    }
}

/// Parse a raw HTTP/1.x response. Chunked bodies are decoded.
pub fn parse_response(raw: &[u8]) -> Result<HttpDump> {
    let split = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .ok_or_else(|| anyhow!("response has no header terminator"))?;
    let head = String::from_utf8_lossy(&raw[..split]);
    let body_raw = &raw[split + 4..];

    let mut lines = head.split("\r\n");
    let status_line = lines.next().unwrap_or_default();
    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/") {
        bail!("not an HTTP response: {status_line}");
    }
    let status = parts
        .next()
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(|| anyhow!("invalid status line: {status_line}"))?;
    let reason = parts.next().unwrap_or_default().to_string();

    let headers: Vec<(String, String)> = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();

    let chunked = headers.iter().any(|(k, v)| {
        k.eq_ignore_ascii_case("transfer-encoding") && v.to_ascii_lowercase().contains("chunked")
    });
    let body = if chunked {
        decode_chunked(body_raw)
    } else {
        body_raw.to_vec()
    };

    Ok(HttpDump {
        status,
        reason,
        headers,
        body: String::from_utf8_lossy(&body).to_string(),
        certificate: None,
    })
}

fn decode_chunked(mut data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    while let Some(eol) = data.windows(2).position(|w| w == b"\r\n") {
        let size_line = String::from_utf8_lossy(&data[..eol]);
        let size_hex = size_line.split(';').next().unwrap_or("").trim();
        let size = match usize::from_str_radix(size_hex, 16) {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        data = &data[eol + 2..];
        let take = size.min(data.len());
        out.extend_from_slice(&data[..take]);
        data = data.get(take + 2..).unwrap_or(&[]);
    }
    out
}

fn summarize_certificate(der: &[u8]) -> Option<CertSummary> {
    let (_, cert) = parse_x509_certificate(der).ok()?;
    let not_after: OffsetDateTime = cert.validity().not_after.to_datetime();
    Some(CertSummary {
        subject: cert.subject().to_string(),
        issuer: cert.issuer().to_string(),
        not_after: not_after
            .format(&well_known::Rfc3339)
            .unwrap_or_default(),
    })
}
