use crate::error::{Result as ScanResult, ScanError};
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::ops::RangeInclusive;
use std::path::Path;

/// Ports scanned when the caller names none.
pub const DEFAULT_PORT_RANGE: RangeInclusive<u16> = 1..=1024;

/// Inclusive range of ports in ascending order.
///
/// Fails with `InvalidPortRange` if `end < start` or either bound is outside
/// 1..=65535.
pub fn port_range(start: u32, end: u32) -> ScanResult<Vec<u16>> {
    if start == 0 || end > 65535 || end < start {
        return Err(ScanError::InvalidPortRange { start, end });
    }
    Ok((start as u16..=end as u16).collect())
}

/// Check an explicit port list; order is kept as given.
pub fn validate_ports(ports: &[u32]) -> ScanResult<Vec<u16>> {
    ports
        .iter()
        .map(|&p| {
            if p == 0 || p > 65535 {
                Err(ScanError::InvalidPort(p.to_string()))
            } else {
                Ok(p as u16)
            }
        })
        .collect()
}

pub fn default_ports() -> Vec<u16> {
    DEFAULT_PORT_RANGE.collect()
}

/// Parse a ports spec into a deduplicated list of TCP ports (1..=65535).
///
/// Supported formats, per line or comma-separated item:
/// - single port number: `80`
/// - inclusive range: `8000-8010`
/// - comments: everything after `#` is ignored
/// - whitespace and blank lines are ignored
///
/// Ports keep the order of their first appearance.
pub fn parse_ports_str(s: &str) -> Result<Vec<u16>> {
    let mut out: Vec<u16> = Vec::new();
    let mut seen = HashSet::new();

    for (idx, raw_line) in s.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.split('#').next().map(str::trim).unwrap_or("");

        for item in line.split(',').map(str::trim).filter(|i| !i.is_empty()) {
            let ports = if let Some((a, b)) = item.split_once('-') {
                let start = parse_port_number(a.trim())
                    .with_context(|| format!("line {line_no}: invalid start in range: {a}"))?;
                let end = parse_port_number(b.trim())
                    .with_context(|| format!("line {line_no}: invalid end in range: {b}"))?;
                port_range(start, end).with_context(|| format!("line {line_no}: {item}"))?
            } else {
                let p = parse_port_number(item)
                    .with_context(|| format!("line {line_no}: invalid port value: {item}"))?;
                validate_ports(&[p]).with_context(|| format!("line {line_no}: {item}"))?
            };
            for p in ports {
                if seen.insert(p) {
                    out.push(p);
                }
            }
        }
    }

    Ok(out)
}

/// Load a ports list from a file path. Errors if the file cannot be read or parsed.
pub fn load_ports_from_path(path: impl AsRef<Path>) -> Result<Vec<u16>> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read ports file: {}", path.as_ref().display()))?;
    parse_ports_str(&content)
        .with_context(|| format!("failed to parse ports file: {}", path.as_ref().display()))
}

fn parse_port_number(s: &str) -> ScanResult<u32> {
    s.parse::<u32>()
        .map_err(|_| ScanError::InvalidPort(s.to_string()))
}
