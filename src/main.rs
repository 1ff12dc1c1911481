use std::fs::File;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reachscan::scanner::DEFAULT_CONCURRENCY;
use reachscan::targets::{self, SubnetHosts};
use reachscan::types::{ScanReport, WorkList};
use reachscan::{http, ports, ScanConfig, Scanner};

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Discovery refuses subnets with more hosts than this.
const MAX_DISCOVERY_HOSTS: u128 = 1 << 16;

/// reachscan — concurrent TCP reachability prober.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "reachscan",
    version,
    about = "Concurrent TCP reachability prober: port scans of one host, host discovery across a subnet.",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Max concurrent TCP connect attempts.
    #[arg(long, global = true, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Per-attempt timeout in milliseconds (default 1000 for scans, 10000 for `http`).
    #[arg(long = "timeout-ms", global = true, value_parser = clap::value_parser!(u64).range(1..))]
    timeout_ms: Option<u64>,

    /// Stop the whole scan after this many milliseconds; unresolved endpoints count as unreachable.
    #[arg(long = "deadline-ms", global = true)]
    deadline_ms: Option<u64>,

    /// Write results as pretty JSON to this path (optional).
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    /// More log output (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Only errors on stderr.
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Scan a port list on one host.
    Ports {
        /// IP address or host name.
        #[arg(long)]
        host: String,

        /// Ports, e.g. `22,80,8000-8010` (default 1-1024).
        #[arg(long, conflicts_with = "ports_file")]
        ports: Option<String>,

        /// Path to ports list file (one port or range per line).
        #[arg(long = "ports-file")]
        ports_file: Option<PathBuf>,
    },
    /// Find hosts in a subnet that accept connections on one port.
    Discover {
        /// CIDR such as 192.168.1.0/24. If omitted, the local IPv4 /24 networks are scanned.
        #[arg(long)]
        subnet: Option<String>,

        #[arg(long, default_value_t = 80)]
        port: u16,
    },
    /// Issue `GET /` to a host and print the response.
    Http {
        #[arg(long)]
        host: String,

        #[arg(long, default_value_t = 80)]
        port: u16,

        /// Speak TLS (certificate checks disabled).
        #[arg(long)]
        tls: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    match &cli.command {
        Command::Ports {
            host,
            ports: spec,
            ports_file,
        } => {
            let ip = targets::resolve_host(host).await?;
            let port_list = match (spec, ports_file) {
                (Some(spec), _) => ports::parse_ports_str(spec)?,
                (None, Some(path)) => ports::load_ports_from_path(path)?,
                (None, None) => ports::default_ports(),
            };
            if port_list.is_empty() {
                bail!("no ports to scan");
            }
            let work = WorkList::ports_on_host(ip, &port_list);
            let report = run_scan(&cli, &work).await;

            println!("Open ports: {:?}", report.partition.reachable_ports());
            println!("Closed ports: {:?}", report.partition.unreachable_ports());
            print_summary(&report);
            write_output(&cli, &report);
        }
        Command::Discover { subnet, port } => {
            ports::validate_ports(&[u32::from(*port)])?;
            let nets = match subnet {
                Some(s) => vec![SubnetHosts::parse(s)?],
                None => {
                    let detected = targets::detect_local_cidrs()?;
                    if detected.is_empty() {
                        bail!("no local IPv4 networks detected; pass --subnet");
                    }
                    detected.into_iter().map(SubnetHosts::new).collect()
                }
            };
            let host_total = nets
                .iter()
                .fold(0u128, |acc, n| acc.saturating_add(n.host_count()));
            for net in &nets {
                info!(network = %net.network(), hosts = net.host_count(), "discovery target");
            }
            if host_total > MAX_DISCOVERY_HOSTS {
                bail!("{host_total} hosts exceed the discovery limit of {MAX_DISCOVERY_HOSTS}");
            }

            let hosts = nets.iter().flat_map(SubnetHosts::iter);
            let work = WorkList::hosts_on_port(hosts, *port);
            let report = run_scan(&cli, &work).await;

            println!("Discovered hosts: {}", join_hosts(&report.partition.reachable_hosts()));
            println!("Failed hosts: {}", join_hosts(&report.partition.unreachable_hosts()));
            print_summary(&report);
            write_output(&cli, &report);
        }
        Command::Http { host, port, tls } => {
            let timeout = Duration::from_millis(cli.timeout_ms.unwrap_or(10_000));
            let dump = http::fetch_root(host, *port, *tls, timeout).await?;
            println!("{dump}");
            write_output(&cli, &dump);
        }
    }

    Ok(())
}

fn init_logging(cli: &Cli) {
    let level = if cli.quiet {
        LevelFilter::ERROR
    } else {
        match cli.verbose {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(filter),
        )
        .init();
}

async fn run_scan(cli: &Cli, work: &WorkList) -> ScanReport {
    let timeout = Duration::from_millis(cli.timeout_ms.unwrap_or(1_000));
    let mut config = ScanConfig::new(timeout, cli.concurrency);
    if let Some(ms) = cli.deadline_ms {
        config = config.with_deadline(Duration::from_millis(ms));
    }
    info!(
        endpoints = work.len(),
        concurrency = config.effective_concurrency(),
        timeout_ms = timeout.as_millis() as u64,
        deadline_ms = cli.deadline_ms,
        "configuration"
    );

    // Ctrl-C cancels the scan; whatever is unresolved is reported unreachable.
    let cancel = CancellationToken::new();
    let cancel_ctrlc = cancel.clone();
    let ctrlc = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_ctrlc.cancel();
        }
    });

    let report = Scanner::new(config).scan_with_cancel(work, cancel).await;
    ctrlc.abort();
    report
}

fn print_summary(report: &ScanReport) {
    let p = &report.partition;
    println!(
        "\nReachable: {}  Unreachable: {}  (scanned: {}, {} ms{})",
        p.reachable.len(),
        p.unreachable.len(),
        report.scanned_total,
        report.elapsed_ms,
        if report.cancelled { ", cancelled" } else { "" }
    );
}

fn join_hosts(hosts: &[IpAddr]) -> String {
    let list: Vec<String> = hosts.iter().map(IpAddr::to_string).collect();
    format!("[{}]", list.join(", "))
}

fn write_output<T: Serialize>(cli: &Cli, value: &T) {
    if let Some(path) = cli.output.as_deref() {
        match write_json(path, value) {
            Ok(()) => info!(path = %path.display(), "wrote JSON results"),
            Err(e) => warn!("failed to write JSON to {}: {e:#}", path.display()),
        }
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
    serde_json::to_writer_pretty(file, value)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_timeout_is_rejected() {
        let parsed = Cli::try_parse_from(["reachscan", "--timeout-ms", "0", "ports", "--host", "127.0.0.1"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn positive_timeout_is_accepted() {
        let cli = Cli::try_parse_from(["reachscan", "ports", "--host", "127.0.0.1", "--timeout-ms", "250"]).unwrap();
        assert_eq!(cli.timeout_ms, Some(250));
    }
}
