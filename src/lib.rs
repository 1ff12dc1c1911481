//! Library crate for reachscan: concurrent TCP reachability probing.
pub mod collector;
pub mod error;
pub mod http;
pub mod ports;
pub mod probe;
pub mod scanner;
pub mod targets;
pub mod types;

pub use collector::{Progress, ResultCollector, ScanPhase};
pub use error::ScanError;
pub use probe::{Prober, TcpProber};
pub use scanner::{scan, ScanConfig, Scanner};
pub use types::{Endpoint, FailureKind, ProbeOutcome, ProbeReport, ResultPartition, ScanReport, WorkList};
