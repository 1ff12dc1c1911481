use crate::types::{Endpoint, ProbeOutcome, ProbeReport, ResultPartition};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Lifecycle of one scan invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    Idle,
    Dispatching,
    Draining,
    Complete,
}

impl ScanPhase {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => ScanPhase::Dispatching,
            2 => ScanPhase::Draining,
            3 => ScanPhase::Complete,
            _ => ScanPhase::Idle,
        }
    }
}

/// Live counters, readable while a scan runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub recorded: u64,
    pub reachable: u64,
    pub phase: ScanPhase,
}

/// Concurrency-safe sink for probe outcomes.
///
/// Cloning yields another handle onto the same partition, so a caller can
/// keep one to watch progress while the scanner writes through another.
#[derive(Clone, Debug)]
pub struct ResultCollector {
    recorded: Arc<AtomicU64>,
    reachable: Arc<AtomicU64>,
    phase: Arc<AtomicU8>,
    partition: Arc<Mutex<ResultPartition>>,
}

impl ResultCollector {
    pub fn new() -> Self {
        Self {
            recorded: Arc::new(AtomicU64::new(0)),
            reachable: Arc::new(AtomicU64::new(0)),
            phase: Arc::new(AtomicU8::new(ScanPhase::Idle as u8)),
            partition: Arc::new(Mutex::new(ResultPartition::default())),
        }
    }

    /// Append `endpoint` to the set matching `outcome`.
    pub async fn record(&self, endpoint: Endpoint, outcome: ProbeOutcome) {
        {
            let mut guard = self.partition.lock().await;
            match outcome {
                ProbeOutcome::Reachable => guard.reachable.push(endpoint),
                ProbeOutcome::Unreachable => guard.unreachable.push(endpoint),
            }
        }
        if outcome == ProbeOutcome::Reachable {
            self.reachable.fetch_add(1, Ordering::Relaxed);
        }
        self.recorded.fetch_add(1, Ordering::Release);
    }

    pub async fn record_report(&self, report: &ProbeReport) {
        self.record(report.endpoint, report.outcome()).await;
    }

    /// Copy of the sets as they stand. Complete only once the scan is.
    pub async fn snapshot(&self) -> ResultPartition {
        self.partition.lock().await.clone()
    }

    /// Consume this handle and return the partition, cloning only if other
    /// handles are still alive.
    pub async fn into_partition(self) -> ResultPartition {
        match Arc::try_unwrap(self.partition) {
            Ok(mutex) => mutex.into_inner(),
            Err(shared) => shared.lock().await.clone(),
        }
    }

    pub fn progress(&self) -> Progress {
        Progress {
            recorded: self.recorded.load(Ordering::Acquire),
            reachable: self.reachable.load(Ordering::Relaxed),
            phase: self.phase(),
        }
    }

    pub fn phase(&self) -> ScanPhase {
        ScanPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub(crate) fn set_phase(&self, phase: ScanPhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }
}

impl Default for ResultCollector {
    fn default() -> Self {
        Self::new()
    }
}
