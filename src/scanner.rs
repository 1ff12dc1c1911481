use crate::collector::{ResultCollector, ScanPhase};
use crate::probe::{Prober, TcpProber};
use crate::types::{Endpoint, FailureKind, ProbeOutcome, ProbeReport, ResultPartition, ScanReport, WorkList};
use ::time::{format_description::well_known, OffsetDateTime};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_CONCURRENCY: usize = 200;
pub const MAX_CONCURRENCY: usize = 5_000;

/// Knobs for one scan. The per-probe timeout applies to every endpoint; the
/// optional deadline bounds the scan as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanConfig {
    pub concurrency: usize,
    pub timeout: Duration,
    pub deadline: Option<Duration>,
}

impl ScanConfig {
    pub fn new(timeout: Duration, concurrency: usize) -> Self {
        Self {
            concurrency,
            timeout,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Concurrency actually used: clamped to `1..=MAX_CONCURRENCY`.
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.clamp(1, MAX_CONCURRENCY)
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), DEFAULT_CONCURRENCY)
    }
}

/// Scan `work` with plain TCP connects and return the partition.
///
/// Per-probe failures never surface here: they land in `unreachable`.
pub async fn scan(work: &WorkList, timeout: Duration, concurrency: usize) -> ResultPartition {
    Scanner::new(ScanConfig::new(timeout, concurrency))
        .scan(work)
        .await
        .partition
}

/// Drives a work list through a bounded pool of concurrent probes.
///
/// - A `Semaphore` with `concurrency` permits bounds in-flight probes; a permit
///   is taken before a task is spawned and held until its outcome is recorded.
/// - Every probe is wrapped in `tokio::time::timeout`, whatever the `Prober`.
/// - Each endpoint is recorded exactly once, including on cancellation.
#[derive(Debug)]
pub struct Scanner<P = TcpProber> {
    config: ScanConfig,
    prober: Arc<P>,
}

impl Scanner<TcpProber> {
    pub fn new(config: ScanConfig) -> Self {
        Self::with_prober(config, TcpProber::new(config.timeout))
    }
}

impl<P: Prober + 'static> Scanner<P> {
    pub fn with_prober(config: ScanConfig, prober: P) -> Self {
        Self {
            config,
            prober: Arc::new(prober),
        }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub async fn scan(&self, work: &WorkList) -> ScanReport {
        self.scan_with(work, CancellationToken::new(), ResultCollector::new())
            .await
    }

    /// Variant that accepts a `CancellationToken` to allow external cancellation.
    pub async fn scan_with_cancel(&self, work: &WorkList, cancel: CancellationToken) -> ScanReport {
        self.scan_with(work, cancel, ResultCollector::new()).await
    }

    /// Full form: caller supplies the token and a collector handle it can
    /// watch for progress.
    ///
    /// Once `cancel` fires (or the configured deadline passes) nothing new is
    /// dispatched, in-flight probes stop waiting, and every unresolved
    /// endpoint is recorded as unreachable.
    pub async fn scan_with(
        &self,
        work: &WorkList,
        cancel: CancellationToken,
        collector: ResultCollector,
    ) -> ScanReport {
        let started_at = now_rfc3339();
        let clock = Instant::now();
        let total = work.len();
        let concurrency = self.config.effective_concurrency();
        let timeout = self.config.timeout;

        info!(
            total,
            concurrency,
            timeout_ms = timeout.as_millis() as u64,
            "scan started"
        );

        // Child token: the deadline must not cancel the caller's token.
        let cancel = cancel.child_token();
        let deadline_task = self.config.deadline.map(|deadline| {
            let c = cancel.clone();
            tokio::spawn(async move {
                time::sleep(deadline).await;
                c.cancel();
            })
        });
        let cut_short = Arc::new(AtomicBool::new(false));

        collector.set_phase(ScanPhase::Dispatching);
        let sem = Arc::new(Semaphore::new(concurrency));
        let mut set = JoinSet::new();
        let mut owners: HashMap<task::Id, Endpoint> = HashMap::new();
        let mut dispatched = 0usize;

        for &endpoint in work.iter() {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = sem.clone().acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break,
                },
            };
            dispatched += 1;

            let prober = self.prober.clone();
            let collector = collector.clone();
            let cancel = cancel.clone();
            let cut_short = cut_short.clone();

            let handle = set.spawn(async move {
                let _permit = permit; // keep permit until the outcome is recorded

                let start = Instant::now();
                let report = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        cut_short.store(true, Ordering::Relaxed);
                        ProbeReport::unreachable(endpoint, FailureKind::TimedOut, elapsed_ms(start))
                    }
                    res = time::timeout(timeout, prober.probe(endpoint)) => match res {
                        Ok(report) => report,
                        Err(_elapsed) => {
                            ProbeReport::unreachable(endpoint, FailureKind::TimedOut, elapsed_ms(start))
                        }
                    },
                };
                collector.record_report(&report).await;
            });
            owners.insert(handle.id(), endpoint);
        }

        let undispatched = &work.as_slice()[dispatched..];
        if !undispatched.is_empty() {
            warn!(
                skipped = undispatched.len(),
                "scan cancelled; remaining endpoints counted as unreachable"
            );
            cut_short.store(true, Ordering::Relaxed);
            for &endpoint in undispatched {
                collector.record(endpoint, ProbeOutcome::Unreachable).await;
            }
        }

        collector.set_phase(ScanPhase::Draining);
        debug!(dispatched, in_flight = set.len(), "draining");
        // A task that panicked never recorded its endpoint.
        while let Some(res) = set.join_next().await {
            if let Err(e) = res {
                let endpoint = owners.get(&e.id()).copied();
                warn!(error = %e, endpoint = ?endpoint, "probe task failed");
                if let Some(endpoint) = endpoint {
                    collector.record(endpoint, ProbeOutcome::Unreachable).await;
                }
            }
        }

        if let Some(handle) = deadline_task {
            handle.abort();
        }

        collector.set_phase(ScanPhase::Complete);
        let partition = collector.into_partition().await;
        let elapsed_ms = clock.elapsed().as_millis() as u64;
        let cancelled = cut_short.load(Ordering::Relaxed);

        info!(
            reachable = partition.reachable.len(),
            unreachable = partition.unreachable.len(),
            elapsed_ms,
            cancelled,
            "scan complete"
        );

        ScanReport {
            scanned_total: total as u64,
            started_at,
            finished_at: now_rfc3339(),
            elapsed_ms,
            cancelled,
            partition,
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

fn now_rfc3339() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrency_is_clamped() {
        let cfg = ScanConfig::new(Duration::from_millis(10), 0);
        assert_eq!(cfg.effective_concurrency(), 1);
        let cfg = ScanConfig::new(Duration::from_millis(10), 1_000_000);
        assert_eq!(cfg.effective_concurrency(), MAX_CONCURRENCY);
    }

    #[test]
    fn default_config() {
        let cfg = ScanConfig::default();
        assert_eq!(cfg.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(cfg.timeout, Duration::from_secs(1));
        assert_eq!(cfg.deadline, None);
    }

    #[tokio::test]
    async fn empty_work_list_returns_empty_partition() {
        let report = Scanner::new(ScanConfig::default())
            .scan(&WorkList::default())
            .await;
        assert!(report.partition.is_empty());
        assert_eq!(report.scanned_total, 0);
        assert!(!report.cancelled);
    }
}
