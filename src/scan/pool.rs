//! Bounded worker pool
//!
//! OS threads fed chunks of work over channels. Timeouts are cooperative:
//! each item gets a deadline its processing function is expected to check
//! at safe points, and results arriving past the deadline are discarded as
//! timeouts. A panicking item is isolated per chunk; a worker that keeps
//! panicking past the respawn budget exits and the rest of the pool
//! carries on.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::core::error::{NullVoidError, Result};

/// Panics tolerated per worker before it stops picking up chunks.
const RESPAWN_LIMIT: u32 = 3;
/// Chunks-per-worker the chunk size tuner aims for.
const TARGET_CHUNKS_PER_WORKER: usize = 3;
/// Reduce parallelism when available memory drops below this share.
const MEMORY_PRESSURE_FLOOR: f64 = 0.15;

/// Cooperative stop signal handed to item processors.
#[derive(Clone)]
pub struct ScanSignal {
    cancelled: Arc<AtomicBool>,
    deadline: Instant,
}

impl ScanSignal {
    /// True when the item should stop at the next safe point, either
    /// because the scan was cancelled or the item's deadline passed.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed) || Instant::now() >= self.deadline
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Scan-wide cancellation handle.
#[derive(Clone, Default)]
pub struct CancelFlag {
    inner: Arc<AtomicBool>,
}

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.load(Ordering::Relaxed)
    }
}

/// Pool configuration, resolved from `DetectorConfig`.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_workers: usize,
    pub chunk_size: usize,
    pub timeout_per_item: Duration,
    pub retry_attempts: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let detector = crate::config::DetectorConfig::default();
        Self {
            max_workers: detector.max_workers,
            chunk_size: detector.chunk_size,
            timeout_per_item: detector.timeout_per_item,
            retry_attempts: detector.retry_attempts,
        }
    }
}

/// Per-scan execution metrics.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolMetrics {
    pub total_items: usize,
    pub processed_items: usize,
    pub failed_items: usize,
    pub average_item_ms: f64,
    /// `Σ work_ms / elapsed_ms / workers`, in [0, 1] under normal load.
    pub worker_utilization: f64,
    pub workers: usize,
}

type Chunk<T> = Vec<(usize, T)>;

/// Outcome per submitted item, in submission order.
pub type ItemResults<R> = Vec<(usize, Result<R>)>;

/// Run `items` through `process` on a bounded pool.
///
/// Results come back per item; a failed or timed-out item never poisons
/// its siblings. When the cancel flag flips, in-flight items stop at their
/// next safe point and pending chunks are dropped.
pub fn run_parallel<T, R>(
    items: Vec<T>,
    config: &PoolConfig,
    cancel: &CancelFlag,
    process: impl Fn(&T, &ScanSignal) -> Result<R> + Send + Sync,
) -> (ItemResults<R>, PoolMetrics)
where
    T: Send + Sync,
    R: Send,
{
    let total_items = items.len();
    let workers = effective_workers(config.max_workers).max(1);
    let chunk_size = tune_chunk_size(total_items, workers, config.chunk_size);

    let mut metrics = PoolMetrics {
        total_items,
        workers,
        ..PoolMetrics::default()
    };
    if items.is_empty() {
        return (Vec::new(), metrics);
    }

    let (job_tx, job_rx): (Sender<Chunk<&T>>, Receiver<Chunk<&T>>) = unbounded();
    let (result_tx, result_rx) = unbounded::<(usize, Result<R>, u64)>();

    let mut chunk: Chunk<&T> = Vec::with_capacity(chunk_size);
    for (index, item) in items.iter().enumerate() {
        chunk.push((index, item));
        if chunk.len() == chunk_size {
            let _ = job_tx.send(std::mem::take(&mut chunk));
        }
    }
    if !chunk.is_empty() {
        let _ = job_tx.send(chunk);
    }
    drop(job_tx);

    let started = Instant::now();
    let work_ms = AtomicU64::new(0);
    let process = &process;
    let work_ms_ref = &work_ms;

    std::thread::scope(|scope| {
        for worker_id in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let cancel = cancel.clone();
            let timeout = config.timeout_per_item;
            let retries = config.retry_attempts;
            scope.spawn(move || {
                worker_loop(
                    worker_id, &job_rx, &result_tx, &cancel, timeout, retries, process,
                    work_ms_ref,
                );
            });
        }
        drop(result_tx);
    });

    let elapsed_ms = started.elapsed().as_millis().max(1) as u64;
    let mut results: ItemResults<R> = result_rx.into_iter().map(|(i, r, _)| (i, r)).collect();
    results.sort_by_key(|(index, _)| *index);

    metrics.processed_items = results.len();
    metrics.failed_items = results.iter().filter(|(_, r)| r.is_err()).count();
    let total_work = work_ms.load(Ordering::Relaxed);
    if metrics.processed_items > 0 {
        metrics.average_item_ms = total_work as f64 / metrics.processed_items as f64;
    }
    metrics.worker_utilization = total_work as f64 / elapsed_ms as f64 / workers as f64;

    (results, metrics)
}

#[allow(clippy::too_many_arguments)]
fn worker_loop<T, R>(
    worker_id: usize,
    jobs: &Receiver<Chunk<&T>>,
    results: &Sender<(usize, Result<R>, u64)>,
    cancel: &CancelFlag,
    timeout: Duration,
    retries: u32,
    process: &(impl Fn(&T, &ScanSignal) -> Result<R> + Send + Sync),
    work_ms: &AtomicU64,
) where
    T: Send + Sync,
    R: Send,
{
    let mut panics = 0u32;

    while let Ok(chunk) = jobs.recv() {
        if cancel.is_cancelled() {
            // Pending chunks are dropped, not reported.
            continue;
        }

        for (index, item) in chunk {
            if cancel.is_cancelled() {
                break;
            }

            let item_start = Instant::now();
            let outcome = run_item(item, timeout, retries, cancel, process, &mut panics);
            let spent = item_start.elapsed().as_millis() as u64;
            work_ms.fetch_add(spent, Ordering::Relaxed);

            let outcome = match outcome {
                Ok(value) if item_start.elapsed() <= timeout => Ok(value),
                Ok(_) => Err(NullVoidError::Timeout(timeout.as_millis() as u64)),
                Err(err) => Err(err),
            };
            let _ = results.send((index, outcome, spent));

            if panics > RESPAWN_LIMIT {
                tracing::error!(worker_id, "worker exceeded respawn budget, exiting");
                return;
            }
        }
    }
}

fn run_item<T, R>(
    item: &T,
    timeout: Duration,
    retries: u32,
    cancel: &CancelFlag,
    process: &(impl Fn(&T, &ScanSignal) -> Result<R> + Send + Sync),
    panics: &mut u32,
) -> Result<R>
where
    T: Send + Sync,
    R: Send,
{
    let mut attempt = 0u32;
    loop {
        let signal = ScanSignal {
            cancelled: Arc::clone(&cancel.inner),
            deadline: Instant::now() + timeout,
        };
        let run = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            process(item, &signal)
        }));
        match run {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => {
                if !err.is_retryable() || attempt >= retries || cancel.is_cancelled() {
                    return Err(err);
                }
                attempt += 1;
                tracing::debug!(attempt, error = %err, "retrying item");
            }
            Err(_) => {
                *panics += 1;
                return Err(NullVoidError::Other(
                    "worker recovered from panic while processing item".to_string(),
                ));
            }
        }
    }
}

/// Chunk size aiming at roughly three chunks per worker, bounded by
/// `[1, configured]`.
#[must_use]
pub fn tune_chunk_size(total_items: usize, workers: usize, configured: usize) -> usize {
    let configured = configured.max(1);
    if total_items == 0 {
        return configured;
    }
    let target = total_items.div_ceil(workers.max(1) * TARGET_CHUNKS_PER_WORKER);
    target.clamp(1, configured)
}

/// Worker count after memory-pressure adjustment.
#[must_use]
pub fn effective_workers(configured: usize) -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|v| v.get())
        .unwrap_or(1);
    let base = configured.min(cpus).max(1);
    match available_memory_share() {
        Some(share) if share < MEMORY_PRESSURE_FLOOR => {
            let reduced = (base / 2).max(1);
            tracing::warn!(share, reduced, "memory pressure, reducing parallelism");
            reduced
        }
        _ => base,
    }
}

/// `MemAvailable / MemTotal` from /proc/meminfo; `None` off Linux.
fn available_memory_share() -> Option<f64> {
    let content = std::fs::read_to_string("/proc/meminfo").ok()?;
    let mut total = None;
    let mut available = None;
    for line in content.lines() {
        if let Some(rest) = line.strip_prefix("MemTotal:") {
            total = parse_meminfo_kb(rest);
        } else if let Some(rest) = line.strip_prefix("MemAvailable:") {
            available = parse_meminfo_kb(rest);
        }
    }
    match (total, available) {
        (Some(total), Some(available)) if total > 0.0 => Some(available / total),
        _ => None,
    }
}

fn parse_meminfo_kb(rest: &str) -> Option<f64> {
    rest.trim()
        .split_whitespace()
        .next()
        .and_then(|v| v.parse::<f64>().ok())
}
