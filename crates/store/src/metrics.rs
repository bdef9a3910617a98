//! Timing hooks around store and load calls.
//!
//! Each [`FileMetadataStore`](crate::FileMetadataStore) and
//! [`ChunkStore`](crate::ChunkStore) is handed a [`StoreMetrics`]
//! collaborator and wraps every backend call in a [`Timer`], from issue to
//! completion or failure.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::buffer::RingBuffer;

/// Number of recent latencies kept per operation.
const RECENT_SAMPLES: usize = 128;

/// Which record family an operation touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricTarget {
    Files,
    Chunks,
}

impl MetricTarget {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricTarget::Files => "files",
            MetricTarget::Chunks => "chunks",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricOp {
    Read,
    Write,
}

impl MetricOp {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricOp::Read => "read",
            MetricOp::Write => "write",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    Error,
}

/// Receives one sample per completed store or load call.
pub trait StoreMetrics: Send + Sync + 'static {
    fn record(&self, target: MetricTarget, op: MetricOp, outcome: Outcome, elapsed: Duration);
}

/// Discards every sample.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl StoreMetrics for NoopMetrics {
    fn record(&self, _: MetricTarget, _: MetricOp, _: Outcome, _: Duration) {}
}

/// Measures one call. Consumed by [`stop`](Self::stop) or
/// [`error`](Self::error); a timer dropped before either records nothing.
pub struct Timer {
    metrics: Arc<dyn StoreMetrics>,
    target: MetricTarget,
    op: MetricOp,
    started: Instant,
}

impl Timer {
    pub fn start(metrics: &Arc<dyn StoreMetrics>, target: MetricTarget, op: MetricOp) -> Self {
        Self {
            metrics: Arc::clone(metrics),
            target,
            op,
            started: Instant::now(),
        }
    }

    pub fn stop(self) {
        self.finish(Outcome::Ok);
    }

    pub fn error(self) {
        self.finish(Outcome::Error);
    }

    /// Records `Ok` or `Error` according to `result`.
    pub fn observe<T, E>(self, result: &Result<T, E>) {
        match result {
            Ok(_) => self.stop(),
            Err(_) => self.error(),
        }
    }

    fn finish(self, outcome: Outcome) {
        self.metrics
            .record(self.target, self.op, outcome, self.started.elapsed());
    }
}

#[derive(Debug, Clone)]
struct OpStats {
    count: u64,
    errors: u64,
    total: Duration,
    recent: RingBuffer<Duration>,
}

impl Default for OpStats {
    fn default() -> Self {
        Self {
            count: 0,
            errors: 0,
            total: Duration::ZERO,
            recent: RingBuffer::new(RECENT_SAMPLES),
        }
    }
}

/// Point-in-time view of one operation's counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpSnapshot {
    /// `files.read`, `chunks.write`, ...
    pub name: String,
    pub count: u64,
    pub errors: u64,
    pub mean_micros: u64,
    /// Slowest of the recent samples.
    pub recent_max_micros: u64,
}

/// Aggregates samples in memory.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    stats: Mutex<HashMap<(MetricTarget, MetricOp), OpStats>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters for every operation seen so far, sorted by name.
    pub fn snapshot(&self) -> Vec<OpSnapshot> {
        let stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<OpSnapshot> = stats
            .iter()
            .map(|((target, op), s)| {
                let mean = if s.count == 0 {
                    Duration::ZERO
                } else {
                    s.total / s.count as u32
                };
                let recent_max = s.recent.iter().max().copied().unwrap_or_default();
                OpSnapshot {
                    name: format!("{}.{}", target.as_str(), op.as_str()),
                    count: s.count,
                    errors: s.errors,
                    mean_micros: mean.as_micros() as u64,
                    recent_max_micros: recent_max.as_micros() as u64,
                }
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Calls recorded for one operation, successful or not.
    pub fn count(&self, target: MetricTarget, op: MetricOp) -> u64 {
        let stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        stats.get(&(target, op)).map_or(0, |s| s.count)
    }

    pub fn errors(&self, target: MetricTarget, op: MetricOp) -> u64 {
        let stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        stats.get(&(target, op)).map_or(0, |s| s.errors)
    }
}

impl StoreMetrics for InMemoryMetrics {
    fn record(&self, target: MetricTarget, op: MetricOp, outcome: Outcome, elapsed: Duration) {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        let s = stats.entry((target, op)).or_default();
        s.count += 1;
        if outcome == Outcome::Error {
            s.errors += 1;
        }
        s.total += elapsed;
        s.recent.push(elapsed);
    }
}
