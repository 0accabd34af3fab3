//! Solver metrics
//!
//! Atomic counters and a fixed-size duration ring buffer for solve latency
//! percentiles. One [`Metrics`] instance lives in the application context and
//! is shared by reference; there is no process-global collector.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

/// Maximum number of duration samples kept for percentile calculation
const MAX_HISTOGRAM_SAMPLES: usize = 1000;

/// Metrics for the solving pipeline
#[derive(Debug)]
pub struct Metrics {
    /// Tasks accepted into the registry
    pub tasks_created: AtomicU64,
    /// Tasks that reached Ready
    pub tasks_solved: AtomicU64,
    /// Tasks that reached Failed
    pub tasks_failed: AtomicU64,
    /// Sessions opened by the pool over its lifetime
    pub sessions_opened: AtomicU64,
    /// Sessions currently open
    pub sessions_active: AtomicU32,
    /// Solve attempts started (across all tasks)
    pub attempts_total: AtomicU64,

    /// End-to-end solve durations for completed tasks
    solve_durations: RwLock<RingBuffer<Duration>>,
    /// Successful solves broken down by method tag
    solved_by_method: RwLock<HashMap<String, u64>>,
}

/// Memory-efficient ring buffer for histogram samples
#[derive(Debug)]
struct RingBuffer<T> {
    data: Vec<T>,
    capacity: usize,
    write_pos: usize,
}

impl<T: Clone + Ord> RingBuffer<T> {
    fn new(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            capacity,
            write_pos: 0,
        }
    }

    fn push(&mut self, value: T) {
        if self.data.len() < self.capacity {
            self.data.push(value);
        } else {
            self.data[self.write_pos] = value;
        }
        self.write_pos = (self.write_pos + 1) % self.capacity;
    }

    fn percentile(&self, p: f64) -> Option<T> {
        if self.data.is_empty() {
            return None;
        }
        let mut sorted = self.data.clone();
        sorted.sort();
        let idx = ((sorted.len() as f64 - 1.0) * p).round() as usize;
        sorted.get(idx).cloned()
    }
}

/// Point-in-time metrics snapshot, serializable for status reporting
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Tasks accepted
    pub tasks_created: u64,
    /// Tasks solved
    pub tasks_solved: u64,
    /// Tasks failed
    pub tasks_failed: u64,
    /// Sessions opened over the pool lifetime
    pub sessions_opened: u64,
    /// Sessions currently open
    pub sessions_active: u32,
    /// Attempts started
    pub attempts_total: u64,
    /// Median solve duration in milliseconds
    pub solve_p50_ms: Option<u64>,
    /// 95th percentile solve duration in milliseconds
    pub solve_p95_ms: Option<u64>,
    /// Successful solves per method tag
    pub solved_by_method: HashMap<String, u64>,
}

impl Metrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        Self {
            tasks_created: AtomicU64::new(0),
            tasks_solved: AtomicU64::new(0),
            tasks_failed: AtomicU64::new(0),
            sessions_opened: AtomicU64::new(0),
            sessions_active: AtomicU32::new(0),
            attempts_total: AtomicU64::new(0),
            solve_durations: RwLock::new(RingBuffer::new(MAX_HISTOGRAM_SAMPLES)),
            solved_by_method: RwLock::new(HashMap::new()),
        }
    }

    /// Record a task acceptance
    pub fn record_task_created(&self) {
        self.tasks_created.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful solve with its method tag and duration
    pub fn record_solved(&self, method: &str, duration: Duration) {
        self.tasks_solved.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut durations) = self.solve_durations.write() {
            durations.push(duration);
        }
        if let Ok(mut by_method) = self.solved_by_method.write() {
            *by_method.entry(method.to_string()).or_insert(0) += 1;
        }
    }

    /// Record a terminal failure
    pub fn record_failed(&self) {
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a solve attempt start
    pub fn record_attempt(&self) {
        self.attempts_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a session open
    pub fn session_opened(&self) {
        self.sessions_opened.fetch_add(1, Ordering::Relaxed);
        self.sessions_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a session close
    pub fn session_closed(&self) {
        self.sessions_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Take a serializable snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        let (p50, p95) = match self.solve_durations.read() {
            Ok(durations) => (
                durations.percentile(0.5).map(|d| d.as_millis() as u64),
                durations.percentile(0.95).map(|d| d.as_millis() as u64),
            ),
            Err(_) => (None, None),
        };

        MetricsSnapshot {
            tasks_created: self.tasks_created.load(Ordering::Relaxed),
            tasks_solved: self.tasks_solved.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            sessions_opened: self.sessions_opened.load(Ordering::Relaxed),
            sessions_active: self.sessions_active.load(Ordering::Relaxed),
            attempts_total: self.attempts_total.load(Ordering::Relaxed),
            solve_p50_ms: p50,
            solve_p95_ms: p95,
            solved_by_method: self
                .solved_by_method
                .read()
                .map(|m| m.clone())
                .unwrap_or_default(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = Metrics::new();

        metrics.record_task_created();
        metrics.record_solved("audio", Duration::from_millis(1200));
        metrics.record_failed();
        metrics.session_opened();
        metrics.session_closed();

        let snap = metrics.snapshot();
        assert_eq!(snap.tasks_created, 1);
        assert_eq!(snap.tasks_solved, 1);
        assert_eq!(snap.tasks_failed, 1);
        assert_eq!(snap.sessions_opened, 1);
        assert_eq!(snap.sessions_active, 0);
        assert_eq!(snap.solved_by_method.get("audio"), Some(&1));
    }

    #[test]
    fn test_percentiles_from_samples() {
        let metrics = Metrics::new();
        for ms in [100u64, 200, 300, 400, 500] {
            metrics.record_solved("image", Duration::from_millis(ms));
        }

        let snap = metrics.snapshot();
        assert_eq!(snap.solve_p50_ms, Some(300));
        assert_eq!(snap.solve_p95_ms, Some(500));
    }

    #[test]
    fn test_ring_buffer_wraps() {
        let mut ring = RingBuffer::new(3);
        for i in 0..10u32 {
            ring.push(i);
        }
        // Only the last 3 samples survive
        assert_eq!(ring.data.len(), 3);
        assert_eq!(ring.percentile(1.0), Some(9));
    }

    #[test]
    fn test_empty_percentiles() {
        let metrics = Metrics::new();
        let snap = metrics.snapshot();
        assert!(snap.solve_p50_ms.is_none());
        assert!(snap.solve_p95_ms.is_none());
    }
}
