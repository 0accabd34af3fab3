//! Persistent browser process records
//!
//! A process is expensive to create and lives for the pool's lifetime; the
//! sessions it hosts are cheap and ephemeral. Each record carries its own
//! lock so sessions can be created concurrently on *different* processes
//! while counter updates on any single process stay serialized.

use crate::driver::{ProcessHandle, SessionHandle, SessionOptions};
use crate::error::Result;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::debug;

/// One persistent browser process owned by the pool
pub struct BrowserProcess {
    /// Stable id within the pool
    pub id: usize,
    handle: Box<dyn ProcessHandle>,
    launched_at: Instant,
    /// Fine-grained lock: session creation and counter mutation happen under
    /// this, never under any pool-wide lock.
    lock: Mutex<()>,
    active: AtomicUsize,
    served: AtomicU64,
}

impl BrowserProcess {
    /// Wrap a freshly launched process handle
    pub fn new(id: usize, handle: Box<dyn ProcessHandle>) -> Self {
        Self {
            id,
            handle,
            launched_at: Instant::now(),
            lock: Mutex::new(()),
            active: AtomicUsize::new(0),
            served: AtomicU64::new(0),
        }
    }

    /// Sessions currently hosted here
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Sessions ever hosted here
    pub fn served(&self) -> u64 {
        self.served.load(Ordering::Relaxed)
    }

    /// Create an isolated session on this process and count it.
    pub async fn create_session(&self, opts: SessionOptions) -> Result<Box<dyn SessionHandle>> {
        let _guard = self.lock.lock().await;
        let session = self.handle.new_session(opts).await?;
        self.active.fetch_add(1, Ordering::Release);
        self.served.fetch_add(1, Ordering::Relaxed);
        debug!(process = self.id, active = self.active(), "session created");
        Ok(session)
    }

    /// Record that one of this process's sessions was closed.
    pub async fn note_released(&self) {
        let _guard = self.lock.lock().await;
        let _ = self
            .active
            .fetch_update(Ordering::Release, Ordering::Acquire, |v| {
                Some(v.saturating_sub(1))
            });
    }

    /// Force-close the underlying process
    pub async fn close(&self) -> Result<()> {
        self.handle.close().await
    }

    /// Snapshot for status reporting
    pub fn stats(&self) -> ProcessStats {
        ProcessStats {
            id: self.id,
            active_sessions: self.active(),
            total_served: self.served(),
            uptime_secs: self.launched_at.elapsed().as_secs(),
        }
    }
}

/// Per-process statistics
#[derive(Debug, Clone, Serialize)]
pub struct ProcessStats {
    /// Process id within the pool
    pub id: usize,
    /// Sessions currently hosted
    pub active_sessions: usize,
    /// Sessions ever hosted
    pub total_served: u64,
    /// Seconds since launch
    pub uptime_secs: u64,
}
