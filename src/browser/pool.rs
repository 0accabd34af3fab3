//! Browser pool
//!
//! Multiplexes many ephemeral isolated sessions over a small set of
//! persistent browser processes. A pool-wide semaphore bounds total open
//! sessions; per-process locks keep counter updates fine-grained so sessions
//! can be created concurrently on different processes. Session creation is
//! one to two orders of magnitude cheaper than process launch, which is why
//! every acquisition rebalances onto the least-loaded process instead of
//! pinning callers anywhere.

use crate::browser::{BrowserProcess, Fingerprint, ProcessStats};
use crate::config::PoolConfig;
use crate::driver::{BrowserDriver, ProcessConfig, SessionHandle, SessionOptions};
use crate::error::{Error, PoolError, Result, SessionError};
use crate::metrics::Metrics;
use crate::proxy::ProxySpec;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedSemaphorePermit, RwLock, Semaphore};
use tracing::{debug, info, instrument, warn};

/// How often shutdown re-checks the active-session gauge while draining
const DRAIN_POLL: Duration = Duration::from_millis(500);

/// Pool of persistent browser processes hosting ephemeral sessions
pub struct BrowserPool {
    driver: Arc<dyn BrowserDriver>,
    config: PoolConfig,
    metrics: Arc<Metrics>,
    /// Which processes exist; written only at initialize/shutdown
    processes: RwLock<Vec<Arc<BrowserProcess>>>,
    /// The single pool-wide synchronization point gating total sessions
    limiter: Arc<Semaphore>,
    init_lock: Mutex<()>,
    initialized: AtomicBool,
    draining: AtomicBool,
    active_sessions: AtomicUsize,
    total_acquired: AtomicU64,
}

impl BrowserPool {
    /// Create an uninitialized pool
    pub fn new(driver: Arc<dyn BrowserDriver>, config: PoolConfig, metrics: Arc<Metrics>) -> Self {
        let capacity = config.capacity();
        Self {
            driver,
            config,
            metrics,
            processes: RwLock::new(Vec::new()),
            limiter: Arc::new(Semaphore::new(capacity)),
            init_lock: Mutex::new(()),
            initialized: AtomicBool::new(false),
            draining: AtomicBool::new(false),
            active_sessions: AtomicUsize::new(0),
            total_acquired: AtomicU64::new(0),
        }
    }

    /// Launch the configured number of browser processes concurrently.
    ///
    /// Individual launch failures are logged and tolerated; the pool proceeds
    /// with whatever launched. Zero successful launches aborts startup.
    /// Idempotent.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<()> {
        let _guard = self.init_lock.lock().await;
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }

        let process_config = ProcessConfig {
            headless: self.config.headless,
            sandbox: self.config.sandbox,
            chrome_path: self.config.chrome_path.clone(),
        };

        info!(
            processes = self.config.process_count,
            capacity = self.config.capacity(),
            headless = self.config.headless,
            "initializing browser pool"
        );

        let launches = (0..self.config.process_count)
            .map(|_| self.driver.launch(&process_config));
        let results = futures::future::join_all(launches).await;

        let mut processes = Vec::new();
        for (id, result) in results.into_iter().enumerate() {
            match result {
                Ok(handle) => processes.push(Arc::new(BrowserProcess::new(id, handle))),
                Err(e) => warn!(process = id, error = %e, "browser process failed to launch"),
            }
        }

        if processes.is_empty() {
            return Err(Error::Pool(PoolError::NoProcesses));
        }

        info!(launched = processes.len(), "browser pool ready");
        *self.processes.write().await = processes;
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    /// Acquire an isolated session, blocking while the pool is at capacity.
    pub async fn acquire(&self, proxy: Option<ProxySpec>) -> Result<Session> {
        self.acquire_with(proxy, None).await
    }

    /// Acquire with a caller-supplied user-agent override.
    #[instrument(skip(self, proxy, user_agent))]
    pub async fn acquire_with(
        &self,
        proxy: Option<ProxySpec>,
        user_agent: Option<String>,
    ) -> Result<Session> {
        if !self.initialized.load(Ordering::Acquire) {
            return Err(resource_exhausted("pool not initialized"));
        }
        if self.draining.load(Ordering::Acquire) {
            return Err(resource_exhausted("pool draining"));
        }

        let permit = Arc::clone(&self.limiter)
            .acquire_owned()
            .await
            .map_err(|_| resource_exhausted("pool closed"))?;

        // A shutdown may have started while we waited for a slot
        if self.draining.load(Ordering::Acquire) {
            return Err(resource_exhausted("pool draining"));
        }

        let process = self.least_loaded().await?;

        let mut fingerprint = Fingerprint::random();
        if let Some(ua) = user_agent {
            fingerprint = fingerprint.with_user_agent(ua);
        }

        let opts = SessionOptions {
            proxy: proxy.clone(),
            fingerprint: fingerprint.clone(),
        };
        let handle = process.create_session(opts).await.map_err(|e| match e {
            Error::Session(inner) => Error::Session(inner),
            other => Error::Session(SessionError::CreationFailed(other.to_string())),
        })?;

        self.active_sessions.fetch_add(1, Ordering::AcqRel);
        self.total_acquired.fetch_add(1, Ordering::Relaxed);
        self.metrics.session_opened();
        debug!(
            process = process.id,
            active = self.active_sessions.load(Ordering::Acquire),
            "session acquired"
        );

        Ok(Session {
            handle: Some(handle),
            process,
            fingerprint,
            proxy,
            _permit: permit,
        })
    }

    /// Close a session and free its concurrency slot.
    ///
    /// Must be called exactly once per acquired session on every exit path.
    /// Close failures are logged, never propagated: the slot and counters are
    /// reconciled regardless.
    #[instrument(skip(self, session))]
    pub async fn release(&self, mut session: Session) {
        let Some(handle) = session.handle.take() else {
            warn!("session released twice");
            return;
        };

        if let Err(e) = handle.close().await {
            warn!(error = %e, "error closing session");
        }

        session.process.note_released().await;
        let _ = self
            .active_sessions
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                Some(v.saturating_sub(1))
            });
        self.metrics.session_closed();
        debug!(
            process = session.process.id,
            active = self.active_sessions.load(Ordering::Acquire),
            "session released"
        );
        // Dropping `session` returns the semaphore permit
    }

    /// Drain and close the pool.
    ///
    /// New acquisitions fail immediately; in-flight sessions get a bounded
    /// grace period, after which every process is force-closed. Idempotent.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        if self.draining.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("shutting down browser pool");
        self.limiter.close();

        let deadline = tokio::time::Instant::now() + self.config.shutdown_grace;
        while self.active_sessions.load(Ordering::Acquire) > 0
            && tokio::time::Instant::now() < deadline
        {
            debug!(
                active = self.active_sessions.load(Ordering::Acquire),
                "waiting for active sessions to drain"
            );
            tokio::time::sleep(DRAIN_POLL).await;
        }

        let processes = {
            let mut guard = self.processes.write().await;
            std::mem::take(&mut *guard)
        };
        for process in &processes {
            if let Err(e) = process.close().await {
                warn!(process = process.id, error = %e, "error closing browser process");
            }
        }
        self.initialized.store(false, Ordering::Release);

        info!(
            total_acquired = self.total_acquired.load(Ordering::Relaxed),
            "browser pool closed"
        );
    }

    /// Sessions currently open pool-wide
    pub fn active_sessions(&self) -> usize {
        self.active_sessions.load(Ordering::Acquire)
    }

    /// Whether the pool has launched its processes
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Snapshot pool statistics
    pub async fn stats(&self) -> PoolStats {
        let processes = self.processes.read().await;
        PoolStats {
            initialized: self.initialized.load(Ordering::Acquire),
            draining: self.draining.load(Ordering::Acquire),
            process_count: processes.len(),
            capacity: self.config.capacity(),
            active_sessions: self.active_sessions.load(Ordering::Acquire),
            total_acquired: self.total_acquired.load(Ordering::Relaxed),
            processes: processes.iter().map(|p| p.stats()).collect(),
        }
    }

    /// Pick the process with the fewest active sessions (ties arbitrary)
    async fn least_loaded(&self) -> Result<Arc<BrowserProcess>> {
        let processes = self.processes.read().await;
        processes
            .iter()
            .min_by_key(|p| p.active())
            .cloned()
            .ok_or(Error::Pool(PoolError::NoProcesses))
    }
}

fn resource_exhausted(reason: &str) -> Error {
    Error::Pool(PoolError::ResourceExhausted(reason.to_string()))
}

/// One acquired isolated session.
///
/// Created only by [`BrowserPool::acquire`], destroyed only by
/// [`BrowserPool::release`]; never outlives a single solve attempt. The
/// concurrency permit rides inside, so even an orphaned session returns its
/// slot when dropped.
pub struct Session {
    handle: Option<Box<dyn SessionHandle>>,
    process: Arc<BrowserProcess>,
    fingerprint: Fingerprint,
    proxy: Option<ProxySpec>,
    _permit: OwnedSemaphorePermit,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("process", &self.process.id)
            .field("fingerprint", &self.fingerprint)
            .field("proxy", &self.proxy)
            .field("open", &self.handle.is_some())
            .finish()
    }
}

impl Session {
    /// Id of the hosting process
    pub fn process_id(&self) -> usize {
        self.process.id
    }

    /// Fingerprint applied to this session
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Proxy this session egresses through, if any
    pub fn proxy(&self) -> Option<&ProxySpec> {
        self.proxy.as_ref()
    }

    fn handle(&self) -> Result<&dyn SessionHandle> {
        self.handle
            .as_deref()
            .ok_or(Error::Session(SessionError::Closed))
    }

    /// Navigate and wait for readiness
    pub async fn navigate(&self, url: &str, timeout: Duration) -> Result<()> {
        self.handle()?.navigate(url, timeout).await
    }

    /// Whether a selector currently matches
    pub async fn exists(&self, selector: &str) -> Result<bool> {
        self.handle()?.exists(selector).await
    }

    /// Click the first match
    pub async fn click(&self, selector: &str) -> Result<()> {
        self.handle()?.click(selector).await
    }

    /// Type into the first match
    pub async fn fill(&self, selector: &str, text: &str) -> Result<()> {
        self.handle()?.fill(selector, text).await
    }

    /// Evaluate a script
    pub async fn evaluate(&self, script: &str) -> Result<Value> {
        self.handle()?.evaluate(script).await
    }

    /// Poll for a selector
    pub async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<bool> {
        self.handle()?.wait_for(selector, timeout).await
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.handle.is_some() {
            // The permit self-releases; the browser-side context is cleaned
            // up when its process closes. Still a discipline violation.
            warn!(
                process = self.process.id,
                "session dropped without release"
            );
        }
    }
}

/// Pool-wide statistics
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    /// Whether processes are launched
    pub initialized: bool,
    /// Whether shutdown has begun
    pub draining: bool,
    /// Live process count
    pub process_count: usize,
    /// Session capacity (processes x per-process ceiling)
    pub capacity: usize,
    /// Sessions currently open
    pub active_sessions: usize,
    /// Sessions handed out over the pool lifetime
    pub total_acquired: u64,
    /// Per-process breakdown
    pub processes: Vec<ProcessStats>,
}
