//! Application context
//!
//! One explicit process-wide context wires the pool, registry, ledger, and
//! orchestrator together; entry points receive it by reference instead of
//! reaching for ambient globals. The same state machine backs both
//! presentation modes: `submit` + polling, and `solve_blocking`.

use crate::browser::{BrowserPool, PoolStats};
use crate::config::{AppConfig, PrimaryMethod};
use crate::driver::BrowserDriver;
use crate::error::{Error, Result, TaskError};
use crate::inference::{AudioTranscriber, ImageClassifier};
use crate::ledger::{self, CreditLedger};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::registry::{RegistryStats, TaskRegistry, TaskResultView, TaskSpec, Transition, Variant};
use crate::solver::{AudioStrategy, ChallengeStrategy, ImageStrategy, SolverOrchestrator};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// How often `solve_blocking` re-checks the task state
const RESULT_POLL: Duration = Duration::from_millis(500);

/// Process-wide application context
pub struct App {
    config: AppConfig,
    pool: Arc<BrowserPool>,
    registry: Arc<TaskRegistry>,
    ledger: Arc<dyn CreditLedger>,
    orchestrator: Arc<SolverOrchestrator>,
    metrics: Arc<Metrics>,
}

impl App {
    /// Wire an application from its config and collaborators.
    pub fn new(
        config: AppConfig,
        driver: Arc<dyn BrowserDriver>,
        ledger: Arc<dyn CreditLedger>,
        transcriber: Arc<dyn AudioTranscriber>,
        classifier: Arc<dyn ImageClassifier>,
    ) -> Arc<Self> {
        let metrics = Arc::new(Metrics::new());
        let pool = Arc::new(BrowserPool::new(
            driver,
            config.pool.clone(),
            Arc::clone(&metrics),
        ));
        let registry = Arc::new(TaskRegistry::new(config.registry.clone()));

        let http = reqwest::Client::new();
        let audio: Arc<dyn ChallengeStrategy> = Arc::new(AudioStrategy::new(
            transcriber,
            http.clone(),
            config.solver.audio.clone(),
        ));
        let image: Arc<dyn ChallengeStrategy> = Arc::new(ImageStrategy::new(
            classifier,
            http,
            config.solver.image.clone(),
        ));
        let (primary, secondary) = match config.solver.primary_method {
            PrimaryMethod::Audio => (audio, image),
            PrimaryMethod::Image => (image, audio),
        };

        let orchestrator = Arc::new(SolverOrchestrator::new(
            Arc::clone(&pool),
            config.solver.clone(),
            config.pool.nav_timeout,
            primary,
            secondary,
            Arc::clone(&metrics),
        ));

        Arc::new(Self {
            config,
            pool,
            registry,
            ledger,
            orchestrator,
            metrics,
        })
    }

    /// Launch the browser processes. Must succeed before tasks are accepted.
    pub async fn initialize(&self) -> Result<()> {
        self.pool.initialize().await
    }

    /// Drain and close the pool.
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }

    /// Accept a task and start solving it in the background.
    ///
    /// Validation and authorization run before any record is created, so a
    /// rejected request never leaves a stray Pending task behind.
    #[instrument(skip(self, spec), fields(url = %spec.website_url, variant = %spec.variant))]
    pub async fn submit(self: &Arc<Self>, spec: TaskSpec) -> Result<Uuid> {
        spec.validate()?;
        let price = self.price_for(spec.variant);
        ledger::authorize(self.ledger.as_ref(), &spec.client_key, price).await?;

        let task = self.registry.create(spec)?;
        self.metrics.record_task_created();
        info!(task = %task.id, "task accepted");

        let app = Arc::clone(self);
        let id = task.id;
        tokio::spawn(async move {
            app.process(id).await;
        });

        Ok(id)
    }

    /// Polling presentation of a task's state.
    pub fn result(&self, id: Uuid) -> Result<TaskResultView> {
        self.registry.result_view(id)
    }

    /// Submit and wait for the terminal state.
    pub async fn solve_blocking(self: &Arc<Self>, spec: TaskSpec) -> Result<TaskResultView> {
        let id = self.submit(spec).await?;
        loop {
            tokio::time::sleep(RESULT_POLL).await;
            let task = self.registry.get(id)?;
            if task.status.is_terminal() {
                return self.registry.result_view(id);
            }
        }
    }

    /// Status snapshot across components
    pub async fn stats(&self) -> AppStats {
        AppStats {
            pool: self.pool.stats().await,
            registry: self.registry.stats(),
            metrics: self.metrics.snapshot(),
        }
    }

    /// Drive one task to its terminal state. Every exit path records a
    /// terminal transition: a task is never left stuck in Processing.
    async fn process(self: Arc<Self>, id: Uuid) {
        let task = match self.registry.get(id) {
            Ok(task) => task,
            Err(e) => {
                error!(task = %id, error = %e, "task vanished before processing");
                return;
            }
        };
        if let Err(e) = self.registry.update(id, Transition::Processing) {
            error!(task = %id, error = %e, "could not enter processing");
            return;
        }

        let started = Instant::now();
        match self.orchestrator.run(&task.spec).await {
            Ok(solution) => {
                let price = self.price_for(task.spec.variant);
                if let Err(e) = self.ledger.deduct(&task.spec.client_key, price).await {
                    warn!(task = %id, error = %e, "balance deduction failed after solve");
                }
                self.metrics
                    .record_solved(&solution.method, started.elapsed());
                let result = self.registry.update(
                    id,
                    Transition::Ready {
                        token: solution.token,
                        method: solution.method,
                        cost: price,
                        attempts: solution.attempts,
                    },
                );
                if let Err(e) = result {
                    error!(task = %id, error = %e, "could not record solution");
                }
            }
            Err(e) => {
                let attempts = match &e {
                    Error::Task(TaskError::Unsolvable { attempts }) => *attempts,
                    _ => 0,
                };
                let (code, message) = e.to_wire();
                self.metrics.record_failed();
                let result = self.registry.update(
                    id,
                    Transition::Failed {
                        code,
                        message,
                        attempts,
                    },
                );
                if let Err(e) = result {
                    error!(task = %id, error = %e, "could not record failure");
                }
            }
        }
    }

    fn price_for(&self, variant: Variant) -> f64 {
        match variant {
            Variant::Normal => self.config.pricing.normal,
            Variant::Invisible => self.config.pricing.invisible,
            Variant::Enterprise => self.config.pricing.enterprise,
        }
    }
}

/// Aggregated status snapshot
#[derive(Debug, Clone, Serialize)]
pub struct AppStats {
    /// Browser pool state
    pub pool: PoolStats,
    /// Task registry state
    pub registry: RegistryStats,
    /// Solving metrics
    pub metrics: MetricsSnapshot,
}
