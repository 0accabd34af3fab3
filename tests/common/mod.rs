//! Shared test doubles: an in-memory browser driver with a scripted page
//! model, plus scripted strategies and inference collaborators.

#![allow(dead_code)]

use async_trait::async_trait;
use gatepass::browser::BrowserPool;
use gatepass::config::{PoolConfig, RegistryConfig, SolverConfig};
use gatepass::driver::{
    BrowserDriver, ProcessConfig, ProcessHandle, SessionHandle, SessionOptions,
};
use gatepass::error::{Error, PoolError, Result, SessionError};
use gatepass::inference::{AudioTranscriber, Classification, ImageClassifier};
use gatepass::metrics::Metrics;
use gatepass::proxy::ProxySpec;
use gatepass::registry::{TaskSpec, Variant};
use gatepass::solver::{ChallengeStrategy, StrategyOutcome};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Shared page/world model behind every fake session
#[derive(Default)]
pub struct SessionState {
    /// Sessions currently open across the fake driver
    pub active: AtomicUsize,
    /// High-water mark of simultaneously open sessions
    pub max_active: AtomicUsize,
    /// Sessions ever opened
    pub opened: AtomicUsize,
    /// Sessions closed
    pub closed: AtomicUsize,

    /// Whether the widget reports the solved state
    pub solved: AtomicBool,
    /// Token surfaced once solved
    pub token: Mutex<Option<String>>,
    /// Token observable through the capture hook
    pub captured_token: Mutex<Option<String>>,
    /// Whether the challenge surface is showing
    pub challenge_visible: AtomicBool,
    /// Whether the provider shows the throttle page
    pub rate_limited: AtomicBool,
    /// Instruction text popped once per image round
    pub instructions: Mutex<VecDeque<String>>,
    /// Tile grid returned to the image strategy
    pub tiles: Mutex<Vec<(usize, String)>>,
    /// Verify clicks observed
    pub verify_clicks: AtomicUsize,
    /// Flip `solved` once this many verify clicks happen (0 = never)
    pub solve_after_verifies: AtomicUsize,
    /// Artificial session-creation latency
    pub session_delay: Mutex<Duration>,
}

impl SessionState {
    pub fn new() -> Arc<Self> {
        let state = Self::default();
        *state.token.lock() = Some("tok-fake".to_string());
        Arc::new(state)
    }

    /// A state where a challenge is showing and nothing is solved yet
    pub fn with_challenge() -> Arc<Self> {
        let state = Self::new();
        state.challenge_visible.store(true, Ordering::SeqCst);
        state
    }

    pub fn mark_solved(&self) {
        self.solved.store(true, Ordering::SeqCst);
    }
}

/// Fake [`BrowserDriver`]: launches fake processes hosting fake sessions
pub struct FakeDriver {
    pub state: Arc<SessionState>,
    /// Fail this many launches before succeeding
    pub fail_launches: AtomicUsize,
    /// Launches attempted
    pub launches: AtomicUsize,
}

impl FakeDriver {
    pub fn new(state: Arc<SessionState>) -> Arc<Self> {
        Arc::new(Self {
            state,
            fail_launches: AtomicUsize::new(0),
            launches: AtomicUsize::new(0),
        })
    }

    pub fn failing_first(state: Arc<SessionState>, count: usize) -> Arc<Self> {
        let driver = Self::new(state);
        driver.fail_launches.store(count, Ordering::SeqCst);
        driver
    }
}

#[async_trait]
impl BrowserDriver for FakeDriver {
    async fn launch(&self, _config: &ProcessConfig) -> Result<Box<dyn ProcessHandle>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        let remaining = self.fail_launches.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_launches.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::Pool(PoolError::LaunchFailed("scripted".into())));
        }
        Ok(Box::new(FakeProcess {
            state: Arc::clone(&self.state),
        }))
    }
}

pub struct FakeProcess {
    state: Arc<SessionState>,
}

#[async_trait]
impl ProcessHandle for FakeProcess {
    async fn new_session(&self, _opts: SessionOptions) -> Result<Box<dyn SessionHandle>> {
        let delay = *self.state.session_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let active = self.state.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_active.fetch_max(active, Ordering::SeqCst);
        self.state.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            state: Arc::clone(&self.state),
            open: AtomicBool::new(true),
        }))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

pub struct FakeSession {
    state: Arc<SessionState>,
    open: AtomicBool,
}

#[async_trait]
impl SessionHandle for FakeSession {
    async fn navigate(&self, _url: &str, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    async fn exists(&self, selector: &str) -> Result<bool> {
        Ok(match selector {
            s if s.contains("anchor") => true,
            s if s.contains("bframe") => self.state.challenge_visible.load(Ordering::SeqCst),
            "#recaptcha-audio-button" | "#recaptcha-verify-button" | "#recaptcha-reload-button" => {
                true
            }
            _ => false,
        })
    }

    async fn click(&self, selector: &str) -> Result<()> {
        if selector == "#recaptcha-verify-button" {
            let clicks = self.state.verify_clicks.fetch_add(1, Ordering::SeqCst) + 1;
            let threshold = self.state.solve_after_verifies.load(Ordering::SeqCst);
            if threshold > 0 && clicks >= threshold {
                self.state.mark_solved();
            }
        }
        Ok(())
    }

    async fn fill(&self, _selector: &str, _text: &str) -> Result<()> {
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        let state = &self.state;
        // Dispatch on distinctive markers of the widget scripts
        if script.contains("recaptcha-checkbox-checked") {
            return Ok(Value::Bool(state.solved.load(Ordering::SeqCst)));
        }
        if script.contains("g-recaptcha-response") {
            if state.solved.load(Ordering::SeqCst) {
                if let Some(token) = state.token.lock().clone() {
                    return Ok(Value::String(token));
                }
            }
            return Ok(Value::Null);
        }
        if script.starts_with("window.__gpCapturedToken") {
            return Ok(state
                .captured_token
                .lock()
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null));
        }
        if script.contains("setInterval") {
            return Ok(Value::Null);
        }
        if script.contains("(async") {
            return Ok(Value::Bool(true));
        }
        if script.contains("rc-doscaptcha") {
            return Ok(Value::Bool(state.rate_limited.load(Ordering::SeqCst)));
        }
        if script.contains("rc-imageselect-desc") {
            return Ok(state
                .instructions
                .lock()
                .pop_front()
                .map(Value::String)
                .unwrap_or(Value::Null));
        }
        if script.contains("rc-imageselect-tile") && script.contains("out.push") {
            let tiles: Vec<Value> = state
                .tiles
                .lock()
                .iter()
                .map(|(i, src)| json!({ "i": i, "src": src }))
                .collect();
            return Ok(Value::Array(tiles));
        }
        Ok(Value::Null)
    }

    async fn wait_for(&self, selector: &str, _timeout: Duration) -> Result<bool> {
        self.exists(selector).await
    }

    async fn close(&self) -> Result<()> {
        if !self.open.swap(false, Ordering::SeqCst) {
            return Err(Error::Session(SessionError::Closed));
        }
        self.state.active.fetch_sub(1, Ordering::SeqCst);
        self.state.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Strategy returning a scripted sequence of outcomes, one per invocation
pub struct ScriptedStrategy {
    name: &'static str,
    outcomes: Mutex<VecDeque<StrategyOutcome>>,
    pub calls: AtomicUsize,
    state: Arc<SessionState>,
}

impl ScriptedStrategy {
    pub fn new(
        name: &'static str,
        state: Arc<SessionState>,
        outcomes: Vec<StrategyOutcome>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name,
            outcomes: Mutex::new(outcomes.into()),
            calls: AtomicUsize::new(0),
            state,
        })
    }

    /// A strategy that fails on every invocation
    pub fn always_failing(name: &'static str, state: Arc<SessionState>) -> Arc<Self> {
        Self::new(name, state, Vec::new())
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChallengeStrategy for ScriptedStrategy {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn run(&self, _session: &gatepass::Session) -> StrategyOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .outcomes
            .lock()
            .pop_front()
            .unwrap_or(StrategyOutcome::Failed("scripted exhausted".into()));
        if outcome == StrategyOutcome::Solved {
            self.state.mark_solved();
        }
        outcome
    }
}

/// Classifier recording every label it was asked about
#[derive(Default)]
pub struct RecordingClassifier {
    pub labels: Mutex<Vec<String>>,
    pub matches: bool,
}

impl RecordingClassifier {
    pub fn matching() -> Arc<Self> {
        Arc::new(Self {
            labels: Mutex::new(Vec::new()),
            matches: true,
        })
    }
}

impl ImageClassifier for RecordingClassifier {
    fn classify(&self, _tile: &[u8], label: &str) -> Result<Classification> {
        self.labels.lock().push(label.to_string());
        Ok(Classification {
            matches: self.matches,
            confidence: 0.9,
        })
    }
}

/// Transcriber returning a fixed answer
pub struct FixedTranscriber(pub Option<String>);

impl AudioTranscriber for FixedTranscriber {
    fn transcribe(&self, _audio: &[u8]) -> Result<Option<String>> {
        Ok(self.0.clone())
    }
}

/// Pool with tiny timeouts suitable for tests
pub fn test_pool(
    state: &Arc<SessionState>,
    process_count: usize,
    max_sessions_per_process: usize,
) -> Arc<BrowserPool> {
    let config = PoolConfig::builder()
        .process_count(process_count)
        .max_sessions_per_process(max_sessions_per_process)
        .shutdown_grace(Duration::from_millis(200))
        .build();
    Arc::new(BrowserPool::new(
        FakeDriver::new(Arc::clone(state)),
        config,
        Arc::new(Metrics::new()),
    ))
}

/// Solver config with short waits for scripted sessions
pub fn test_solver_config(max_retries: u32) -> SolverConfig {
    SolverConfig::builder()
        .max_retries(max_retries)
        .challenge_wait(Duration::from_millis(100))
        .trigger_settle(Duration::from_millis(10))
        .attempt_timeout(Duration::from_secs(60))
        .build()
}

/// Registry config with a short TTL
pub fn test_registry_config(capacity: usize, ttl: Duration) -> RegistryConfig {
    RegistryConfig {
        capacity,
        task_ttl: ttl,
    }
}

/// A well-formed task spec
pub fn task_spec(variant: Variant) -> TaskSpec {
    TaskSpec {
        website_url: "https://example.com/signup".into(),
        site_key: "6Le-test-key".into(),
        variant,
        proxy: None,
        user_agent: None,
        cookies: None,
        action: None,
        enterprise_payload: None,
        client_key: "client-key".into(),
    }
}

/// A task spec carrying a proxy
pub fn task_spec_with_proxy(variant: Variant) -> TaskSpec {
    let mut spec = task_spec(variant);
    spec.proxy = Some(ProxySpec::parse("10.1.2.3:8080").unwrap());
    spec
}
