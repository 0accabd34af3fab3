//! Component configuration
//!
//! Each component carries its own config struct with sensible defaults and a
//! builder. The CLI (or an embedding service) assembles an [`AppConfig`] and
//! hands it to [`crate::app::App`]; nothing reads ambient global state.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which solving strategy runs first when a challenge appears
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimaryMethod {
    /// Audio transcription first, image classification as fallback
    Audio,
    /// Image classification first, audio transcription as fallback
    Image,
}

/// Configuration for the browser process pool
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of persistent browser processes launched at startup
    pub process_count: usize,
    /// Maximum concurrent sessions hosted per process
    pub max_sessions_per_process: usize,
    /// Run browsers headless (default: true)
    pub headless: bool,
    /// Enable the Chromium sandbox (disable for containers)
    pub sandbox: bool,
    /// Path to a Chrome/Chromium executable (None = auto-detect)
    pub chrome_path: Option<String>,
    /// Navigation timeout applied per `navigate` call
    pub nav_timeout: Duration,
    /// How long `shutdown` waits for in-flight sessions before force-closing
    pub shutdown_grace: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            process_count: 4,
            max_sessions_per_process: 10,
            headless: true,
            sandbox: true,
            chrome_path: None,
            nav_timeout: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl PoolConfig {
    /// Create a new config builder
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::default()
    }

    /// Pool-wide session capacity (the global concurrency bound)
    pub fn capacity(&self) -> usize {
        self.process_count * self.max_sessions_per_process
    }
}

/// Builder for [`PoolConfig`]
#[derive(Default)]
pub struct PoolConfigBuilder {
    config: PoolConfig,
}

impl PoolConfigBuilder {
    /// Set the number of browser processes
    pub fn process_count(mut self, count: usize) -> Self {
        self.config.process_count = count;
        self
    }

    /// Set the per-process session ceiling
    pub fn max_sessions_per_process(mut self, max: usize) -> Self {
        self.config.max_sessions_per_process = max;
        self
    }

    /// Set headless mode
    pub fn headless(mut self, headless: bool) -> Self {
        self.config.headless = headless;
        self
    }

    /// Enable/disable sandbox
    pub fn sandbox(mut self, sandbox: bool) -> Self {
        self.config.sandbox = sandbox;
        self
    }

    /// Set Chrome executable path
    pub fn chrome_path<S: Into<String>>(mut self, path: S) -> Self {
        self.config.chrome_path = Some(path.into());
        self
    }

    /// Set navigation timeout
    pub fn nav_timeout(mut self, timeout: Duration) -> Self {
        self.config.nav_timeout = timeout;
        self
    }

    /// Set shutdown grace period
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.config.shutdown_grace = grace;
        self
    }

    /// Build the config
    pub fn build(self) -> PoolConfig {
        self.config
    }
}

/// Configuration for the audio strategy
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Sub-attempts (fresh clips) before the strategy gives up
    pub max_attempts: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self { max_attempts: 5 }
    }
}

/// Configuration for the image strategy
#[derive(Debug, Clone)]
pub struct ImageConfig {
    /// Maximum challenge rounds before the strategy gives up
    pub max_rounds: u32,
    /// Classifier confidence below which a tile is not selected
    pub min_confidence: f32,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_rounds: 8,
            min_confidence: 0.5,
        }
    }
}

/// Configuration for the solve orchestrator
#[derive(Debug, Clone)]
pub struct SolverConfig {
    /// Outer attempt budget; exhausting it is a terminal failure
    pub max_retries: u32,
    /// Strategy tried first when a challenge surface appears
    pub primary_method: PrimaryMethod,
    /// Whether the secondary strategy runs after a primary failure
    pub fallback_enabled: bool,
    /// How long to wait for a challenge surface after triggering
    pub challenge_wait: Duration,
    /// Settle time after firing a trigger before inspecting the widget
    pub trigger_settle: Duration,
    /// Hard ceiling on one attempt, wedged DOM steps included
    pub attempt_timeout: Duration,
    /// Audio strategy settings
    pub audio: AudioConfig,
    /// Image strategy settings
    pub image: ImageConfig,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            primary_method: PrimaryMethod::Audio,
            fallback_enabled: true,
            challenge_wait: Duration::from_secs(5),
            trigger_settle: Duration::from_secs(2),
            attempt_timeout: Duration::from_secs(120),
            audio: AudioConfig::default(),
            image: ImageConfig::default(),
        }
    }
}

impl SolverConfig {
    /// Create a new config builder
    pub fn builder() -> SolverConfigBuilder {
        SolverConfigBuilder::default()
    }
}

/// Builder for [`SolverConfig`]
#[derive(Default)]
pub struct SolverConfigBuilder {
    config: SolverConfig,
}

impl SolverConfigBuilder {
    /// Set the outer retry budget
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Set which strategy runs first
    pub fn primary_method(mut self, method: PrimaryMethod) -> Self {
        self.config.primary_method = method;
        self
    }

    /// Enable/disable the fallback strategy
    pub fn fallback_enabled(mut self, enabled: bool) -> Self {
        self.config.fallback_enabled = enabled;
        self
    }

    /// Set the challenge-surface wait
    pub fn challenge_wait(mut self, wait: Duration) -> Self {
        self.config.challenge_wait = wait;
        self
    }

    /// Set the post-trigger settle time
    pub fn trigger_settle(mut self, settle: Duration) -> Self {
        self.config.trigger_settle = settle;
        self
    }

    /// Set the per-attempt deadline
    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.config.attempt_timeout = timeout;
        self
    }

    /// Set audio strategy sub-attempts
    pub fn audio_max_attempts(mut self, attempts: u32) -> Self {
        self.config.audio.max_attempts = attempts;
        self
    }

    /// Set image strategy round budget
    pub fn image_max_rounds(mut self, rounds: u32) -> Self {
        self.config.image.max_rounds = rounds;
        self
    }

    /// Build the config
    pub fn build(self) -> SolverConfig {
        self.config
    }
}

/// Configuration for the task registry
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Maximum task records held in memory
    pub capacity: usize,
    /// Time-to-live of terminal task records before eviction
    pub task_ttl: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            task_ttl: Duration::from_secs(300),
        }
    }
}

/// Per-variant pricing, deducted from the owner's balance on success
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Price of a normal (checkbox) solve
    pub normal: f64,
    /// Price of an invisible solve
    pub invisible: f64,
    /// Price of an enterprise solve
    pub enterprise: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            normal: 0.001,
            invisible: 0.0012,
            enterprise: 0.0015,
        }
    }
}

/// Top-level application configuration
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// Browser pool settings
    pub pool: PoolConfig,
    /// Solve orchestration settings
    pub solver: SolverConfig,
    /// Task registry settings
    pub registry: RegistryConfig,
    /// Pricing table
    pub pricing: PricingConfig,
}
