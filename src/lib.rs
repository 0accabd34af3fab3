//! Gatepass - Headless-Browser Verification Challenge Solver
//!
//! This crate automates completion of interactive verification challenges by
//! driving pooled headless browser sessions, optionally through per-session
//! egress proxies, and returns a proof token per request.
//!
//! # Architecture
//!
//! ```text
//! Task intake ──▶ App ──▶ TaskRegistry (lifecycle, TTL eviction)
//!                  │
//!                  ▼
//!          SolverOrchestrator ──▶ ChallengeStrategy (audio / image)
//!                  │                      │
//!                  ▼                      ▼
//!            BrowserPool          transcribe / classify
//!         (persistent processes,    (blocking collaborators)
//!          ephemeral sessions)
//!                  │
//!                  ▼
//!            BrowserDriver (CDP)
//! ```
//!
//! Persistent browser processes are expensive and launched once; isolated
//! sessions (own cookies, storage, proxy, fingerprint) are cheap and live
//! for exactly one solve attempt. A pool-wide semaphore bounds total open
//! sessions; per-process locks keep counter updates fine-grained.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use gatepass::app::App;
//! use gatepass::config::AppConfig;
//! use gatepass::driver::CdpDriver;
//! use gatepass::inference::{DisabledClassifier, DisabledTranscriber};
//! use gatepass::ledger::MemoryLedger;
//! use gatepass::registry::{TaskSpec, Variant};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ledger = Arc::new(MemoryLedger::new());
//!     ledger.seed("local-key", 1.0);
//!
//!     let app = App::new(
//!         AppConfig::default(),
//!         Arc::new(CdpDriver::new()),
//!         ledger,
//!         Arc::new(DisabledTranscriber),
//!         Arc::new(DisabledClassifier),
//!     );
//!     app.initialize().await?;
//!
//!     let view = app
//!         .solve_blocking(TaskSpec {
//!             website_url: "https://example.com/login".into(),
//!             site_key: "6Le-abc123".into(),
//!             variant: Variant::Normal,
//!             proxy: None,
//!             user_agent: None,
//!             cookies: None,
//!             action: None,
//!             enterprise_payload: None,
//!             client_key: "local-key".into(),
//!         })
//!         .await?;
//!
//!     println!("{}", serde_json::to_string_pretty(&view)?);
//!     app.shutdown().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod app;
pub mod browser;
pub mod config;
pub mod driver;
pub mod error;
pub mod inference;
pub mod ledger;
pub mod metrics;
pub mod proxy;
pub mod registry;
pub mod solver;

// Re-exports for convenience
pub use app::App;
pub use browser::{BrowserPool, Session};
pub use error::{Error, ErrorCode, Result};
pub use registry::{TaskRegistry, TaskSpec, TaskStatus, Variant};
pub use solver::{SolverOrchestrator, StrategyOutcome};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
