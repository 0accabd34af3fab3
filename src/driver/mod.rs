//! Browser driver capability seam
//!
//! The solving core drives browsers through this narrow capability set rather
//! than a specific automation library: launch a persistent process, open an
//! isolated session on it, and perform navigation/DOM steps inside the
//! session. [`cdp::CdpDriver`] is the production implementation; tests
//! substitute in-memory fakes.

pub mod cdp;

pub use cdp::CdpDriver;

use crate::browser::Fingerprint;
use crate::error::Result;
use crate::proxy::ProxySpec;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Launch parameters for one persistent browser process
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    /// Headless mode
    pub headless: bool,
    /// Chromium sandbox
    pub sandbox: bool,
    /// Executable path override
    pub chrome_path: Option<String>,
}

/// Parameters for one isolated session on an existing process
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Optional egress proxy
    pub proxy: Option<ProxySpec>,
    /// Fingerprint applied to the session
    pub fingerprint: Fingerprint,
}

/// Launches persistent browser processes
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Launch one browser process
    async fn launch(&self, config: &ProcessConfig) -> Result<Box<dyn ProcessHandle>>;
}

/// A live browser process hosting isolated sessions
#[async_trait]
pub trait ProcessHandle: Send + Sync {
    /// Create an isolated session (own cookies, storage, proxy, fingerprint)
    async fn new_session(&self, opts: SessionOptions) -> Result<Box<dyn SessionHandle>>;

    /// Tear the process down; any remaining sessions die with it
    async fn close(&self) -> Result<()>;
}

/// One isolated browsing session
#[async_trait]
pub trait SessionHandle: Send + Sync {
    /// Navigate and wait for the page to become ready
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<()>;

    /// Whether a selector currently matches
    async fn exists(&self, selector: &str) -> Result<bool>;

    /// Click the first element matching a selector
    async fn click(&self, selector: &str) -> Result<()>;

    /// Type text into the first element matching a selector
    async fn fill(&self, selector: &str, text: &str) -> Result<()>;

    /// Evaluate a script in the page, returning its JSON value
    async fn evaluate(&self, script: &str) -> Result<Value>;

    /// Poll for a selector until it matches or the timeout elapses.
    /// Returns whether it appeared; absence is not an error.
    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<bool>;

    /// Close the session, releasing its isolated state
    async fn close(&self) -> Result<()>;
}
