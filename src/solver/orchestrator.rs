//! Solve orchestration
//!
//! One state machine shared by all challenge variants:
//!
//! ```text
//! Start -> Navigate -> DetectAutoPass -> {Solved | AwaitChallenge}
//!       -> SelectStrategy -> RunStrategy -> {Solved | Fallback | AttemptFailed}
//!       -> {Retry | Exhausted}
//! ```
//!
//! Variants differ only in how the challenge is triggered: Normal clicks the
//! visible checkbox, Invisible fires the programmatic execute path behind a
//! token-capture hook, Enterprise does the same through the enterprise API
//! with an action parameter and its own callback capture. Every attempt runs
//! in a fresh pool session released unconditionally at the end, and per-
//! attempt errors only ever influence the retry decision.

use super::{widget, ChallengeStrategy, StrategyOutcome};
use crate::browser::{BrowserPool, Session};
use crate::config::SolverConfig;
use crate::error::{Error, Result, TaskError};
use crate::metrics::Metrics;
use crate::registry::{TaskSpec, Variant};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// A successful solve
#[derive(Debug, Clone)]
pub struct Solution {
    /// Proof token
    pub token: String,
    /// How it was obtained: `auto`, a strategy name, or a callback capture
    pub method: String,
    /// Attempts consumed, the successful one included
    pub attempts: u32,
}

/// Per-variant attempt/retry/fallback state machine
pub struct SolverOrchestrator {
    pool: Arc<BrowserPool>,
    config: SolverConfig,
    nav_timeout: Duration,
    primary: Arc<dyn ChallengeStrategy>,
    secondary: Arc<dyn ChallengeStrategy>,
    metrics: Arc<Metrics>,
}

impl SolverOrchestrator {
    /// Wire the orchestrator. `primary`/`secondary` arrive already ordered
    /// per the configured primary method.
    pub fn new(
        pool: Arc<BrowserPool>,
        config: SolverConfig,
        nav_timeout: Duration,
        primary: Arc<dyn ChallengeStrategy>,
        secondary: Arc<dyn ChallengeStrategy>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            pool,
            config,
            nav_timeout,
            primary,
            secondary,
            metrics,
        }
    }

    /// Run the state machine to a terminal outcome.
    ///
    /// Only retry-budget exhaustion or an unrecoverable pool failure
    /// surfaces as an error; everything else is retried internally.
    #[instrument(skip(self, spec), fields(url = %spec.website_url, variant = %spec.variant))]
    pub async fn run(&self, spec: &TaskSpec) -> Result<Solution> {
        for attempt in 1..=self.config.max_retries {
            self.metrics.record_attempt();
            debug!(attempt, max = self.config.max_retries, "starting attempt");

            // A fresh session per attempt: clean proxy, clean fingerprint
            let session = match self
                .pool
                .acquire_with(spec.proxy.clone(), spec.user_agent.clone())
                .await
            {
                Ok(session) => session,
                Err(e @ Error::Pool(_)) => return Err(e),
                Err(e) => {
                    warn!(attempt, error = %e, "session acquisition failed");
                    continue;
                }
            };

            let outcome = tokio::time::timeout(
                self.config.attempt_timeout,
                self.attempt(&session, spec),
            )
            .await;

            self.pool.release(session).await;

            match outcome {
                Ok(Ok(Some((token, method)))) => {
                    info!(attempt, method = %method, "challenge solved");
                    return Ok(Solution {
                        token,
                        method,
                        attempts: attempt,
                    });
                }
                Ok(Ok(None)) => debug!(attempt, "attempt inconclusive"),
                Ok(Err(e)) => warn!(attempt, error = %e, "attempt failed"),
                Err(_) => warn!(attempt, "attempt deadline exceeded"),
            }
        }

        Err(Error::Task(TaskError::Unsolvable {
            attempts: self.config.max_retries,
        }))
    }

    /// One attempt: trigger, auto-pass detection, then strategies.
    async fn attempt(
        &self,
        session: &Session,
        spec: &TaskSpec,
    ) -> Result<Option<(String, String)>> {
        session
            .navigate(&spec.website_url, self.nav_timeout)
            .await?;

        if let Some(cookies) = &spec.cookies {
            widget::apply_cookies(session, cookies).await?;
        }

        let callback_tag = self.trigger_challenge(session, spec).await?;
        tokio::time::sleep(self.config.trigger_settle).await;

        // Fast path: completion callback already fired
        if let Some(tag) = callback_tag {
            if let Some(token) = widget::captured_token(session).await? {
                return Ok(Some((token, tag.to_string())));
            }
        }

        // Fast path: widget passed without a challenge
        if widget::is_checked(session).await? {
            if let Some(token) = widget::extract_token(session).await? {
                return Ok(Some((token, "auto".to_string())));
            }
        }

        if !widget::wait_for_challenge(session, self.config.challenge_wait).await? {
            // No challenge surfaced; the widget may still have completed
            if let Some(token) = widget::extract_token(session).await? {
                return Ok(Some((token, "auto".to_string())));
            }
            if let Some(tag) = callback_tag {
                // Completion callbacks can land late; give them one more window
                tokio::time::sleep(self.config.trigger_settle).await;
                if let Some(token) = widget::captured_token(session).await? {
                    return Ok(Some((token, tag.to_string())));
                }
            }
            debug!("no challenge and no token, counting attempt as failed");
            return Ok(None);
        }

        let Some(method) = self.run_strategies(session).await else {
            return Ok(None);
        };

        if let Some(token) = widget::extract_token(session).await? {
            return Ok(Some((token, method.to_string())));
        }
        if let Some(tag) = callback_tag {
            if let Some(token) = widget::captured_token(session).await? {
                return Ok(Some((token, tag.to_string())));
            }
        }
        debug!("strategy reported solved but no token surfaced");
        Ok(None)
    }

    /// Variant-specific trigger. Returns the callback method tag when a
    /// capture hook was installed.
    async fn trigger_challenge(
        &self,
        session: &Session,
        spec: &TaskSpec,
    ) -> Result<Option<&'static str>> {
        match spec.variant {
            Variant::Normal => {
                if !widget::wait_for_widget(session, self.config.challenge_wait).await? {
                    return Err(Error::generic("challenge widget not found on page"));
                }
                if !widget::click_checkbox(session).await? {
                    return Err(Error::generic("could not click widget checkbox"));
                }
                Ok(None)
            }
            Variant::Invisible => {
                widget::install_token_capture(session, false).await?;
                let triggered = widget::trigger_execute(
                    session,
                    &spec.site_key,
                    spec.action.as_deref(),
                    None,
                    false,
                )
                .await?;
                if !triggered {
                    warn!("invisible trigger did not fire");
                }
                Ok(Some("callback"))
            }
            Variant::Enterprise => {
                widget::install_token_capture(session, true).await?;
                let s_payload = spec
                    .enterprise_payload
                    .as_ref()
                    .and_then(|p| p.get("s"))
                    .and_then(|s| s.as_str())
                    .map(str::to_string);
                let triggered = widget::trigger_execute(
                    session,
                    &spec.site_key,
                    spec.action.as_deref(),
                    s_payload.as_deref(),
                    true,
                )
                .await?;
                if !triggered {
                    // Some enterprise deployments still render a checkbox
                    let _ = widget::click_checkbox(session).await;
                }
                Ok(Some("enterprise_callback"))
            }
        }
    }

    /// Primary strategy, then the fallback. A rate-limited primary escalates
    /// to the fallback within this same attempt, without first exhausting
    /// its own sub-attempt budget.
    async fn run_strategies(&self, session: &Session) -> Option<&'static str> {
        match self.primary.run(session).await {
            StrategyOutcome::Solved => return Some(self.primary.name()),
            StrategyOutcome::RateLimited => {
                info!(
                    primary = self.primary.name(),
                    fallback = self.secondary.name(),
                    "primary rate-limited, escalating to fallback"
                );
                if !self.config.fallback_enabled {
                    return None;
                }
            }
            StrategyOutcome::Failed(reason) => {
                debug!(primary = self.primary.name(), reason = %reason, "primary failed");
                if !self.config.fallback_enabled {
                    return None;
                }
            }
        }

        match self.secondary.run(session).await {
            StrategyOutcome::Solved => Some(self.secondary.name()),
            StrategyOutcome::RateLimited => {
                info!(fallback = self.secondary.name(), "fallback rate-limited");
                None
            }
            StrategyOutcome::Failed(reason) => {
                debug!(fallback = self.secondary.name(), reason = %reason, "fallback failed");
                None
            }
        }
    }
}
