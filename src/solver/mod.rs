//! Challenge solving
//!
//! The orchestrator runs the attempt/retry/fallback state machine over pool
//! sessions; strategies are the pluggable algorithms that turn a visible
//! challenge into a completion signal. Widget interactions shared by both
//! live in [`widget`].

pub mod audio;
pub mod image;
pub mod orchestrator;
pub mod widget;

pub use audio::AudioStrategy;
pub use image::ImageStrategy;
pub use orchestrator::{Solution, SolverOrchestrator};

use crate::browser::Session;
use async_trait::async_trait;

/// Result of one strategy run against a challenge surface.
///
/// Strategies catch their own internal errors; the outcome is an explicit
/// value so every retry/fallback decision is a visible branch in the
/// orchestrator rather than exception propagation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyOutcome {
    /// The challenge widget reports completion
    Solved,
    /// The strategy exhausted its sub-attempts
    Failed(String),
    /// The challenge provider throttled this strategy. The strategy has
    /// already aborted its remaining sub-attempts; the orchestrator must
    /// escalate to the fallback within the same outer attempt.
    RateLimited,
}

/// A pluggable challenge solving algorithm
#[async_trait]
pub trait ChallengeStrategy: Send + Sync {
    /// Method tag recorded on success (`audio`, `image`)
    fn name(&self) -> &'static str;

    /// Attempt to solve the currently visible challenge in `session`.
    async fn run(&self, session: &Session) -> StrategyOutcome;
}
