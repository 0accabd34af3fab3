//! Image challenge strategy
//!
//! Reads the instruction label, pulls the tile grid, classifies every tile
//! against the label via the classification collaborator, clicks the
//! matches, and verifies. Challenges can run multiple rounds with fresh
//! tiles and a *different* target label after each submission, so the label
//! is re-detected at the top of every round rather than carried over.

use super::{widget, ChallengeStrategy, StrategyOutcome};
use crate::browser::Session;
use crate::config::ImageConfig;
use crate::error::{Error, Result};
use crate::inference::ImageClassifier;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use regex::Regex;
use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Settle time after a tile click
const CLICK_PAUSE: Duration = Duration::from_millis(200);
/// Settle time after verifying a round
const VERIFY_PAUSE: Duration = Duration::from_millis(2000);

/// Instruction phrasings to canonical label, singular and plural forms
const LABEL_MAP: &[(&str, &str)] = &[
    ("bicycles", "bicycle"),
    ("bicycle", "bicycle"),
    ("buses", "bus"),
    ("bus", "bus"),
    ("cars", "car"),
    ("car", "car"),
    ("crosswalks", "crosswalk"),
    ("crosswalk", "crosswalk"),
    ("fire hydrants", "fire_hydrant"),
    ("fire hydrant", "fire_hydrant"),
    ("hydrants", "fire_hydrant"),
    ("hydrant", "fire_hydrant"),
    ("motorcycles", "motorcycle"),
    ("motorcycle", "motorcycle"),
    ("traffic lights", "traffic_light"),
    ("traffic light", "traffic_light"),
    ("stairs", "stairs"),
    ("stair", "stairs"),
    ("chimneys", "chimney"),
    ("chimney", "chimney"),
    ("bridges", "bridge"),
    ("bridge", "bridge"),
    ("boats", "boat"),
    ("boat", "boat"),
    ("tractors", "tractor"),
    ("tractor", "tractor"),
];

/// Map instruction text ("Select all images with a fire hydrant") to the
/// canonical label the classifier understands.
pub fn normalize_label(instruction: &str) -> Option<&'static str> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(?:images?|squares?)\s+with\s+(?:a\s+|an\s+)?(.+)").expect("static regex")
    });

    let text = instruction.to_lowercase();
    let candidate = pattern
        .captures(&text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or(text);

    LABEL_MAP
        .iter()
        .find(|(phrase, _)| candidate.contains(phrase))
        .map(|(_, label)| *label)
}

/// Image-based [`ChallengeStrategy`]
pub struct ImageStrategy {
    classifier: Arc<dyn ImageClassifier>,
    http: reqwest::Client,
    config: ImageConfig,
}

impl ImageStrategy {
    /// Create the strategy around a classification collaborator
    pub fn new(
        classifier: Arc<dyn ImageClassifier>,
        http: reqwest::Client,
        config: ImageConfig,
    ) -> Self {
        Self {
            classifier,
            http,
            config,
        }
    }

    #[instrument(skip(self, session))]
    async fn round(&self, session: &Session, round: u32) -> Result<bool> {
        // Content may have mutated since the previous submission; always
        // re-read the instruction instead of reusing last round's label.
        let Some(instruction) = widget::challenge_instruction(session).await? else {
            return Err(Error::generic("no challenge instruction visible"));
        };
        let Some(label) = normalize_label(&instruction) else {
            return Err(Error::generic(format!(
                "unsupported challenge content: {}",
                instruction
            )));
        };
        info!(round, label, "classifying challenge tiles");

        let sources = widget::tile_sources(session).await?;
        if sources.is_empty() {
            return Err(Error::generic("challenge grid has no tiles"));
        }

        let mut matched = Vec::new();
        for (index, src) in sources {
            let bytes = match self.tile_bytes(&src).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    debug!(index, error = %e, "skipping unreadable tile");
                    continue;
                }
            };

            let classifier = Arc::clone(&self.classifier);
            let target = label.to_string();
            let verdict = tokio::task::spawn_blocking(move || classifier.classify(&bytes, &target))
                .await
                .map_err(|e| Error::generic(format!("classification task failed: {}", e)))??;

            if verdict.matches && verdict.confidence >= self.config.min_confidence {
                matched.push(index);
            }
        }
        debug!(round, ?matched, "tile classification complete");

        for index in &matched {
            widget::click_tile(session, *index).await?;
            tokio::time::sleep(CLICK_PAUSE).await;
        }
        widget::click_verify(session).await?;
        tokio::time::sleep(VERIFY_PAUSE).await;

        Ok(widget::is_checked(session).await? || widget::extract_token(session).await?.is_some())
    }

    /// Fetch tile bytes from an inline data URL or over HTTP
    async fn tile_bytes(&self, src: &str) -> Result<Vec<u8>> {
        if let Some(data) = src.strip_prefix("data:") {
            let payload = data
                .split_once(',')
                .map(|(_, p)| p)
                .ok_or_else(|| Error::generic("malformed data URL"))?;
            return BASE64
                .decode(payload)
                .map_err(|e| Error::generic(format!("tile decode failed: {}", e)));
        }
        let response = self.http.get(src).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl ChallengeStrategy for ImageStrategy {
    fn name(&self) -> &'static str {
        "image"
    }

    async fn run(&self, session: &Session) -> StrategyOutcome {
        for round in 1..=self.config.max_rounds {
            match self.round(session, round).await {
                Ok(true) => return StrategyOutcome::Solved,
                Ok(false) => {
                    debug!(round, "round did not complete the challenge, continuing");
                }
                Err(e) => {
                    warn!(round, error = %e, "image round error");
                    return StrategyOutcome::Failed(e.to_string());
                }
            }
        }
        StrategyOutcome::Failed(format!(
            "challenge unsolved after {} rounds",
            self.config.max_rounds
        ))
    }
}
