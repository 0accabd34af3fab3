//! Audio challenge strategy
//!
//! Switches the challenge surface to its audio form, downloads the clip with
//! browser-matching headers, hands it to the transcription collaborator on
//! the blocking pool, and submits the text. Wrong answers reload for a fresh
//! clip; a provider throttle page aborts the whole strategy immediately so
//! the orchestrator can escalate to the image fallback.

use super::{widget, ChallengeStrategy, StrategyOutcome};
use crate::browser::Session;
use crate::config::AudioConfig;
use crate::error::{Error, Result, StrategyError};
use crate::inference::AudioTranscriber;
use async_trait::async_trait;
use reqwest::header;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Settle time after widget interactions
const INTERACT_PAUSE: Duration = Duration::from_millis(1000);
/// Settle time after submitting an answer
const VERIFY_PAUSE: Duration = Duration::from_millis(2000);

/// Audio-based [`ChallengeStrategy`]
pub struct AudioStrategy {
    transcriber: Arc<dyn AudioTranscriber>,
    http: reqwest::Client,
    config: AudioConfig,
}

impl AudioStrategy {
    /// Create the strategy around a transcription collaborator
    pub fn new(
        transcriber: Arc<dyn AudioTranscriber>,
        http: reqwest::Client,
        config: AudioConfig,
    ) -> Self {
        Self {
            transcriber,
            http,
            config,
        }
    }

    #[instrument(skip(self, session))]
    async fn sub_attempt(&self, session: &Session) -> Result<bool> {
        if session.exists(widget::AUDIO_BUTTON).await? {
            session.click(widget::AUDIO_BUTTON).await?;
            tokio::time::sleep(INTERACT_PAUSE).await;
        }

        if widget::is_rate_limited(session).await? {
            return Err(Error::Strategy(StrategyError::RateLimited));
        }

        let Some(audio_url) = self.audio_url(session).await? else {
            debug!("no audio clip available");
            widget::click_reload(session).await?;
            return Ok(false);
        };

        let clip = self.download(session, &audio_url).await?;

        let transcriber = Arc::clone(&self.transcriber);
        let text = tokio::task::spawn_blocking(move || transcriber.transcribe(&clip))
            .await
            .map_err(|e| Error::generic(format!("transcription task failed: {}", e)))??;

        let Some(answer) = text else {
            debug!("clip produced no transcription, reloading");
            widget::click_reload(session).await?;
            tokio::time::sleep(INTERACT_PAUSE).await;
            return Ok(false);
        };
        info!(answer = %answer, "submitting transcription");

        session.fill(widget::AUDIO_RESPONSE, &answer).await?;
        widget::click_verify(session).await?;
        tokio::time::sleep(VERIFY_PAUSE).await;

        if widget::is_checked(session).await? || widget::extract_token(session).await?.is_some() {
            return Ok(true);
        }

        debug!("answer rejected, requesting a new clip");
        widget::click_reload(session).await?;
        tokio::time::sleep(INTERACT_PAUSE).await;
        Ok(false)
    }

    async fn audio_url(&self, session: &Session) -> Result<Option<String>> {
        let script = r#"
            (() => {
                const source = document.querySelector('#audio-source');
                if (source && source.src) return source.src;
                const link = document.querySelector('.rc-audiochallenge-tdownload-link');
                if (link && link.href) return link.href;
                return null;
            })()
        "#;
        Ok(session
            .evaluate(script)
            .await?
            .as_str()
            .filter(|s| !s.is_empty())
            .map(str::to_string))
    }

    /// Download the clip with headers matching the session's fingerprint
    async fn download(&self, session: &Session, url: &str) -> Result<Vec<u8>> {
        let response = self
            .http
            .get(url)
            .header(header::USER_AGENT, &session.fingerprint().user_agent)
            .header(header::ACCEPT, "audio/webm,audio/ogg,audio/wav,audio/*;q=0.9,*/*;q=0.8")
            .header(header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .header(header::REFERER, "https://www.google.com/")
            .send()
            .await?
            .error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl ChallengeStrategy for AudioStrategy {
    fn name(&self) -> &'static str {
        "audio"
    }

    async fn run(&self, session: &Session) -> StrategyOutcome {
        for sub in 1..=self.config.max_attempts {
            debug!(sub, max = self.config.max_attempts, "audio sub-attempt");
            match self.sub_attempt(session).await {
                Ok(true) => return StrategyOutcome::Solved,
                Ok(false) => continue,
                Err(e) if e.is_rate_limited() => {
                    info!("audio challenge rate-limited, aborting remaining sub-attempts");
                    return StrategyOutcome::RateLimited;
                }
                Err(e) => {
                    warn!(sub, error = %e, "audio sub-attempt error");
                }
            }
        }
        StrategyOutcome::Failed(format!(
            "no accepted transcription in {} sub-attempts",
            self.config.max_attempts
        ))
    }
}
