//! ML inference collaborators
//!
//! Interpreting challenge content (tile images, audio clips) is delegated to
//! external models behind two small synchronous traits. Implementations are
//! expected to block (local model inference, subprocess calls); strategies
//! invoke them through `spawn_blocking` so they never stall the cooperative
//! executor.

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Outcome of classifying one tile against a target label
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// Whether the tile contains the target
    pub matches: bool,
    /// Model confidence in `[0, 1]`
    pub confidence: f32,
}

/// Classifies challenge tiles against a target label
pub trait ImageClassifier: Send + Sync {
    /// Decide whether `tile` (encoded image bytes) depicts `label`.
    fn classify(&self, tile: &[u8], label: &str) -> Result<Classification>;
}

/// Transcribes challenge audio clips
pub trait AudioTranscriber: Send + Sync {
    /// Transcribe `audio` (encoded clip bytes); `None` when no speech was
    /// recognized.
    fn transcribe(&self, audio: &[u8]) -> Result<Option<String>>;
}

/// Classifier used when no model is wired in; never matches anything, so the
/// image strategy fails cleanly and only auto-pass/callback paths succeed.
pub struct DisabledClassifier;

impl ImageClassifier for DisabledClassifier {
    fn classify(&self, _tile: &[u8], _label: &str) -> Result<Classification> {
        Ok(Classification {
            matches: false,
            confidence: 0.0,
        })
    }
}

/// Transcriber used when no model is wired in; recognizes nothing.
pub struct DisabledTranscriber;

impl AudioTranscriber for DisabledTranscriber {
    fn transcribe(&self, _audio: &[u8]) -> Result<Option<String>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_collaborators() {
        let c = DisabledClassifier.classify(b"img", "bus").unwrap();
        assert!(!c.matches);
        assert_eq!(c.confidence, 0.0);

        let t = DisabledTranscriber.transcribe(b"aud").unwrap();
        assert!(t.is_none());
    }

    #[test]
    fn test_classification_serde() {
        let c = Classification {
            matches: true,
            confidence: 0.87,
        };
        let json = serde_json::to_string(&c).unwrap();
        let back: Classification = serde_json::from_str(&json).unwrap();
        assert!(back.matches);
    }
}
