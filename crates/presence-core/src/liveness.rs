//! Passive liveness fusion.
//!
//! Each enabled method produces an independent sub-score in [0, 1] from the
//! face crop and whatever optional context the caller has (landmarks, the
//! previous frame). The verdict is the plain mean of the sub-scores that
//! could be computed, compared against the configured threshold.
//!
//! # Threat Coverage
//!
//! - **Targets:** Printed photographs and flat screen replays held in front
//!   of the camera, which show smoothed texture and little natural motion.
//! - **Does not target:** High-quality 3D masks or adversarial displays.
//!   The weights are hand-tuned heuristics, not a trained classifier.

use crate::blink::BlinkDetector;
use crate::config::LivenessConfig;
use crate::types::Landmarks;
use crate::{depth, motion, texture};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Fused score used when no method produced a sub-score.
pub const NEUTRAL_SCORE: f64 = 0.5;

/// Blink sub-score when the window shows a blink.
pub const BLINK_DETECTED_SCORE: f64 = 1.0;

/// Blink sub-score when the window is still (or too short).
pub const BLINK_ABSENT_SCORE: f64 = 0.3;

/// One liveness scoring method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Texture,
    Blink,
    Motion,
    Depth,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Texture => "texture",
            Method::Blink => "blink",
            Method::Motion => "motion",
            Method::Depth => "depth",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sub-scores keyed by method. Holds only the methods that actually ran.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScoreMap(BTreeMap<Method, f64>);

impl ScoreMap {
    pub fn get(&self, method: Method) -> Option<f64> {
        self.0.get(&method).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Method, f64)> + '_ {
        self.0.iter().map(|(m, s)| (*m, *s))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Arithmetic mean of the present sub-scores, `None` when empty.
    pub fn mean(&self) -> Option<f64> {
        if self.0.is_empty() {
            return None;
        }
        Some(self.0.values().sum::<f64>() / self.0.len() as f64)
    }
}

impl FromIterator<(Method, f64)> for ScoreMap {
    fn from_iter<I: IntoIterator<Item = (Method, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Outcome of one liveness check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LivenessVerdict {
    /// Whether the face is judged live (`total_score >= threshold`).
    pub is_real: bool,
    /// Mean of the sub-scores in `details`, or 0.5 when none ran.
    pub total_score: f64,
    pub details: ScoreMap,
}

impl LivenessVerdict {
    /// Caller-facing label for the kiosk display.
    pub fn label(&self) -> &'static str {
        if self.is_real {
            "REAL"
        } else {
            "FAKE DETECTED"
        }
    }
}

/// Stateful fusion engine. Owns the blink history, so one engine serves one
/// camera stream.
#[derive(Debug, Clone)]
pub struct LivenessEngine {
    config: LivenessConfig,
    blink: BlinkDetector,
}

impl LivenessEngine {
    pub fn new(config: LivenessConfig) -> Self {
        tracing::debug!(
            enabled = config.enabled,
            methods = ?config.enabled_methods(),
            threshold = config.threshold,
            "liveness engine created"
        );
        Self {
            config,
            blink: BlinkDetector::new(),
        }
    }

    pub fn config(&self) -> &LivenessConfig {
        &self.config
    }

    pub fn blink_detector(&self) -> &BlinkDetector {
        &self.blink
    }

    /// Score `face` and fuse the sub-scores into a verdict.
    ///
    /// Blink runs only with landmarks and motion only with a previous frame;
    /// a method lacking its input is left out of the mean.
    pub fn check_liveness(
        &mut self,
        face: &RgbImage,
        landmarks: Option<&Landmarks>,
        previous: Option<&RgbImage>,
    ) -> LivenessVerdict {
        if !self.config.enabled {
            return LivenessVerdict {
                is_real: true,
                total_score: 1.0,
                details: ScoreMap::default(),
            };
        }

        let mut scores = BTreeMap::new();

        if self.config.texture {
            scores.insert(Method::Texture, texture::texture_score(face));
        }

        if self.config.blink && landmarks.is_some() {
            let observation = self.blink.detect(landmarks);
            let score = if observation.blink_detected {
                BLINK_DETECTED_SCORE
            } else {
                BLINK_ABSENT_SCORE
            };
            scores.insert(Method::Blink, score);
        }

        if self.config.motion {
            if let Some(prev) = previous {
                scores.insert(Method::Motion, motion::motion_score(face, Some(prev)));
            }
        }

        if self.config.depth {
            scores.insert(Method::Depth, depth::depth_score(face));
        }

        let details = ScoreMap(scores);
        let total_score = details.mean().unwrap_or(NEUTRAL_SCORE);
        let is_real = total_score >= self.config.threshold;

        tracing::info!(
            is_real,
            total_score,
            methods = details.len(),
            threshold = self.config.threshold,
            "liveness verdict"
        );

        LivenessVerdict {
            is_real,
            total_score,
            details,
        }
    }

    /// Drop per-subject state so the next call starts a fresh session.
    pub fn reset(&mut self) {
        self.blink.reset();
    }
}
