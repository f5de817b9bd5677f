use crate::liveness::Method;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default decision threshold on the fused liveness score (inclusive).
pub const DEFAULT_LIVENESS_THRESHOLD: f64 = 0.7;

/// Minimum detector confidence for a face to be considered at all.
pub const DEFAULT_MIN_DETECTION_CONFIDENCE: f32 = 0.95;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("liveness threshold must be within [0, 1], got {0}")]
    ThresholdOutOfRange(f64),
    #[error("minimum detection confidence must be within [0, 1], got {0}")]
    ConfidenceOutOfRange(f32),
}

/// Liveness engine configuration.
///
/// Read once at startup and handed to [`crate::LivenessEngine::new`]; the
/// engine never mutates it afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessConfig {
    /// Master switch. When false every face is accepted without scoring.
    pub enabled: bool,
    /// Micro-texture analysis (LBP, spectrum, edges, colour histogram).
    pub texture: bool,
    /// Eye-distance blink proxy. Requires landmarks.
    pub blink: bool,
    /// Dense optical flow against the previous frame. Requires a previous frame.
    pub motion: bool,
    /// Gradient, shadow balance and contour structure.
    pub depth: bool,
    /// A face is judged real when the fused score is at or above this value.
    pub threshold: f64,
    /// Detections at or below this confidence are discarded before scoring.
    pub min_detection_confidence: f32,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            texture: true,
            blink: true,
            motion: true,
            depth: true,
            threshold: DEFAULT_LIVENESS_THRESHOLD,
            min_detection_confidence: DEFAULT_MIN_DETECTION_CONFIDENCE,
        }
    }
}

impl LivenessConfig {
    /// Parse and validate a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(ConfigError::ThresholdOutOfRange(self.threshold));
        }
        if !(0.0..=1.0).contains(&self.min_detection_confidence) {
            return Err(ConfigError::ConfidenceOutOfRange(
                self.min_detection_confidence,
            ));
        }
        Ok(())
    }

    /// Enabled scoring methods, in fusion order.
    pub fn enabled_methods(&self) -> Vec<Method> {
        [
            (Method::Texture, self.texture),
            (Method::Blink, self.blink),
            (Method::Motion, self.motion),
            (Method::Depth, self.depth),
        ]
        .into_iter()
        .filter_map(|(method, on)| on.then_some(method))
        .collect()
    }
}
