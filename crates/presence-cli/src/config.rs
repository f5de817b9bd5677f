use anyhow::{Context, Result};
use presence_core::LivenessConfig;
use std::path::Path;

/// Load the liveness configuration.
///
/// Starts from `path` when given (TOML), otherwise from defaults, then applies
/// `PRESENCE_*` environment overrides and validates the result.
pub fn load(path: Option<&Path>) -> Result<LivenessConfig> {
    let mut config = match path {
        Some(p) => LivenessConfig::load(p)
            .with_context(|| format!("failed to load config from {}", p.display()))?,
        None => LivenessConfig::default(),
    };
    apply_overrides(&mut config, |key| std::env::var(key).ok());
    config.validate().context("invalid configuration after environment overrides")?;
    Ok(config)
}

/// Apply `PRESENCE_*` overrides read through `lookup`.
///
/// Toggles are disabled by the value "0" and enabled by anything else;
/// unparsable numbers keep the current value.
fn apply_overrides(config: &mut LivenessConfig, lookup: impl Fn(&str) -> Option<String>) {
    config.enabled = env_flag(&lookup, "PRESENCE_LIVENESS_ENABLED", config.enabled);
    config.texture = env_flag(&lookup, "PRESENCE_TEXTURE_ENABLED", config.texture);
    config.blink = env_flag(&lookup, "PRESENCE_BLINK_ENABLED", config.blink);
    config.motion = env_flag(&lookup, "PRESENCE_MOTION_ENABLED", config.motion);
    config.depth = env_flag(&lookup, "PRESENCE_DEPTH_ENABLED", config.depth);
    config.threshold = env_f64(&lookup, "PRESENCE_LIVENESS_THRESHOLD", config.threshold);
    config.min_detection_confidence = env_f32(
        &lookup,
        "PRESENCE_MIN_CONFIDENCE",
        config.min_detection_confidence,
    );
}

fn env_flag(lookup: &impl Fn(&str) -> Option<String>, key: &str, current: bool) -> bool {
    lookup(key).map(|v| v != "0").unwrap_or(current)
}

fn env_f64(lookup: &impl Fn(&str) -> Option<String>, key: &str, current: f64) -> f64 {
    lookup(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(current)
}

fn env_f32(lookup: &impl Fn(&str) -> Option<String>, key: &str, current: f32) -> f32 {
    lookup(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(current)
}
