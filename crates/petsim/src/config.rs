use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_SHADOW_LAYER: i32 = -10_000;

/// Closed interval sampled uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UniformRange {
    pub min: f32,
    pub max: f32,
}

impl UniformRange {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f32 {
        if self.max <= self.min {
            return self.min;
        }
        rng.gen_range(self.min..=self.max)
    }

    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }

    fn validate(&self, field: &str) -> Result<(), ConfigError> {
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(ConfigError::Invalid(format!("{field} must be finite")));
        }
        if self.min < 0.0 {
            return Err(ConfigError::Invalid(format!("{field}.min must be >= 0")));
        }
        if self.max < self.min {
            return Err(ConfigError::Invalid(format!(
                "{field}.max ({}) must be >= {field}.min ({})",
                self.max, self.min
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementConfig {
    pub margin: f32,
    pub speed_range: UniformRange,
    /// Seconds between direction re-rolls while walking.
    pub direction_interval: UniformRange,
    /// Seconds spent paused.
    pub pause_duration: UniformRange,
    /// Probability that a scheduled transition keeps the agent walking.
    pub random_walk_chance: f32,
    /// Scales `speed * dt` so that speeds read as units per 60 Hz frame.
    pub frame_normalization: f32,
    /// How far inside a violated edge a relocated agent may land.
    pub relocation_jitter: f32,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            margin: 20.0,
            speed_range: UniformRange::new(0.3, 0.8),
            direction_interval: UniformRange::new(2.0, 10.0),
            pause_duration: UniformRange::new(1.0, 10.0),
            random_walk_chance: 0.7,
            frame_normalization: 60.0,
            relocation_jitter: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthConfig {
    pub base: i32,
    pub range: i32,
    pub interval_seconds: f32,
    pub sprite_offset: i32,
    pub shadow_layer: i32,
}

impl Default for DepthConfig {
    fn default() -> Self {
        Self {
            base: 100,
            range: 1000,
            interval_seconds: 0.1,
            sprite_offset: 1,
            shadow_layer: DEFAULT_SHADOW_LAYER,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowConfig {
    pub height_ratio: f32,
    /// Distance from the sprite's bottom edge to the shadow's centre line.
    pub vertical_offset: f32,
    /// Scale applied while the pet is walking (lifted off the ground).
    pub contact_scale: f32,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            height_ratio: 0.4,
            vertical_offset: 2.0,
            contact_scale: 0.9,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub movement: MovementConfig,
    pub depth: DepthConfig,
    pub shadow: ShadowConfig,
    pub sweep_interval_seconds: f32,
    pub seed: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            movement: MovementConfig::default(),
            depth: DepthConfig::default(),
            shadow: ShadowConfig::default(),
            sweep_interval_seconds: 1.0,
            seed: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {message}")]
    Parse { path: String, message: String },
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl SimConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let mut deserializer = serde_json::Deserializer::from_str(raw);
        let config = match serde_path_to_error::deserialize::<_, SimConfig>(&mut deserializer) {
            Ok(config) => config,
            Err(error) => {
                let path = error.path().to_string();
                let source = error.into_inner();
                return Err(ConfigError::Parse {
                    path: if path.is_empty() { ".".to_string() } else { path },
                    message: source.to_string(),
                });
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let movement = &self.movement;
        movement.speed_range.validate("movement.speed_range")?;
        movement
            .direction_interval
            .validate("movement.direction_interval")?;
        movement.pause_duration.validate("movement.pause_duration")?;
        if !(0.0..=1.0).contains(&movement.random_walk_chance) {
            return Err(ConfigError::Invalid(
                "movement.random_walk_chance must be within [0, 1]".to_string(),
            ));
        }
        if !movement.margin.is_finite() || movement.margin < 0.0 {
            return Err(ConfigError::Invalid(
                "movement.margin must be finite and >= 0".to_string(),
            ));
        }
        if !movement.frame_normalization.is_finite() || movement.frame_normalization <= 0.0 {
            return Err(ConfigError::Invalid(
                "movement.frame_normalization must be finite and > 0".to_string(),
            ));
        }
        if !movement.relocation_jitter.is_finite() || movement.relocation_jitter < 0.0 {
            return Err(ConfigError::Invalid(
                "movement.relocation_jitter must be finite and >= 0".to_string(),
            ));
        }
        if self.depth.range <= 0 {
            return Err(ConfigError::Invalid("depth.range must be > 0".to_string()));
        }
        if !self.depth.interval_seconds.is_finite() || self.depth.interval_seconds < 0.0 {
            return Err(ConfigError::Invalid(
                "depth.interval_seconds must be finite and >= 0".to_string(),
            ));
        }
        if self.depth.shadow_layer >= self.depth.base {
            return Err(ConfigError::Invalid(
                "depth.shadow_layer must sit below depth.base".to_string(),
            ));
        }
        let shadow = &self.shadow;
        if !shadow.height_ratio.is_finite() || shadow.height_ratio <= 0.0 {
            return Err(ConfigError::Invalid(
                "shadow.height_ratio must be finite and > 0".to_string(),
            ));
        }
        if !shadow.contact_scale.is_finite() || shadow.contact_scale <= 0.0 {
            return Err(ConfigError::Invalid(
                "shadow.contact_scale must be finite and > 0".to_string(),
            ));
        }
        if self.sweep_interval_seconds <= 0.0
            || Duration::try_from_secs_f32(self.sweep_interval_seconds).is_err()
        {
            return Err(ConfigError::Invalid(
                "sweep_interval_seconds must be a positive, representable duration".to_string(),
            ));
        }
        Ok(())
    }
}
