/// Ritual configuration — round count, canvases, collage grid and poem bounds.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::core::composer::{ComposerConfig, MAX_POEM_LINES, MIN_POEM_LINES, MIN_SENSES};
use crate::core::layout::{Canvas, GridSpec, Insets, ScatterSpec, SizeRange};
use crate::core::session::MIN_ROUNDS;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RitualConfig {
    /// Choices per session.
    #[serde(default = "default_rounds")]
    pub rounds: usize,
    /// Canvas and sizes for the two images of a live round.
    #[serde(default = "default_live")]
    pub live: ScatterSpec,
    /// Rotated scatter of the chosen images shown beside the collage.
    #[serde(default = "default_decor")]
    pub decor: ScatterSpec,
    #[serde(default = "default_collage")]
    pub collage: GridSpec,
    /// Width used for a chosen image that was never laid out live.
    #[serde(default = "default_fallback_size")]
    pub fallback_size: f64,
    #[serde(default)]
    pub poem: ComposerConfig,
}

fn default_rounds() -> usize {
    MIN_ROUNDS
}

fn default_live() -> ScatterSpec {
    ScatterSpec::new(
        Canvas::new(1820.0, 750.0).with_insets(Insets {
            top: 120.0,
            right: 60.0,
            bottom: 150.0,
            left: 60.0,
        }),
        SizeRange::new(80.0, 180.0),
        200,
    )
    .with_min_gap(40.0)
}

fn default_decor() -> ScatterSpec {
    ScatterSpec::new(
        Canvas::new(910.0, 750.0).with_insets(Insets {
            top: 40.0,
            right: 40.0,
            bottom: 40.0,
            left: 40.0,
        }),
        SizeRange::new(70.0, 120.0),
        300,
    )
    .with_rotation(-12.0, 12.0)
}

fn default_collage() -> GridSpec {
    GridSpec::new(3, 5).at(305.0, 100.0)
}

fn default_fallback_size() -> f64 {
    120.0
}

impl Default for RitualConfig {
    fn default() -> Self {
        Self {
            rounds: default_rounds(),
            live: default_live(),
            decor: default_decor(),
            collage: default_collage(),
            fallback_size: default_fallback_size(),
            poem: ComposerConfig::default(),
        }
    }
}

impl RitualConfig {
    pub fn load_from_ron(path: &Path) -> Result<RitualConfig, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    pub fn parse_ron(input: &str) -> Result<RitualConfig, ConfigError> {
        let config: RitualConfig = ron::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Cross-field checks the individual sections cannot make alone.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rounds < MIN_ROUNDS {
            return Err(ConfigError::Invalid(format!(
                "{} rounds is fewer than the {MIN_ROUNDS} a session needs",
                self.rounds
            )));
        }
        if self.collage.cell_count() < self.rounds {
            return Err(ConfigError::Invalid(format!(
                "collage grid has {} cells for {} rounds",
                self.collage.cell_count(),
                self.rounds
            )));
        }
        let poem = &self.poem;
        if poem.min_lines < MIN_POEM_LINES
            || poem.max_lines > MAX_POEM_LINES
            || poem.min_senses < MIN_SENSES
        {
            return Err(ConfigError::Invalid(format!(
                "poem needs {}..={} lines and {} senses, within {MIN_POEM_LINES}..={MAX_POEM_LINES} and at least {MIN_SENSES}",
                poem.min_lines, poem.max_lines, poem.min_senses
            )));
        }
        if !self.fallback_size.is_finite() || self.fallback_size <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "fallback size {} must be positive",
                self.fallback_size
            )));
        }
        Ok(())
    }
}
