use serde::Deserialize;
use std::fs;
use thiserror::Error;

use crate::tracker::Strategy;

/// Inclusive low/high HSV bounds for the color-range strategy.
///
/// Components follow the 8-bit convention hue in [0, 179], saturation
/// and value in [0, 255], so existing slider configurations carry over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorRange {
    pub low: [u8; 3],
    pub high: [u8; 3],
}

impl ColorRange {
    /// Build a range, rejecting bounds where a low component exceeds
    /// its high counterpart.
    pub fn new(low: [u8; 3], high: [u8; 3]) -> Result<Self, ConfigError> {
        if low.iter().zip(high.iter()).any(|(l, h)| l > h) {
            return Err(ConfigError::InvalidColorRange { low, high });
        }
        Ok(ColorRange { low, high })
    }

    /// The widest possible range: every pixel matches.
    pub fn full() -> Self {
        ColorRange {
            low: [0, 0, 0],
            high: [179, 255, 255],
        }
    }

    /// Componentwise inclusive containment test.
    #[inline]
    pub fn contains(&self, hsv: [u8; 3]) -> bool {
        (0..3).all(|i| self.low[i] <= hsv[i] && hsv[i] <= self.high[i])
    }
}

/// Validation failures reported at configuration time. When one of
/// these is returned the previous configuration stays in effect.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("color range low {low:?} exceeds high {high:?}")]
    InvalidColorRange { low: [u8; 3], high: [u8; 3] },
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub strategy: Strategy,
    pub color_low: [u8; 3],
    pub color_high: [u8; 3],
    pub min_area: usize,
}

impl Config {
    /// Load from a JSON file.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)?;
        let cfg: Config = serde_json::from_str(&data)?;
        Ok(cfg)
    }

    /// Validated color bounds from the raw config fields.
    pub fn color_range(&self) -> Result<ColorRange, ConfigError> {
        ColorRange::new(self.color_low, self.color_high)
    }
}
