//! Price level classification
//!
//! Maps a price expressed as a percentage of the daily average onto one of
//! five ordinal levels.

use crate::error::{PriceLevelError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// At or below this percentage an hour is very cheap
pub const THRESHOLD_VERY_CHEAP: f64 = 60.0;
/// At or below this percentage an hour is cheap
pub const THRESHOLD_CHEAP: f64 = 90.0;
/// Lower bound of the normal band. Not consulted by [`classify`]: the cheap
/// branch claims 90 first.
pub const THRESHOLD_NORMAL_LOW: f64 = 90.0;
/// Below this percentage an hour is normal
pub const THRESHOLD_NORMAL_HIGH: f64 = 115.0;
/// Below this percentage an hour is expensive, otherwise very expensive
pub const THRESHOLD_EXPENSIVE: f64 = 140.0;

/// Price level relative to the daily average, ordered cheapest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceLevel {
    VeryCheap,
    Cheap,
    Normal,
    Expensive,
    VeryExpensive,
}

impl PriceLevel {
    /// All levels, cheapest first
    pub const ALL: [PriceLevel; 5] = [
        PriceLevel::VeryCheap,
        PriceLevel::Cheap,
        PriceLevel::Normal,
        PriceLevel::Expensive,
        PriceLevel::VeryExpensive,
    ];

    /// Published state label
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VeryCheap => "very_cheap",
            Self::Cheap => "cheap",
            Self::Normal => "normal",
            Self::Expensive => "expensive",
            Self::VeryExpensive => "very_expensive",
        }
    }

    /// Parse a published label back into a level (case-insensitive)
    pub fn from_label(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

impl fmt::Display for PriceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a percentage of the daily average.
///
/// The cheap side compares inclusively (`<=`), the expensive side
/// exclusively (`<`). NaN and infinities have no level and are rejected.
pub fn classify(percentage: f64) -> Result<PriceLevel> {
    if !percentage.is_finite() {
        return Err(PriceLevelError::InvalidPercentage { value: percentage });
    }

    let level = if percentage <= THRESHOLD_VERY_CHEAP {
        PriceLevel::VeryCheap
    } else if percentage <= THRESHOLD_CHEAP {
        PriceLevel::Cheap
    } else if percentage < THRESHOLD_NORMAL_HIGH {
        PriceLevel::Normal
    } else if percentage < THRESHOLD_EXPENSIVE {
        PriceLevel::Expensive
    } else {
        PriceLevel::VeryExpensive
    };
    Ok(level)
}
