// Core data structures for sector management

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::EcolapError;
use crate::telemetry::PositionIndex;

/// A contiguous stretch of the reference lap, delimited by position indices
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Sector {
    /// Dense 0-based order of the sector within its competition
    pub num: u32,
    /// Name of the competition owning the sector
    pub competition: String,
    /// First position of the sector on the reference lap
    pub start_pos: PositionIndex,
    /// Last position of the sector on the reference lap
    pub end_pos: PositionIndex,
}

impl Sector {
    pub fn new(
        competition: impl Into<String>,
        num: u32,
        start_pos: PositionIndex,
        end_pos: PositionIndex,
    ) -> Self {
        Self {
            num,
            competition: competition.into(),
            start_pos,
            end_pos,
        }
    }
}

/// Check the steady state of a competition's sectors: numbered 0..n without
/// gaps, with increasing and non-overlapping ranges.
pub fn validate_sectors(sectors: &[Sector]) -> Result<(), String> {
    for (expected, sector) in sectors.iter().enumerate() {
        if sector.num as usize != expected {
            return Err(format!(
                "Sector numbering gap: expected {}, found {}",
                expected, sector.num
            ));
        }
    }
    for (previous, next) in sectors.iter().tuple_windows() {
        if previous.end_pos >= next.start_pos {
            return Err(format!(
                "Sector {} overlaps with sector {}",
                previous.num, next.num
            ));
        }
    }
    Ok(())
}

/// A competition and the wheel perimeter of the vehicle that raced it
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Competition {
    pub name: String,
    /// Distance travelled per wheel revolution, in meters
    pub wheel_perimeter_m: f64,
}

impl Competition {
    pub fn new(name: impl Into<String>, wheel_perimeter_m: f64) -> Result<Self, EcolapError> {
        let name = name.into();
        if name.is_empty() {
            return Err(EcolapError::MissingCompetition);
        }
        if !wheel_perimeter_m.is_finite() || wheel_perimeter_m <= 0. {
            return Err(EcolapError::InvalidWheelPerimeter {
                perimeter: wheel_perimeter_m,
            });
        }
        Ok(Self {
            name,
            wheel_perimeter_m,
        })
    }
}
