use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result of one game played at a sample point.
///
/// `Loss`, `Win` and `Draw` are final. A freshly added sample is
/// `InProgress` until its outcome is reported; `Unknown` marks a game that
/// finished without a usable result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Loss,
    Win,
    Draw,
    Unknown,
    InProgress,
}

/// Number of final outcome kinds (`Loss`, `Win`, `Draw`).
pub const FINAL_OUTCOMES: usize = 3;

/// Number of outcome kinds including the non-final ones.
pub const ALL_OUTCOMES: usize = 5;

/// Value of a final outcome when treated as a noisy objective sample.
pub const OUTCOME_VALUE: [f64; FINAL_OUTCOMES] = [0.0, 1.0, 0.5];

impl Outcome {
    pub const ALL: [Outcome; ALL_OUTCOMES] = [
        Outcome::Loss,
        Outcome::Win,
        Outcome::Draw,
        Outcome::Unknown,
        Outcome::InProgress,
    ];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            Outcome::Loss => 0,
            Outcome::Win => 1,
            Outcome::Draw => 2,
            Outcome::Unknown => 3,
            Outcome::InProgress => 4,
        }
    }

    #[inline]
    pub fn is_final(self) -> bool {
        self.index() < FINAL_OUTCOMES
    }

    /// Objective value used by the stochastic-approximation policies;
    /// `None` for a game without a usable result.
    pub fn value(self) -> Option<f64> {
        OUTCOME_VALUE.get(self.index()).copied()
    }

    pub fn label(self) -> &'static str {
        match self {
            Outcome::Loss => "loss",
            Outcome::Win => "win",
            Outcome::Draw => "draw",
            Outcome::Unknown => "unknown",
            Outcome::InProgress => "in-progress",
        }
    }
}

/// Invalid construction parameters.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("selection size {selection} exceeds population size {population}")]
    SelectionExceedsPopulation { selection: usize, population: usize },
    #[error("selection size must be at least 2, got {0}")]
    SelectionTooSmall(usize),
    #[error("{name} must be positive, got {value}")]
    NonPositive { name: &'static str, value: f64 },
    #[error("{name} must lie in [{min}, {max}], got {value}")]
    OutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("dimension mismatch: expected {expected}, got {found}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("at least one dimension is required")]
    NoDimensions,
    #[error("the {0} policy needs a regression")]
    RegressionRequired(&'static str),
}

pub(crate) fn require_positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { name, value })
    }
}

pub(crate) fn require_range(
    name: &'static str,
    value: f64,
    min: f64,
    max: f64,
) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name,
            value,
            min,
            max,
        })
    }
}
