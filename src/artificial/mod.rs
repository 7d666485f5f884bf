//! Synthetic tuning problems with a known optimum, and the statistics used
//! to score policies on them.

mod problems;

pub use problems::{
    AbsNd, Complicated1d, Discontinuous, Fish1d, IllCorrelated, Log1d, Power1d, Quadratic1d,
    SinExp, ZeroNd,
};

use crate::probability::logistic;
use crate::types::{ConfigError, Outcome};
use ndarray::{Array1, ArrayView1};
use rand::{RngExt, rngs::StdRng};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProblemError {
    #[error("unknown problem '{0}'")]
    UnknownProblem(String),
    #[error("unknown policy '{0}'")]
    UnknownPolicy(String),
    #[error("problem '{name}' is {fixed}-dimensional, got {requested} dimensions")]
    FixedDimensions {
        name: &'static str,
        fixed: usize,
        requested: usize,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// A noisy game whose win probability is `f(strength(x))`.
pub trait ArtificialProblem: Send + Sync {
    fn dimensions(&self) -> usize;

    fn strength(&self, x: ArrayView1<'_, f64>) -> f64;

    fn proba(&self, x: ArrayView1<'_, f64>) -> f64 {
        logistic(self.strength(x))
    }

    fn optimal_parameters(&self) -> Array1<f64>;

    fn optimal_proba(&self) -> f64 {
        self.proba(self.optimal_parameters().view())
    }

    /// One Bernoulli game at `x`.
    fn outcome(&self, x: ArrayView1<'_, f64>, rng: &mut StdRng) -> Outcome {
        if rng.random::<f64>() < self.proba(x) {
            Outcome::Win
        } else {
            Outcome::Loss
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProblemKind {
    Log1d,
    Power1d,
    Quadratic1d,
    IllCorrelated,
    Fish1d,
    Complicated1d,
    SinExp,
    Discontinuous,
    AbsNd,
    ZeroNd,
}

impl ProblemKind {
    pub const ALL: [ProblemKind; 10] = [
        ProblemKind::Log1d,
        ProblemKind::Power1d,
        ProblemKind::Quadratic1d,
        ProblemKind::IllCorrelated,
        ProblemKind::Fish1d,
        ProblemKind::Complicated1d,
        ProblemKind::SinExp,
        ProblemKind::Discontinuous,
        ProblemKind::AbsNd,
        ProblemKind::ZeroNd,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ProblemKind::Log1d => "log-1d",
            ProblemKind::Power1d => "power-1d",
            ProblemKind::Quadratic1d => "quadratic-1d",
            ProblemKind::IllCorrelated => "ill-correlated",
            ProblemKind::Fish1d => "fish-1d",
            ProblemKind::Complicated1d => "complicated-1d",
            ProblemKind::SinExp => "sin-exp",
            ProblemKind::Discontinuous => "discontinuous",
            ProblemKind::AbsNd => "abs-nd",
            ProblemKind::ZeroNd => "zero-nd",
        }
    }

    pub fn from_name(name: &str) -> Result<ProblemKind, ProblemError> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == name)
            .ok_or_else(|| ProblemError::UnknownProblem(name.to_string()))
    }

    /// Dimension count fixed by the problem, `None` for the N-dimensional ones.
    pub fn fixed_dimensions(self) -> Option<usize> {
        match self {
            ProblemKind::AbsNd | ProblemKind::ZeroNd => None,
            ProblemKind::IllCorrelated => Some(2),
            _ => Some(1),
        }
    }

    /// Builds the problem; `dimensions` only matters for the N-dimensional
    /// ones and must otherwise match (or be `None`).
    pub fn build(
        self,
        dimensions: Option<usize>,
    ) -> Result<Box<dyn ArtificialProblem>, ProblemError> {
        let dimensions = match (self.fixed_dimensions(), dimensions) {
            (Some(fixed), Some(requested)) if fixed != requested => {
                return Err(ProblemError::FixedDimensions {
                    name: self.name(),
                    fixed,
                    requested,
                });
            }
            (Some(fixed), _) => fixed,
            (None, Some(0)) => return Err(ConfigError::NoDimensions.into()),
            (None, requested) => requested.unwrap_or(2),
        };
        Ok(match self {
            ProblemKind::Log1d => Box::new(Log1d),
            ProblemKind::Power1d => Box::new(Power1d),
            ProblemKind::Quadratic1d => Box::new(Quadratic1d),
            ProblemKind::IllCorrelated => Box::new(IllCorrelated),
            ProblemKind::Fish1d => Box::new(Fish1d),
            ProblemKind::Complicated1d => Box::new(Complicated1d::new()),
            ProblemKind::SinExp => Box::new(SinExp),
            ProblemKind::Discontinuous => Box::new(Discontinuous),
            ProblemKind::AbsNd => Box::new(AbsNd::new(dimensions)),
            ProblemKind::ZeroNd => Box::new(ZeroNd::new(dimensions)),
        })
    }
}

/// Regret of every replica at one sample count.
#[derive(Clone, Debug, Default)]
pub struct CheckPoint {
    pub samples: usize,
    errors: Vec<f64>,
    misses: usize,
}

impl CheckPoint {
    pub fn new(samples: usize) -> Self {
        Self {
            samples,
            errors: Vec::new(),
            misses: 0,
        }
    }

    /// Adds the regret of the next seed; `missed` marks a replica that had
    /// no estimate yet.
    pub fn record(&mut self, error: f64, missed: bool) {
        self.errors.push(error);
        if missed {
            self.misses += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[f64] {
        &self.errors
    }

    pub fn misses(&self) -> usize {
        self.misses
    }

    pub fn mean(&self) -> f64 {
        if self.errors.is_empty() {
            return 0.0;
        }
        self.errors.iter().sum::<f64>() / self.errors.len() as f64
    }

    /// Largest regret and the replica it came from.
    pub fn max(&self) -> Option<(f64, usize)> {
        self.errors
            .iter()
            .copied()
            .enumerate()
            .fold(None, |best, (i, e)| match best {
                Some((b, _)) if b >= e => best,
                _ => Some((e, i)),
            })
    }

    /// Sample variance (n - 1 denominator).
    pub fn variance(&self) -> f64 {
        let n = self.errors.len();
        if n < 2 {
            return 0.0;
        }
        let mean = self.mean();
        self.errors.iter().map(|e| (e - mean) * (e - mean)).sum::<f64>() / (n - 1) as f64
    }

    /// Percentile `p` in `[0, 1]`, interpolating linearly between order
    /// statistics.
    pub fn percentile(&self, p: f64) -> f64 {
        if self.errors.is_empty() {
            return 0.0;
        }
        let mut sorted = self.errors.clone();
        sorted.sort_by(f64::total_cmp);
        let position = p.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
        let low = position.floor() as usize;
        let high = position.ceil() as usize;
        let t = position - low as f64;
        sorted[low] + t * (sorted[high] - sorted[low])
    }
}
