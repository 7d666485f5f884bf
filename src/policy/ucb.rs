use super::{PolicyContext, SamplingPolicy, Uniform};
use crate::observer::Observer;
use crate::regression::objectives::RatingUcb;
use crate::solver::conjugate_gradient;
use crate::types::{ConfigError, Outcome, require_range};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

pub fn default_ucb_alpha() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UcbConfig {
    /// Exploration scale; the bonus is `alpha √(ln N)` posterior deviations.
    #[serde(default = "default_ucb_alpha")]
    pub alpha: f64,
}

impl Default for UcbConfig {
    fn default() -> Self {
        Self {
            alpha: default_ucb_alpha(),
        }
    }
}

/// Maximizes an upper confidence bound of the posterior rating.
///
/// Conjugate gradient starts from a uniform draw. With fewer than two
/// samples, no win or no loss yet, or an indefinite posterior, the uniform
/// draw itself is returned.
pub struct Ucb {
    config: UcbConfig,
    uniform: Uniform,
}

impl Ucb {
    pub fn new(dimensions: usize, config: UcbConfig) -> Result<Self, ConfigError> {
        require_range("alpha", config.alpha, 0.0, f64::MAX)?;
        Ok(Self {
            config,
            uniform: Uniform::new(dimensions),
        })
    }
}

impl Observer for Ucb {}

impl SamplingPolicy for Ucb {
    fn next_sample(&mut self, _index: usize, ctx: &mut PolicyContext<'_>) -> Array1<f64> {
        let mut x = self.uniform.draw();
        let enough = ctx.results.len() >= 2;
        let regression = ctx.regression();
        if !enough || regression.count(Outcome::Win) == 0 || regression.count(Outcome::Loss) == 0 {
            return x;
        }
        let Some(view) = regression.posterior_view() else {
            log::debug!("ucb: posterior not definite, sampling uniformly");
            return x;
        };
        let mut objective = RatingUcb::new(view, self.config.alpha);
        conjugate_gradient(&mut objective, &mut x);
        x
    }

    fn seed(&mut self, seed: u64) {
        self.uniform.seed(seed);
    }

    fn needs_regression(&self) -> bool {
        true
    }
}
