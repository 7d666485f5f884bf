use super::{Dyadic, PolicyContext, SamplingPolicy};
use crate::observer::Observer;
use crate::types::{ConfigError, Outcome};
use ndarray::Array1;
use rand::{SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

pub fn default_qlr_max_draws() -> usize {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QlrMaxConfig {
    /// Posterior draws tried before falling back to the dyadic sequence.
    #[serde(default = "default_qlr_max_draws")]
    pub draws: usize,
}

impl Default for QlrMaxConfig {
    fn default() -> Self {
        Self {
            draws: default_qlr_max_draws(),
        }
    }
}

/// Thompson-style sampling: the maximum of the model under one draw from
/// the Laplace posterior.
pub struct QlrMax {
    config: QlrMaxConfig,
    fallback: Dyadic,
    rng: StdRng,
}

impl QlrMax {
    pub fn new(dimensions: usize, config: QlrMaxConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            config,
            fallback: Dyadic::new(dimensions),
            rng: StdRng::seed_from_u64(0),
        })
    }
}

impl Observer for QlrMax {}

impl SamplingPolicy for QlrMax {
    fn next_sample(&mut self, index: usize, ctx: &mut PolicyContext<'_>) -> Array1<f64> {
        let regression = ctx.regression();
        if regression.count(Outcome::Win) > 0 && regression.count(Outcome::Loss) > 0 {
            for _ in 0..self.config.draws {
                let params = regression.gaussian_sample(&mut self.rng);
                if let Some(x) = regression.pf().maximum(params.view()) {
                    return x;
                }
            }
            log::debug!("qlr-max: no posterior draw had a maximum, sampling dyadically");
        }
        self.fallback.point(index)
    }

    fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    fn needs_regression(&self) -> bool {
        true
    }
}
