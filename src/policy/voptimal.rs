use super::{PolicyContext, SamplingPolicy, WeightConfig, WeightPolicy};
use crate::linalg::utils::on_border;
use crate::observer::Observer;
use crate::regression::objectives::VarianceDelta;
use crate::solver::{DiffFunction, conjugate_gradient};
use crate::types::{ConfigError, Outcome};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

pub fn default_voptimal_restarts() -> usize {
    0
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VOptimalConfig {
    /// Extra ascents started from fresh weight-policy draws.
    #[serde(default = "default_voptimal_restarts")]
    pub restarts: usize,
}

/// Samples where the win probability is least certain.
///
/// Once the regression has seen enough wins and enough losses, each ascent
/// of [`VarianceDelta`] starts from a draw of the seed [`WeightPolicy`] and
/// the best end point wins. A best point on the box boundary is rejected.
/// Whenever no sample comes out of the ascents, a second weight policy
/// supplies it.
pub struct VOptimal {
    config: VOptimalConfig,
    seeds: WeightPolicy,
    failure: WeightPolicy,
}

impl VOptimal {
    pub fn new(
        dimensions: usize,
        config: VOptimalConfig,
        weight: WeightConfig,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            config,
            seeds: WeightPolicy::new(dimensions, weight.clone())?,
            failure: WeightPolicy::new(dimensions, weight)?,
        })
    }

    fn ascend(starts: Vec<Array1<f64>>, ctx: &mut PolicyContext<'_>) -> Option<Array1<f64>> {
        let view = ctx.regression().posterior_view()?;
        let mut objective = VarianceDelta::new(view)?;
        let mut best: Option<(f64, Array1<f64>)> = None;
        for mut x in starts {
            conjugate_gradient(&mut objective, &mut x);
            let value = objective.output(x.view());
            if best.as_ref().is_none_or(|(b, _)| value > *b) {
                best = Some((value, x));
            }
        }
        let (_, x) = best?;
        (!on_border(x.view())).then_some(x)
    }
}

impl Observer for VOptimal {}

impl SamplingPolicy for VOptimal {
    fn next_sample(&mut self, _index: usize, ctx: &mut PolicyContext<'_>) -> Array1<f64> {
        let regression = ctx.regression();
        if VarianceDelta::ready(regression.count(Outcome::Win), regression.count(Outcome::Loss)) {
            let starts: Vec<Array1<f64>> = (0..=self.config.restarts)
                .map(|_| self.seeds.draw(ctx))
                .collect();
            if let Some(x) = Self::ascend(starts, ctx) {
                return x;
            }
            log::debug!("v-optimal: no interior maximum, using the weight policy");
        }
        self.failure.draw(ctx)
    }

    fn seed(&mut self, seed: u64) {
        self.seeds.seed(seed.wrapping_add(1));
        self.failure.seed(seed.wrapping_add(2));
    }

    fn needs_regression(&self) -> bool {
        true
    }
}
