use super::{PolicyContext, SamplingPolicy};
use crate::observer::Observer;
use ndarray::Array1;
use rand::{RngExt, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use crate::types::ConfigError;

pub fn default_weight_replication_threshold() -> usize {
    0
}

pub fn default_weight_mcmc_steps() -> usize {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightConfig {
    /// Sample `i` replays sample `i - 1` while that point has been played
    /// fewer than `1 + i / threshold` times in a row; 0 never replays.
    #[serde(default = "default_weight_replication_threshold")]
    pub replication_threshold: usize,
    /// Metropolis steps per dimension.
    #[serde(default = "default_weight_mcmc_steps")]
    pub mcmc_steps: usize,
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self {
            replication_threshold: default_weight_replication_threshold(),
            mcmc_steps: default_weight_mcmc_steps(),
        }
    }
}

/// Samples from the localization weight, seen as a density on the box.
///
/// A Metropolis chain starting from the last sample (uniform for the first
/// one) runs `mcmc_steps · d` steps. Each step redraws a uniformly chosen
/// coordinate uniformly in `[-1, 1)` and accepts with probability
/// `min(1, w(x') / w(x))`.
pub struct WeightPolicy {
    config: WeightConfig,
    dimensions: usize,
    rng: StdRng,
}

impl WeightPolicy {
    pub fn new(dimensions: usize, config: WeightConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            config,
            dimensions,
            rng: StdRng::seed_from_u64(0),
        })
    }

    pub fn config(&self) -> &WeightConfig {
        &self.config
    }

    pub(crate) fn draw(&mut self, ctx: &mut PolicyContext<'_>) -> Array1<f64> {
        let results = ctx.results;
        let regression = ctx.regression();
        let i = results.len();
        let threshold = self.config.replication_threshold;
        if threshold > 0 && i > 0 {
            let played = regression.replications(regression.entry_of(i - 1));
            if played < 1 + i / threshold {
                return results.sample(i - 1).to_owned();
            }
        }

        let mut x = match i.checked_sub(1) {
            Some(last) => results.sample(last).to_owned(),
            None => Array1::from_shape_fn(self.dimensions, |_| self.rng.random_range(-1.0..1.0)),
        };
        let mut log_weight = regression.log_weight(x.view());
        for _ in 0..self.config.mcmc_steps * self.dimensions {
            let axis = self.rng.random_range(0..self.dimensions);
            let previous = x[axis];
            x[axis] = self.rng.random_range(-1.0..1.0);
            let proposal = regression.log_weight(x.view());
            if self.rng.random::<f64>() < (proposal - log_weight).exp() {
                log_weight = proposal;
            } else {
                x[axis] = previous;
            }
        }
        x
    }
}

impl Observer for WeightPolicy {}

impl SamplingPolicy for WeightPolicy {
    fn next_sample(&mut self, _index: usize, ctx: &mut PolicyContext<'_>) -> Array1<f64> {
        self.draw(ctx)
    }

    fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    fn needs_regression(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::Results;
    use crate::parametric::QuadraticFunction;
    use crate::regression::{Regression, RegressionConfig};
    use crate::types::Outcome;
    use ndarray::array;

    fn regression() -> Regression {
        let config = RegressionConfig {
            auto_localize: false,
            ..RegressionConfig::default()
        };
        Regression::new(Box::new(QuadraticFunction::new(1)), config).expect("valid")
    }

    fn feed(regression: &mut Regression, results: &mut Results, x: f64) {
        let index = results.add_sample(array![x]);
        regression.on_sample(results);
        results.add_outcome(index, Outcome::Win);
        regression.on_outcome(results, index);
    }

    #[test]
    fn replay_allowance_grows_with_the_sample_index() {
        let config = WeightConfig {
            replication_threshold: 2,
            ..WeightConfig::default()
        };
        let mut policy = WeightPolicy::new(1, config).expect("valid");
        policy.seed(3);
        let mut regression = regression();
        let mut results = Results::new(1);
        for x in [0.1, 0.2, 0.3, 0.5] {
            feed(&mut regression, &mut results, x);
        }
        // Index i allows runs of 1 + i/2 plays: 3 at i = 4 and 5, 4 at i = 6.
        for i in 4..7 {
            let mut ctx = PolicyContext::new(&results, Some(&mut regression));
            assert_eq!(policy.next_sample(i, &mut ctx), array![0.5], "index {i}");
            drop(ctx);
            feed(&mut regression, &mut results, 0.5);
        }
        assert_eq!(regression.replications(regression.entry_of(6)), 4);
        let mut ctx = PolicyContext::new(&results, Some(&mut regression));
        assert_ne!(policy.next_sample(7, &mut ctx), array![0.5]);
    }

    #[test]
    fn the_chain_visits_every_axis() {
        let mut regression = {
            let config = RegressionConfig {
                auto_localize: false,
                ..RegressionConfig::default()
            };
            Regression::new(Box::new(QuadraticFunction::new(3)), config).expect("valid")
        };
        let mut results = Results::new(3);
        let index = results.add_sample(array![0.0, 0.0, 0.0]);
        regression.on_sample(&results);
        results.add_outcome(index, Outcome::Win);
        regression.on_outcome(&results, index);
        let config = WeightConfig {
            mcmc_steps: 10,
            ..WeightConfig::default()
        };
        let mut policy = WeightPolicy::new(3, config).expect("valid");
        policy.seed(21);
        let mut ctx = PolicyContext::new(&results, Some(&mut regression));
        // Uniform weights accept every proposal, so 30 steps on random axes
        // move each coordinate away from the start.
        let x = policy.next_sample(1, &mut ctx);
        assert!(x.iter().all(|&v| v != 0.0 && (-1.0..1.0).contains(&v)), "{x}");
    }

    #[test]
    fn early_samples_are_not_replayed() {
        let mut regression = regression();
        let mut results = Results::new(1);
        feed(&mut regression, &mut results, 0.4);
        let config = WeightConfig {
            replication_threshold: 3,
            ..WeightConfig::default()
        };
        let mut policy = WeightPolicy::new(1, config).expect("valid");
        let mut ctx = PolicyContext::new(&results, Some(&mut regression));
        assert_ne!(policy.next_sample(1, &mut ctx), array![0.4]);
    }

    #[test]
    fn uniform_weights_give_points_in_the_box() {
        let mut regression = regression();
        let results = Results::new(1);
        let mut policy = WeightPolicy::new(1, WeightConfig::default()).expect("valid");
        policy.seed(12);
        let mut ctx = PolicyContext::new(&results, Some(&mut regression));
        for i in 0..20 {
            let x = policy.next_sample(i, &mut ctx);
            assert!((-1.0..1.0).contains(&x[0]));
        }
    }
}
