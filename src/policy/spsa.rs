use super::{PolicyContext, SamplingPolicy, check_index};
use crate::estimator::MaxEstimator;
use crate::linalg::utils::{bound, clamp_to_box};
use crate::observer::{Observer, Results};
use crate::types::{ConfigError, Outcome, require_positive, require_range};
use ndarray::Array1;
use rand::{RngExt, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub fn default_spsa_a() -> f64 {
    0.05
}

pub fn default_spsa_big_a() -> f64 {
    0.0
}

pub fn default_spsa_c() -> f64 {
    1e-5
}

pub fn default_spsa_alpha() -> f64 {
    0.602
}

pub fn default_spsa_gamma() -> f64 {
    0.101
}

/// Gain sequences `a_k = (a / (k + 1 + A))^α` and `c_k = (c / (k + 1))^γ`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpsaConfig {
    #[serde(default = "default_spsa_a")]
    pub a: f64,
    #[serde(default = "default_spsa_big_a")]
    pub big_a: f64,
    #[serde(default = "default_spsa_c")]
    pub c: f64,
    #[serde(default = "default_spsa_alpha")]
    pub alpha: f64,
    #[serde(default = "default_spsa_gamma")]
    pub gamma: f64,
}

impl Default for SpsaConfig {
    fn default() -> Self {
        Self {
            a: default_spsa_a(),
            big_a: default_spsa_big_a(),
            c: default_spsa_c(),
            alpha: default_spsa_alpha(),
            gamma: default_spsa_gamma(),
        }
    }
}

impl SpsaConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("a", self.a)?;
        require_range("big_a", self.big_a, 0.0, f64::MAX)?;
        require_positive("c", self.c)?;
        require_positive("alpha", self.alpha)?;
        require_positive("gamma", self.gamma)
    }

    pub fn a_k(&self, k: usize) -> f64 {
        (self.a / (k as f64 + 1.0 + self.big_a)).powf(self.alpha)
    }

    pub fn c_k(&self, k: usize) -> f64 {
        (self.c / (k as f64 + 1.0)).powf(self.gamma)
    }
}

/// Random `±1` perturbation direction.
pub(crate) fn rademacher(rng: &mut StdRng, dimensions: usize) -> Array1<f64> {
    Array1::from_shape_fn(dimensions, |_| if rng.random::<bool>() { 1.0 } else { -1.0 })
}

/// One perturbation pair waiting for its outcomes.
struct PendingPair {
    delta: Array1<f64>,
    outcomes: [Option<Outcome>; 2],
}

/// Simultaneous perturbation stochastic approximation.
///
/// Iteration `k` samples `θ + c_k Δ` (index `2k`) then `θ - c_k Δ`
/// (index `2k + 1`); once both outcomes are in, `θ` moves by
/// `a_k (y⁺ - y⁻) / (2 c_k Δ)`. Pairs may complete in any order.
pub struct Spsa {
    config: SpsaConfig,
    theta: Array1<f64>,
    pending: HashMap<usize, PendingPair>,
    requested: usize,
    updates: usize,
    rng: StdRng,
}

impl Spsa {
    pub fn new(dimensions: usize, config: SpsaConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            theta: Array1::zeros(dimensions),
            pending: HashMap::new(),
            requested: 0,
            updates: 0,
            rng: StdRng::seed_from_u64(0),
        })
    }

    pub fn theta(&self) -> &Array1<f64> {
        &self.theta
    }

    /// Completed gradient steps.
    pub fn updates(&self) -> usize {
        self.updates
    }

    fn apply(&mut self, k: usize, pair: PendingPair, plus: f64, minus: f64) {
        let a_k = self.config.a_k(k);
        let c_k = self.config.c_k(k);
        let limit = 1.0 - c_k;
        for (theta, delta) in self.theta.iter_mut().zip(pair.delta.iter()) {
            let gradient = (plus - minus) / (2.0 * c_k * delta);
            *theta = bound(*theta + a_k * gradient, limit);
        }
        self.updates += 1;
    }
}

impl Observer for Spsa {
    fn on_reset(&mut self, _results: &Results) {
        self.theta.fill(0.0);
        self.pending.clear();
        self.requested = 0;
        self.updates = 0;
    }

    fn on_outcome(&mut self, results: &Results, index: usize) {
        let k = index / 2;
        let Some(pair) = self.pending.get_mut(&k) else {
            log::warn!("ignoring outcome {index}: no pending perturbation");
            return;
        };
        pair.outcomes[index % 2] = Some(results.outcome(index));
        let [Some(plus), Some(minus)] = pair.outcomes else {
            return;
        };
        let Some(pair) = self.pending.remove(&k) else {
            return;
        };
        match (plus.value(), minus.value()) {
            (Some(plus), Some(minus)) => self.apply(k, pair, plus, minus),
            _ => log::debug!("perturbation {k} has an unresolved game, skipping its update"),
        }
    }
}

impl SamplingPolicy for Spsa {
    fn next_sample(&mut self, index: usize, _ctx: &mut PolicyContext<'_>) -> Array1<f64> {
        check_index(self.requested, index);
        self.requested += 1;
        let k = index / 2;
        let c_k = self.config.c_k(k);
        let pair = self.pending.entry(k).or_insert_with(|| PendingPair {
            delta: rademacher(&mut self.rng, self.theta.len()),
            outcomes: [None, None],
        });
        let sign = if index % 2 == 0 { c_k } else { -c_k };
        let mut x = self.theta.clone();
        x.scaled_add(sign, &pair.delta);
        clamp_to_box(x)
    }

    fn is_flexible(&self) -> bool {
        false
    }

    fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    fn as_max_estimator(&mut self) -> Option<&mut dyn MaxEstimator> {
        Some(self)
    }
}

impl MaxEstimator for Spsa {
    fn max_parameter(&mut self) -> Option<Array1<f64>> {
        Some(self.theta.clone())
    }
}
