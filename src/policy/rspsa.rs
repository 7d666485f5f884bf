use super::spsa::rademacher;
use super::{PolicyContext, SamplingPolicy, check_index};
use crate::estimator::MaxEstimator;
use crate::linalg::utils::{bound, clamp_to_box};
use crate::observer::{Observer, Results};
use crate::types::{ConfigError, Outcome, require_positive, require_range};
use ndarray::Array1;
use rand::{SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub fn default_rspsa_batch() -> usize {
    100
}

pub fn default_rspsa_batch_growth() -> f64 {
    1.15
}

pub fn default_rspsa_eta_plus() -> f64 {
    1.5
}

pub fn default_rspsa_eta_minus() -> f64 {
    0.4
}

pub fn default_rspsa_min_step() -> f64 {
    0.001
}

pub fn default_rspsa_max_step() -> f64 {
    0.5
}

pub fn default_rspsa_initial_step() -> f64 {
    0.5
}

pub fn default_rspsa_rho() -> f64 {
    2.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RspsaConfig {
    /// Perturbation pairs averaged into the first gradient estimate.
    #[serde(default = "default_rspsa_batch")]
    pub batch: usize,
    #[serde(default = "default_rspsa_batch_growth")]
    pub batch_growth: f64,
    #[serde(default = "default_rspsa_eta_plus")]
    pub eta_plus: f64,
    #[serde(default = "default_rspsa_eta_minus")]
    pub eta_minus: f64,
    #[serde(default = "default_rspsa_min_step")]
    pub min_step: f64,
    #[serde(default = "default_rspsa_max_step")]
    pub max_step: f64,
    #[serde(default = "default_rspsa_initial_step")]
    pub initial_step: f64,
    /// Ratio of step size to perturbation size.
    #[serde(default = "default_rspsa_rho")]
    pub rho: f64,
}

impl Default for RspsaConfig {
    fn default() -> Self {
        Self {
            batch: default_rspsa_batch(),
            batch_growth: default_rspsa_batch_growth(),
            eta_plus: default_rspsa_eta_plus(),
            eta_minus: default_rspsa_eta_minus(),
            min_step: default_rspsa_min_step(),
            max_step: default_rspsa_max_step(),
            initial_step: default_rspsa_initial_step(),
            rho: default_rspsa_rho(),
        }
    }
}

impl RspsaConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch == 0 {
            return Err(ConfigError::NonPositive {
                name: "batch",
                value: 0.0,
            });
        }
        require_range("batch_growth", self.batch_growth, 1.0, f64::MAX)?;
        require_range("eta_plus", self.eta_plus, 1.0, f64::MAX)?;
        require_range("eta_minus", self.eta_minus, f64::MIN_POSITIVE, 1.0)?;
        require_positive("min_step", self.min_step)?;
        require_range("max_step", self.max_step, self.min_step, f64::MAX)?;
        require_range("initial_step", self.initial_step, self.min_step, self.max_step)?;
        require_positive("rho", self.rho)
    }
}

struct PendingPair {
    delta: Array1<f64>,
    perturbation: Array1<f64>,
    outcomes: [Option<Outcome>; 2],
}

/// SPSA with Rprop-style per-coordinate steps.
///
/// Gradient estimates are averaged over batches of perturbation pairs whose
/// size grows geometrically. At each batch boundary every coordinate moves
/// by its own step in the direction of the averaged gradient; the step grows
/// by `η⁺` while the gradient sign holds and shrinks by `η⁻` when it flips,
/// in which case the coordinate waits one batch. Perturbations are the
/// current steps divided by `ρ`. Iteration `k` samples `θ - pΔ` at index `2k`
/// and `θ + pΔ` at `2k + 1`.
pub struct Rspsa {
    config: RspsaConfig,
    theta: Array1<f64>,
    step: Array1<f64>,
    previous_gradient: Array1<f64>,
    gradient_sum: Array1<f64>,
    batch_pairs: usize,
    batch_size: f64,
    batches: usize,
    pending: HashMap<usize, PendingPair>,
    requested: usize,
    rng: StdRng,
}

impl Rspsa {
    pub fn new(dimensions: usize, config: RspsaConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            theta: Array1::zeros(dimensions),
            step: Array1::from_elem(dimensions, config.initial_step),
            previous_gradient: Array1::zeros(dimensions),
            gradient_sum: Array1::zeros(dimensions),
            batch_pairs: 0,
            batch_size: config.batch as f64,
            batches: 0,
            pending: HashMap::new(),
            requested: 0,
            rng: StdRng::seed_from_u64(0),
            config,
        })
    }

    pub fn theta(&self) -> &Array1<f64> {
        &self.theta
    }

    pub fn steps(&self) -> &Array1<f64> {
        &self.step
    }

    /// Completed batches.
    pub fn batches(&self) -> usize {
        self.batches
    }

    /// Pairs the current batch needs before the next update.
    pub fn batch_size(&self) -> usize {
        self.batch_size.round() as usize
    }

    fn end_batch(&mut self) {
        let gradient = &self.gradient_sum / self.batch_pairs as f64;
        let config = &self.config;
        for j in 0..self.theta.len() {
            let g = gradient[j];
            let agreement = g * self.previous_gradient[j];
            if agreement < 0.0 {
                self.step[j] = (self.step[j] * config.eta_minus).max(config.min_step);
                self.previous_gradient[j] = 0.0;
                continue;
            }
            if agreement > 0.0 {
                self.step[j] = (self.step[j] * config.eta_plus).min(config.max_step);
            }
            if g != 0.0 {
                self.theta[j] = bound(self.theta[j] + g.signum() * self.step[j], 1.0);
            }
            self.previous_gradient[j] = g;
        }
        self.gradient_sum.fill(0.0);
        self.batch_pairs = 0;
        self.batches += 1;
        self.batch_size *= config.batch_growth;
        log::trace!("rspsa batch {} done, next batch {} pairs", self.batches, self.batch_size());
    }
}

impl Observer for Rspsa {
    fn on_reset(&mut self, _results: &Results) {
        self.theta.fill(0.0);
        self.step.fill(self.config.initial_step);
        self.previous_gradient.fill(0.0);
        self.gradient_sum.fill(0.0);
        self.batch_pairs = 0;
        self.batch_size = self.config.batch as f64;
        self.batches = 0;
        self.pending.clear();
        self.requested = 0;
    }

    fn on_outcome(&mut self, results: &Results, index: usize) {
        let k = index / 2;
        let Some(pair) = self.pending.get_mut(&k) else {
            log::warn!("ignoring outcome {index}: no pending perturbation");
            return;
        };
        pair.outcomes[index % 2] = Some(results.outcome(index));
        let [Some(minus), Some(plus)] = pair.outcomes else {
            return;
        };
        let Some(pair) = self.pending.remove(&k) else {
            return;
        };
        let (Some(minus), Some(plus)) = (minus.value(), plus.value()) else {
            log::debug!("perturbation {k} has an unresolved game, left out of the batch");
            return;
        };
        for j in 0..self.theta.len() {
            self.gradient_sum[j] += (plus - minus) / (2.0 * pair.perturbation[j] * pair.delta[j]);
        }
        self.batch_pairs += 1;
        if self.batch_pairs >= self.batch_size() {
            self.end_batch();
        }
    }
}

impl SamplingPolicy for Rspsa {
    fn next_sample(&mut self, index: usize, _ctx: &mut PolicyContext<'_>) -> Array1<f64> {
        check_index(self.requested, index);
        self.requested += 1;
        let n = self.theta.len();
        let rho = self.config.rho;
        let step = &self.step;
        let pair = self.pending.entry(index / 2).or_insert_with(|| PendingPair {
            delta: rademacher(&mut self.rng, n),
            perturbation: step / rho,
            outcomes: [None, None],
        });
        let mut x = self.theta.clone();
        let sign = if index % 2 == 0 { -1.0 } else { 1.0 };
        x.zip_mut_with(&(&pair.perturbation * &pair.delta), |xi, &p| *xi += sign * p);
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

impl MaxEstimator for Rspsa {
    fn max_parameter(&mut self) -> Option<Array1<f64>> {
        Some(self.theta.clone())
    }
}
