use super::spsa::rademacher;
use super::{PolicyContext, SamplingPolicy, check_index};
use crate::estimator::MaxEstimator;
use crate::linalg::symmetric_eigen;
use crate::linalg::utils::{bound, clamp_to_box};
use crate::observer::{Observer, Results};
use crate::types::{ConfigError, Outcome, require_positive, require_range};
use ndarray::{Array1, Array2};
use rand::{SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub fn default_spsa2_a() -> f64 {
    1.0
}

pub fn default_spsa2_big_a() -> f64 {
    0.0
}

pub fn default_spsa2_c() -> f64 {
    1e-5
}

pub fn default_spsa2_alpha() -> f64 {
    1.0
}

pub fn default_spsa2_gamma() -> f64 {
    1.0 / 6.0
}

pub fn default_spsa2_d() -> f64 {
    0.501
}

pub fn default_spsa2_w() -> f64 {
    0.1
}

pub fn default_spsa2_regularization() -> f64 {
    0.01
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Spsa2Config {
    #[serde(default = "default_spsa2_a")]
    pub a: f64,
    #[serde(default = "default_spsa2_big_a")]
    pub big_a: f64,
    #[serde(default = "default_spsa2_c")]
    pub c: f64,
    #[serde(default = "default_spsa2_alpha")]
    pub alpha: f64,
    #[serde(default = "default_spsa2_gamma")]
    pub gamma: f64,
    /// Decay exponent of the Hessian averaging weight `(w / (k + 1))^d`.
    #[serde(default = "default_spsa2_d")]
    pub d: f64,
    #[serde(default = "default_spsa2_w")]
    pub w: f64,
    /// `δ` in the eigenvalue map `λ ↦ √(λ² + δ)`.
    #[serde(default = "default_spsa2_regularization")]
    pub regularization: f64,
}

impl Default for Spsa2Config {
    fn default() -> Self {
        Self {
            a: default_spsa2_a(),
            big_a: default_spsa2_big_a(),
            c: default_spsa2_c(),
            alpha: default_spsa2_alpha(),
            gamma: default_spsa2_gamma(),
            d: default_spsa2_d(),
            w: default_spsa2_w(),
            regularization: default_spsa2_regularization(),
        }
    }
}

impl Spsa2Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("a", self.a)?;
        require_range("big_a", self.big_a, 0.0, f64::MAX)?;
        require_positive("c", self.c)?;
        require_positive("alpha", self.alpha)?;
        require_positive("gamma", self.gamma)?;
        require_positive("d", self.d)?;
        require_positive("w", self.w)?;
        require_positive("regularization", self.regularization)
    }

    pub fn a_k(&self, k: usize) -> f64 {
        (self.a / (k as f64 + 1.0 + self.big_a)).powf(self.alpha)
    }

    pub fn c_k(&self, k: usize) -> f64 {
        (self.c / (k as f64 + 1.0)).powf(self.gamma)
    }

    pub fn w_k(&self, k: usize) -> f64 {
        (self.w / (k as f64 + 1.0)).powf(self.d)
    }
}

struct PendingGroup {
    delta: Array1<f64>,
    delta_tilde: Array1<f64>,
    outcomes: [Option<Outcome>; 4],
}

/// Second-order SPSA.
///
/// Iteration `k` takes four samples: `θ ± c_k Δ` and the same two points
/// shifted by `c_k Δ̃`. The first pair estimates the gradient, the shifted
/// pair a gradient difference from which a symmetric Hessian estimate
/// follows. The running Hessian average `H̄` is made definite through its
/// eigen-decomposition, `H̿ = V diag(√(λ² + δ)) Vᵀ`, and `θ` steps by
/// `a_k H̿⁻¹ ĝ`.
pub struct Spsa2 {
    config: Spsa2Config,
    theta: Array1<f64>,
    hessian: Array2<f64>,
    hessian_updates: usize,
    pending: HashMap<usize, PendingGroup>,
    requested: usize,
    rng: StdRng,
}

impl Spsa2 {
    pub fn new(dimensions: usize, config: Spsa2Config) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            theta: Array1::zeros(dimensions),
            hessian: Array2::zeros((dimensions, dimensions)),
            hessian_updates: 0,
            pending: HashMap::new(),
            requested: 0,
            rng: StdRng::seed_from_u64(0),
        })
    }

    pub fn theta(&self) -> &Array1<f64> {
        &self.theta
    }

    /// Running average of the Hessian estimates.
    pub fn hessian(&self) -> &Array2<f64> {
        &self.hessian
    }

    pub fn updates(&self) -> usize {
        self.hessian_updates
    }

    fn apply(&mut self, k: usize, group: &PendingGroup, y: [f64; 4]) {
        let n = self.theta.len();
        let c = self.config.c_k(k);
        let c_tilde = c;
        let gradient = Array1::from_shape_fn(n, |i| (y[0] - y[1]) / (2.0 * c * group.delta[i]));
        let gradient_change = Array1::from_shape_fn(n, |i| {
            ((y[2] - y[0]) - (y[3] - y[1])) / (c_tilde * group.delta_tilde[i])
        });
        let estimate = Array2::from_shape_fn((n, n), |(i, j)| {
            0.5 * (gradient_change[i] / (2.0 * c * group.delta[j])
                + gradient_change[j] / (2.0 * c * group.delta[i]))
        });

        let w = if self.hessian_updates == 0 {
            1.0
        } else {
            self.config.w_k(k)
        };
        self.hessian = &self.hessian * (1.0 - w) + &estimate * w;
        self.hessian_updates += 1;

        let (values, vectors) = symmetric_eigen(self.hessian.view());
        let delta = self.config.regularization;
        // H̿⁻¹ ĝ = V diag(1 / √(λ² + δ)) Vᵀ ĝ
        let mut projected = vectors.t().dot(&gradient);
        for (p, lambda) in projected.iter_mut().zip(values.iter()) {
            *p /= (lambda * lambda + delta).sqrt();
        }
        let step = vectors.dot(&projected);

        let a_k = self.config.a_k(k);
        let limit = 1.0 - c - c_tilde;
        for (theta, s) in self.theta.iter_mut().zip(step.iter()) {
            *theta = bound(*theta + a_k * s, limit.max(0.0));
        }
    }
}

impl Observer for Spsa2 {
    fn on_reset(&mut self, _results: &Results) {
        self.theta.fill(0.0);
        self.hessian.fill(0.0);
        self.hessian_updates = 0;
        self.pending.clear();
        self.requested = 0;
    }

    fn on_outcome(&mut self, results: &Results, index: usize) {
        let k = index / 4;
        let Some(group) = self.pending.get_mut(&k) else {
            log::warn!("ignoring outcome {index}: no pending perturbation");
            return;
        };
        group.outcomes[index % 4] = Some(results.outcome(index));
        let [Some(o0), Some(o1), Some(o2), Some(o3)] = group.outcomes else {
            return;
        };
        let Some(group) = self.pending.remove(&k) else {
            return;
        };
        match (o0.value(), o1.value(), o2.value(), o3.value()) {
            (Some(y0), Some(y1), Some(y2), Some(y3)) => self.apply(k, &group, [y0, y1, y2, y3]),
            _ => log::debug!("perturbation {k} has an unresolved game, skipping its update"),
        }
    }
}

impl SamplingPolicy for Spsa2 {
    fn next_sample(&mut self, index: usize, _ctx: &mut PolicyContext<'_>) -> Array1<f64> {
        check_index(self.requested, index);
        self.requested += 1;
        let k = index / 4;
        let c = self.config.c_k(k);
        let n = self.theta.len();
        let group = self.pending.entry(k).or_insert_with(|| PendingGroup {
            delta: rademacher(&mut self.rng, n),
            delta_tilde: rademacher(&mut self.rng, n),
            outcomes: [None; 4],
        });
        let mut x = self.theta.clone();
        let side = if index % 2 == 0 { c } else { -c };
        x.scaled_add(side, &group.delta);
        if index % 4 >= 2 {
            x.scaled_add(c, &group.delta_tilde);
        }
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

impl MaxEstimator for Spsa2 {
    fn max_parameter(&mut self) -> Option<Array1<f64>> {
        Some(self.theta.clone())
    }
}
