//! Strategies that choose the next parameter vector to test.
//!
//! A policy is driven by [`crate::experiment::Experiment`]: `next_sample(i)`
//! is called with `i` equal to the number of samples requested so far, and
//! the observer callbacks follow once the sample is stored and once its
//! outcome is known. Policies that need the regression read it through the
//! [`PolicyContext`]; everything else is private state.
//!
//! Search-based policies never fail. When their statistical preconditions
//! are not met they delegate to a quasi-random or random sub-policy.

mod bast;
mod composite;
mod cross_entropy;
mod dyadic;
mod qlrmax;
mod rspsa;
mod spsa;
mod spsa2;
mod ucb;
mod uniform;
mod voptimal;
mod weight;

pub use bast::{Bast, BastConfig};
pub use composite::Composite;
pub use cross_entropy::{CrossEntropy, CrossEntropyConfig};
pub use dyadic::Dyadic;
pub use qlrmax::{QlrMax, QlrMaxConfig};
pub use rspsa::{Rspsa, RspsaConfig};
pub use spsa::{Spsa, SpsaConfig};
pub use spsa2::{Spsa2, Spsa2Config};
pub use ucb::{Ucb, UcbConfig};
pub use uniform::Uniform;
pub use voptimal::{VOptimal, VOptimalConfig};
pub use weight::{WeightConfig, WeightPolicy};

use crate::estimator::MaxEstimator;
use crate::observer::{Observer, Results};
use crate::regression::Regression;
use crate::types::ConfigError;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// What a policy may look at when proposing a sample.
pub struct PolicyContext<'a> {
    pub results: &'a Results,
    pub regression: Option<&'a mut Regression>,
}

impl<'a> PolicyContext<'a> {
    pub fn new(results: &'a Results, regression: Option<&'a mut Regression>) -> Self {
        Self {
            results,
            regression,
        }
    }

    /// The regression, for policies that cannot work without one.
    ///
    /// Panics when the driver was built without a regression.
    pub fn regression(&mut self) -> &mut Regression {
        match self.regression.as_deref_mut() {
            Some(regression) => regression,
            None => panic!("this sampling policy requires a regression"),
        }
    }
}

pub trait SamplingPolicy: Observer {
    fn next_sample(&mut self, index: usize, ctx: &mut PolicyContext<'_>) -> Array1<f64>;

    /// Whether the sample sequence can be reproduced without the outcome
    /// history.
    fn is_flexible(&self) -> bool {
        true
    }

    /// Reseeds every random generator the policy owns.
    fn seed(&mut self, seed: u64);

    /// The policy's own estimate of the optimum, if it keeps one.
    fn as_max_estimator(&mut self) -> Option<&mut dyn MaxEstimator> {
        None
    }

    /// Whether the policy reads the regression through its context.
    fn needs_regression(&self) -> bool {
        false
    }
}

/// Asserts the driver asks for samples in order.
pub(crate) fn check_index(expected: usize, index: usize) {
    assert_eq!(
        index, expected,
        "sample {index} requested out of sequence, expected {expected}"
    );
}

/// Policy families selectable by name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
    Uniform,
    Dyadic,
    Spsa,
    Spsa2,
    Rspsa,
    CrossEntropy,
    Bast,
    Ucb,
    VOptimal,
    Weight,
    QlrMax,
}

impl PolicyKind {
    pub const ALL: [PolicyKind; 11] = [
        PolicyKind::Uniform,
        PolicyKind::Dyadic,
        PolicyKind::Spsa,
        PolicyKind::Spsa2,
        PolicyKind::Rspsa,
        PolicyKind::CrossEntropy,
        PolicyKind::Bast,
        PolicyKind::Ucb,
        PolicyKind::VOptimal,
        PolicyKind::Weight,
        PolicyKind::QlrMax,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PolicyKind::Uniform => "uniform",
            PolicyKind::Dyadic => "dyadic",
            PolicyKind::Spsa => "spsa",
            PolicyKind::Spsa2 => "spsa2",
            PolicyKind::Rspsa => "rspsa",
            PolicyKind::CrossEntropy => "cross-entropy",
            PolicyKind::Bast => "bast",
            PolicyKind::Ucb => "ucb",
            PolicyKind::VOptimal => "v-optimal",
            PolicyKind::Weight => "weight",
            PolicyKind::QlrMax => "qlr-max",
        }
    }

    pub fn from_name(name: &str) -> Option<PolicyKind> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn needs_regression(self) -> bool {
        matches!(
            self,
            PolicyKind::Ucb | PolicyKind::VOptimal | PolicyKind::Weight | PolicyKind::QlrMax
        )
    }

    pub fn build(
        self,
        dimensions: usize,
        configs: &PolicyConfigs,
        seed: u64,
    ) -> Result<Box<dyn SamplingPolicy + Send>, ConfigError> {
        if dimensions == 0 {
            return Err(ConfigError::NoDimensions);
        }
        let mut policy: Box<dyn SamplingPolicy + Send> = match self {
            PolicyKind::Uniform => Box::new(Uniform::new(dimensions)),
            PolicyKind::Dyadic => Box::new(Dyadic::new(dimensions)),
            PolicyKind::Spsa => Box::new(Spsa::new(dimensions, configs.spsa.clone())?),
            PolicyKind::Spsa2 => Box::new(Spsa2::new(dimensions, configs.spsa2.clone())?),
            PolicyKind::Rspsa => Box::new(Rspsa::new(dimensions, configs.rspsa.clone())?),
            PolicyKind::CrossEntropy => {
                Box::new(CrossEntropy::new(dimensions, configs.cross_entropy.clone())?)
            }
            PolicyKind::Bast => Box::new(Bast::new(dimensions, configs.bast.clone())?),
            PolicyKind::Ucb => Box::new(Ucb::new(dimensions, configs.ucb.clone())?),
            PolicyKind::VOptimal => {
                Box::new(VOptimal::new(dimensions, configs.voptimal.clone(), configs.weight.clone())?)
            }
            PolicyKind::Weight => Box::new(WeightPolicy::new(dimensions, configs.weight.clone())?),
            PolicyKind::QlrMax => Box::new(QlrMax::new(dimensions, configs.qlr_max.clone())?),
        };
        policy.seed(seed);
        Ok(policy)
    }
}

/// Configuration of every policy family, as loaded from a JSON file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyConfigs {
    #[serde(default)]
    pub spsa: SpsaConfig,
    #[serde(default)]
    pub spsa2: Spsa2Config,
    #[serde(default)]
    pub rspsa: RspsaConfig,
    #[serde(default)]
    pub cross_entropy: CrossEntropyConfig,
    #[serde(default)]
    pub bast: BastConfig,
    #[serde(default)]
    pub ucb: UcbConfig,
    #[serde(default)]
    pub voptimal: VOptimalConfig,
    #[serde(default)]
    pub weight: WeightConfig,
    #[serde(default)]
    pub qlr_max: QlrMaxConfig,
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for kind in PolicyKind::ALL {
            assert_eq!(PolicyKind::from_name(kind.name()), Some(kind));
            let json = serde_json::to_string(&kind).expect("serializable");
            assert_eq!(json, format!("\"{}\"", kind.name()));
        }
        assert_eq!(PolicyKind::from_name("simplex"), None);
    }

    #[test]
    fn every_kind_builds_with_default_configs() {
        let configs = PolicyConfigs::default();
        for kind in PolicyKind::ALL {
            let policy = kind.build(2, &configs, 1).expect("defaults are valid");
            assert_eq!(policy.needs_regression(), kind.needs_regression());
        }
        assert!(PolicyKind::Uniform.build(0, &configs, 1).is_err());
    }

    #[test]
    #[should_panic(expected = "requires a regression")]
    fn missing_regression_is_a_contract_violation() {
        let results = Results::new(1);
        let mut ctx = PolicyContext::new(&results, None);
        ctx.regression();
    }
}
