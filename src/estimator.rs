//! Estimates of the parameter vector with the best win rate.

use crate::regression::Regression;
use ndarray::Array1;

/// Source of a current best-parameter estimate.
pub trait MaxEstimator {
    /// `None` while no estimate can be formed yet.
    fn max_parameter(&mut self) -> Option<Array1<f64>>;
}

/// Maximum of the MAP model, trusted only where the localization weight is
/// still 1. Elsewhere the weighted average of the samples is returned.
pub struct RegressionMapMax<'a> {
    regression: &'a mut Regression,
}

impl<'a> RegressionMapMax<'a> {
    pub fn new(regression: &'a mut Regression) -> Self {
        Self { regression }
    }
}

impl MaxEstimator for RegressionMapMax<'_> {
    fn max_parameter(&mut self) -> Option<Array1<f64>> {
        if self.regression.samples().is_empty() {
            return None;
        }
        let map = self.regression.map().clone();
        if let Some(x) = self.regression.pf().maximum(map.view()) {
            if self.regression.weight(x.view()) >= 1.0 {
                return Some(x);
            }
        }
        self.regression.average_sample()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::{Observer, Results};
    use crate::parametric::QuadraticFunction;
    use crate::types::Outcome;
    use ndarray::array;

    fn feed(regression: &mut Regression, results: &mut Results, x: f64, outcome: Outcome) {
        let index = results.add_sample(array![x]);
        regression.on_sample(results);
        results.add_outcome(index, outcome);
        regression.on_outcome(results, index);
    }

    #[test]
    fn no_samples_means_no_estimate() {
        let mut regression =
            Regression::with_defaults(Box::new(QuadraticFunction::new(2))).expect("valid");
        assert_eq!(RegressionMapMax::new(&mut regression).max_parameter(), None);
    }

    #[test]
    fn peaked_data_gives_an_interior_maximum() {
        let mut regression =
            Regression::with_defaults(Box::new(QuadraticFunction::new(1))).expect("valid");
        let mut results = Results::new(1);
        for _ in 0..20 {
            for (x, outcome) in [
                (-0.9, Outcome::Loss),
                (-0.45, Outcome::Win),
                (0.0, Outcome::Win),
                (0.45, Outcome::Win),
                (0.9, Outcome::Loss),
                (-0.45, Outcome::Loss),
                (0.45, Outcome::Loss),
            ] {
                feed(&mut regression, &mut results, x, outcome);
            }
        }
        let x = RegressionMapMax::new(&mut regression)
            .max_parameter()
            .expect("estimate");
        assert!(x[0].abs() < 0.2, "estimate {x}");
    }
}
