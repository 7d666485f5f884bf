use crate::linalg::symmetric_eigen;
use crate::observer::{Observer, Results};
use crate::regression::Regression;
use ndarray::{Array1, Array2};

/// Principal axes of the fitted model around its optimum.
#[derive(Clone, Debug, PartialEq)]
pub struct Eigen {
    /// Ascending.
    pub values: Array1<f64>,
    /// One eigenvector per column, matching `values`.
    pub vectors: Array2<f64>,
}

/// Eigen decomposition of the input Hessian of the MAP model, recomputed
/// lazily after any change to the results.
#[derive(Default)]
pub struct EigenSystem {
    cached: Option<Eigen>,
}

impl EigenSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.cached.is_some()
    }

    /// `None` when the model has no constant input Hessian.
    pub fn compute(&mut self, regression: &mut Regression) -> Option<&Eigen> {
        if self.cached.is_none() {
            let map = regression.map().clone();
            let hessian = regression.pf().input_hessian(map.view())?;
            let (values, vectors) = symmetric_eigen(hessian.view());
            self.cached = Some(Eigen { values, vectors });
        }
        self.cached.as_ref()
    }

    pub fn invalidate(&mut self) {
        self.cached = None;
    }
}

impl Observer for EigenSystem {
    fn on_reset(&mut self, _results: &Results) {
        self.invalidate();
    }

    fn on_outcome(&mut self, _results: &Results, _index: usize) {
        self.invalidate();
    }

    fn on_refresh(&mut self, _results: &Results) {
        self.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parametric::{CubicFunction, QuadraticFunction};
    use crate::types::Outcome;
    use ndarray::array;

    fn feed(regression: &mut Regression, results: &mut Results, x: [f64; 2], outcome: Outcome) {
        let index = results.add_sample(array![x[0], x[1]]);
        regression.on_sample(results);
        results.add_outcome(index, outcome);
        regression.on_outcome(results, index);
    }

    #[test]
    fn quadratic_model_gives_sorted_axes_and_invalidates_on_outcome() {
        let mut regression =
            Regression::with_defaults(Box::new(QuadraticFunction::new(2))).expect("valid");
        let mut results = Results::new(2);
        let mut eigen = EigenSystem::new();
        for _ in 0..10 {
            for (x, outcome) in [
                ([0.0, 0.0], Outcome::Win),
                ([0.8, 0.0], Outcome::Loss),
                ([-0.8, 0.0], Outcome::Loss),
                ([0.0, 0.8], Outcome::Win),
                ([0.0, -0.8], Outcome::Loss),
            ] {
                feed(&mut regression, &mut results, x, outcome);
            }
        }
        let values = eigen.compute(&mut regression).expect("quadratic").values.clone();
        assert!(values[0] <= values[1]);
        assert!(eigen.is_valid());
        eigen.on_outcome(&results, 0);
        assert!(!eigen.is_valid());
    }

    #[test]
    fn models_without_a_constant_hessian_have_no_axes() {
        let mut regression =
            Regression::with_defaults(Box::new(CubicFunction::new(2))).expect("valid");
        assert!(EigenSystem::new().compute(&mut regression).is_none());
    }
}
