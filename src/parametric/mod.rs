//! Linear-in-parameters models of a rating as a function of the input point.
//!
//! Every model writes its value as `params · monomials(x)`, so the
//! regression only ever needs the basis expansion plus the prior. The basis
//! layout is fixed per model and deterministic; parameter vectors of two
//! different models are never interchangeable.

mod concave;
mod constant;
mod cubic;
mod gaussian;
mod independent_quadratic;
mod quadratic;

pub use concave::ConcaveFunction;
pub use constant::ConstantFunction;
pub use cubic::CubicFunction;
pub use gaussian::GaussianFunction;
pub use independent_quadratic::IndependentQuadraticFunction;
pub use quadratic::QuadraticFunction;

use crate::solver::{DiffFunction, conjugate_gradient, normalize_unit};
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

/// Prior strength used by models that do not choose their own.
pub const DEFAULT_PRIOR_STRENGTH: f64 = 1e-2;

pub trait ParametricFunction {
    fn dimensions(&self) -> usize;

    fn parameters(&self) -> usize;

    /// Basis expansion of `x`; the model value is `params · monomials(x)`.
    fn monomials(&self, x: ArrayView1<'_, f64>) -> Array1<f64>;

    fn value(&self, params: ArrayView1<'_, f64>, x: ArrayView1<'_, f64>) -> f64 {
        params.dot(&self.monomials(x))
    }

    /// Gradient of the value with respect to the input point.
    fn input_gradient(&self, params: ArrayView1<'_, f64>, x: ArrayView1<'_, f64>) -> Array1<f64>;

    fn prior_strength(&self) -> f64;

    fn set_prior_strength(&mut self, strength: f64);

    /// Mode of the prior, used as the starting point of the MAP search.
    fn prior_params(&self) -> Array1<f64> {
        Array1::zeros(self.parameters())
    }

    /// Log prior density, up to a constant. Gaussian by default.
    fn log_prior(&self, params: ArrayView1<'_, f64>) -> f64 {
        -0.5 * self.prior_strength() * params.dot(&params)
    }

    fn log_prior_gradient(&self, params: ArrayView1<'_, f64>) -> Array1<f64> {
        params.mapv(|p| -self.prior_strength() * p)
    }

    /// Negated Hessian of the log prior.
    fn log_prior_negative_hessian(&self, _params: ArrayView1<'_, f64>) -> Array2<f64> {
        Array2::eye(self.parameters()) * self.prior_strength()
    }

    /// Input point maximizing the value for fixed parameters, `None` when the
    /// model has no usable maximum.
    fn maximum(&self, params: ArrayView1<'_, f64>) -> Option<Array1<f64>> {
        maximize_by_gradient(self, params)
    }

    /// Hessian of the value in input space, for models that have a constant one.
    fn input_hessian(&self, _params: ArrayView1<'_, f64>) -> Option<Array2<f64>> {
        None
    }
}

/// Conjugate-gradient ascent of the model value from the centre of the box.
pub fn maximize_by_gradient<P: ParametricFunction + ?Sized>(
    pf: &P,
    params: ArrayView1<'_, f64>,
) -> Option<Array1<f64>> {
    let mut objective = ParametricObjective::new(pf, params);
    let mut x = Array1::zeros(pf.dimensions());
    let report = conjugate_gradient(&mut objective, &mut x);
    log::trace!("generic maximum search: {report:?}");
    x.iter().all(|v| v.is_finite()).then_some(x)
}

/// The model value at fixed parameters, as a function of the input point.
pub struct ParametricObjective<'a, P: ParametricFunction + ?Sized> {
    pf: &'a P,
    params: Array1<f64>,
    gradient: Array1<f64>,
}

impl<'a, P: ParametricFunction + ?Sized> ParametricObjective<'a, P> {
    pub fn new(pf: &'a P, params: ArrayView1<'_, f64>) -> Self {
        Self {
            pf,
            params: params.to_owned(),
            gradient: Array1::zeros(pf.dimensions()),
        }
    }
}

impl<P: ParametricFunction + ?Sized> DiffFunction for ParametricObjective<'_, P> {
    fn dimensions(&self) -> usize {
        self.pf.dimensions()
    }

    fn output(&mut self, x: ArrayView1<'_, f64>) -> f64 {
        self.gradient = self.pf.input_gradient(self.params.view(), x);
        self.pf.value(self.params.view(), x)
    }

    fn gradient(&self) -> ArrayView1<'_, f64> {
        self.gradient.view()
    }

    fn normalize(&self, x: f64) -> f64 {
        normalize_unit(x)
    }
}

/// Model families selectable by name in configuration files and the CLI.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelKind {
    Quadratic,
    IndependentQuadratic,
    Cubic,
    Gaussian,
    Concave,
    Constant,
}

/// Basis resolution used by the radial and hinge models.
pub const DEFAULT_RESOLUTION: usize = 9;

impl ModelKind {
    pub fn build(self, dimensions: usize) -> Box<dyn ParametricFunction> {
        match self {
            ModelKind::Quadratic => Box::new(QuadraticFunction::new(dimensions)),
            ModelKind::IndependentQuadratic => {
                Box::new(IndependentQuadraticFunction::new(dimensions))
            }
            ModelKind::Cubic => Box::new(CubicFunction::new(dimensions)),
            ModelKind::Gaussian => Box::new(GaussianFunction::new(dimensions, DEFAULT_RESOLUTION)),
            ModelKind::Concave => Box::new(ConcaveFunction::new(dimensions, DEFAULT_RESOLUTION)),
            ModelKind::Constant => Box::new(ConstantFunction::new(dimensions)),
        }
    }
}

/// Index of the coefficient of `x_i · x_j` (`j <= i`) in the quadratic block
/// that follows the constant and linear terms.
#[inline]
pub(crate) fn pair_index(dimensions: usize, i: usize, j: usize) -> usize {
    debug_assert!(j <= i);
    1 + dimensions + i * (i + 1) / 2 + j
}
