//! Maximizers for smooth objectives.
//!
//! Every objective implements [`DiffFunction`]. The optimizers never fail:
//! hitting an iteration cap or a degenerate Hessian just ends the call with
//! the best point found, and the returned [`OptimReport`] says what
//! happened.

mod conjugate_gradient;
mod line_search;
mod newton;

pub use conjugate_gradient::{conjugate_gradient, steepest_descent};
pub use line_search::line_opt;
pub use newton::newton;

use ndarray::{ArrayView1, ArrayView2};

pub const NEWTON_THRESHOLD: f64 = 1e-5;
pub const MAX_BETA: f64 = 100.0;
pub const CG_EPSILON: f64 = 1e-10;
pub const MAX_NEWTON_ITERATIONS: usize = 100;
pub const MAX_CG_ITERATIONS: usize = 100;
pub const MAX_SD_ITERATIONS: usize = 100;

/// A scalar objective to maximize, with lazily computed derivatives.
///
/// `gradient` and `negative_hessian` describe the point passed to the most
/// recent `output` call, and are only valid after the matching
/// `compute_gradient` / `compute_hessian`.
pub trait DiffFunction {
    fn dimensions(&self) -> usize;

    fn output(&mut self, x: ArrayView1<'_, f64>) -> f64;

    fn compute_gradient(&mut self) {}

    fn gradient(&self) -> ArrayView1<'_, f64>;

    fn compute_hessian(&mut self) {}

    /// Negated Hessian, `None` when the objective does not provide one.
    fn negative_hessian(&self) -> Option<ArrayView2<'_, f64>> {
        None
    }

    /// Per-coordinate projection applied after each accepted step.
    fn normalize(&self, x: f64) -> f64 {
        x
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Newton,
    ConjugateGradient,
    SteepestDescent,
}

/// Summary of one optimizer call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OptimReport {
    /// Method that produced the final point.
    pub method: Method,
    pub iterations: usize,
    pub converged: bool,
    /// Newton gave up and handed the rest of the call to conjugate gradient.
    pub fell_back: bool,
}

/// Clamps a coordinate to `[-1, 1]`; shared by the input-space objectives.
#[inline]
pub(crate) fn normalize_unit(x: f64) -> f64 {
    crate::linalg::utils::bound(x, 1.0)
}
