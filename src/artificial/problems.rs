use super::ArtificialProblem;
use ndarray::{Array1, ArrayView1, array};

/// Grid resolution used when an optimum has no closed form.
const OPTIMUM_GRID: usize = 200_000;

/// `2 ln(2 + x) - 0.8 (2 + x) + 0.5`, peaking at `x = 0.5`.
pub struct Log1d;

impl ArtificialProblem for Log1d {
    fn dimensions(&self) -> usize {
        1
    }

    fn strength(&self, x: ArrayView1<'_, f64>) -> f64 {
        let u = 2.0 + x[0];
        2.0 * u.ln() - 0.8 * u + 0.5
    }

    fn optimal_parameters(&self) -> Array1<f64> {
        array![0.5]
    }
}

/// A cusp: `0.5 - 2 |x - 0.2|^1.5`.
pub struct Power1d;

impl ArtificialProblem for Power1d {
    fn dimensions(&self) -> usize {
        1
    }

    fn strength(&self, x: ArrayView1<'_, f64>) -> f64 {
        0.5 - 2.0 * (x[0] - 0.2).abs().powf(1.5)
    }

    fn optimal_parameters(&self) -> Array1<f64> {
        array![0.2]
    }
}

pub struct Quadratic1d;

impl ArtificialProblem for Quadratic1d {
    fn dimensions(&self) -> usize {
        1
    }

    fn strength(&self, x: ArrayView1<'_, f64>) -> f64 {
        0.6 - 3.0 * (x[0] - 0.3) * (x[0] - 0.3)
    }

    fn optimal_parameters(&self) -> Array1<f64> {
        array![0.3]
    }
}

/// Narrow ridge along the diagonal; curvature across it is ten times the
/// curvature along it.
pub struct IllCorrelated;

impl ArtificialProblem for IllCorrelated {
    fn dimensions(&self) -> usize {
        2
    }

    fn strength(&self, x: ArrayView1<'_, f64>) -> f64 {
        let across = x[0] - x[1];
        let along = x[0] + x[1] - 0.4;
        0.5 - 10.0 * across * across - along * along
    }

    fn optimal_parameters(&self) -> Array1<f64> {
        array![0.2, 0.2]
    }
}

/// Flat tail with a sharp bump at `x = 0.6`.
pub struct Fish1d;

impl ArtificialProblem for Fish1d {
    fn dimensions(&self) -> usize {
        1
    }

    fn strength(&self, x: ArrayView1<'_, f64>) -> f64 {
        let d = x[0] - 0.6;
        2.0 * (-25.0 * d * d).exp() - 1.0
    }

    fn optimal_parameters(&self) -> Array1<f64> {
        array![0.6]
    }
}

/// Several local maxima; the global one is located on a fine grid.
pub struct Complicated1d {
    optimum: f64,
}

impl Complicated1d {
    pub fn new() -> Self {
        let optimum = (0..=OPTIMUM_GRID)
            .map(|i| -1.0 + 2.0 * i as f64 / OPTIMUM_GRID as f64)
            .fold((f64::NEG_INFINITY, 0.0), |(best, at), x| {
                let s = Self::curve(x);
                if s > best { (s, x) } else { (best, at) }
            })
            .1;
        Self { optimum }
    }

    fn curve(x: f64) -> f64 {
        (4.0 * x).sin() + 0.5 * (9.0 * x).cos() - 0.5 * x * x
    }
}

impl Default for Complicated1d {
    fn default() -> Self {
        Self::new()
    }
}

impl ArtificialProblem for Complicated1d {
    fn dimensions(&self) -> usize {
        1
    }

    fn strength(&self, x: ArrayView1<'_, f64>) -> f64 {
        Self::curve(x[0])
    }

    fn optimal_parameters(&self) -> Array1<f64> {
        array![self.optimum]
    }
}

/// `½ sin(3x) eˣ`, maximal where `tan 3x = -3`.
pub struct SinExp;

impl ArtificialProblem for SinExp {
    fn dimensions(&self) -> usize {
        1
    }

    fn strength(&self, x: ArrayView1<'_, f64>) -> f64 {
        0.5 * (3.0 * x[0]).sin() * x[0].exp()
    }

    fn optimal_parameters(&self) -> Array1<f64> {
        array![(std::f64::consts::PI - 3.0f64.atan()) / 3.0]
    }
}

/// Rises linearly up to `x = 0.25`, then drops by 1.75.
pub struct Discontinuous;

impl ArtificialProblem for Discontinuous {
    fn dimensions(&self) -> usize {
        1
    }

    fn strength(&self, x: ArrayView1<'_, f64>) -> f64 {
        if x[0] <= 0.25 { 0.5 + x[0] } else { x[0] - 1.0 }
    }

    fn optimal_parameters(&self) -> Array1<f64> {
        array![0.25]
    }
}

/// `0.5 - Σ |xᵢ - 0.1|`.
pub struct AbsNd {
    dimensions: usize,
}

impl AbsNd {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl ArtificialProblem for AbsNd {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn strength(&self, x: ArrayView1<'_, f64>) -> f64 {
        0.5 - x.iter().map(|v| (v - 0.1).abs()).sum::<f64>()
    }

    fn optimal_parameters(&self) -> Array1<f64> {
        Array1::from_elem(self.dimensions, 0.1)
    }
}

/// Parameters have no effect; every estimate has zero regret.
pub struct ZeroNd {
    dimensions: usize,
}

impl ZeroNd {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl ArtificialProblem for ZeroNd {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn strength(&self, _x: ArrayView1<'_, f64>) -> f64 {
        0.0
    }

    fn optimal_parameters(&self) -> Array1<f64> {
        Array1::zeros(self.dimensions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn closed_form_optima_are_stationary() {
        let h = 1e-6;
        let slope = |p: &dyn ArtificialProblem, x: f64| {
            (p.strength(array![x + h].view()) - p.strength(array![x - h].view())) / (2.0 * h)
        };
        assert_abs_diff_eq!(slope(&Log1d, 0.5), 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(slope(&SinExp, SinExp.optimal_parameters()[0]), 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(slope(&Fish1d, 0.6), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn zero_problem_is_a_coin_flip() {
        let problem = ZeroNd::new(3);
        assert_abs_diff_eq!(problem.proba(array![0.3, -0.2, 0.9].view()), 0.5);
        assert_abs_diff_eq!(problem.optimal_proba(), 0.5);
    }
}
