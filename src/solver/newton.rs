use super::{
    DiffFunction, MAX_NEWTON_ITERATIONS, Method, NEWTON_THRESHOLD, OptimReport,
    conjugate_gradient,
};
use crate::linalg::{cholesky, cholesky_solve};
use ndarray::Array1;

fn hand_over_to_cg<F: DiffFunction + ?Sized>(
    f: &mut F,
    x: &mut Array1<f64>,
    newton_iterations: usize,
) -> OptimReport {
    let cg = conjugate_gradient(f, x);
    OptimReport {
        method: Method::ConjugateGradient,
        iterations: newton_iterations + cg.iterations,
        converged: cg.converged,
        fell_back: true,
    }
}

/// Newton ascent using the Cholesky factor of the negated Hessian.
///
/// When the negated Hessian does not factor, or a full step fails to improve
/// the objective (or produces NaN), the rest of the call is delegated to
/// [`conjugate_gradient`] from the current point.
pub fn newton<F: DiffFunction + ?Sized>(f: &mut F, x: &mut Array1<f64>) -> OptimReport {
    let n = f.dimensions();
    for iteration in 0..MAX_NEWTON_ITERATIONS {
        let value = f.output(x.view());
        f.compute_gradient();
        f.compute_hessian();

        let mut step = f.gradient().to_owned();
        let factor = match f.negative_hessian() {
            Some(h) => cholesky(h),
            None => {
                log::debug!("newton: objective has no Hessian, using conjugate gradient");
                return hand_over_to_cg(f, x, iteration);
            }
        };
        match factor {
            Ok(l) => cholesky_solve(l.view(), &mut step),
            Err(err) => {
                log::debug!("newton: {err}, switching to conjugate gradient");
                return hand_over_to_cg(f, x, iteration);
            }
        }

        let trial = Array1::from_shape_fn(n, |i| f.normalize(x[i] + step[i]));
        let trial_value = f.output(trial.view());
        if trial_value.is_nan() || trial_value < value {
            log::debug!(
                "newton: step did not improve ({value:.6e} -> {trial_value:.6e}), switching to conjugate gradient"
            );
            return hand_over_to_cg(f, x, iteration + 1);
        }

        *x = trial;
        if trial_value - value < NEWTON_THRESHOLD {
            return OptimReport {
                method: Method::Newton,
                iterations: iteration + 1,
                converged: true,
                fell_back: false,
            };
        }
    }

    log::debug!("newton reached {MAX_NEWTON_ITERATIONS} iterations");
    OptimReport {
        method: Method::Newton,
        iterations: MAX_NEWTON_ITERATIONS,
        converged: false,
        fell_back: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::test_objectives::Paraboloid;
    use approx::assert_abs_diff_eq;
    use ndarray::{ArrayView1, ArrayView2, array};

    #[test]
    fn newton_solves_a_quadratic_in_two_steps() {
        let mut f = Paraboloid::new(array![[2.0, 0.5], [0.5, 1.0]], array![0.4, -0.2]);
        let mut x = Array1::zeros(2);
        let report = newton(&mut f, &mut x);
        assert_eq!(report.method, Method::Newton);
        assert!(report.converged);
        assert!(report.iterations <= 2);
        assert_abs_diff_eq!(x[0], 0.4, epsilon = 1e-12);
        assert_abs_diff_eq!(x[1], -0.2, epsilon = 1e-12);
    }

    #[test]
    fn missing_hessian_falls_back_to_cg() {
        let mut f = Paraboloid::new(array![[1.0, 0.0], [0.0, 4.0]], array![0.1, 0.3]);
        f.with_hessian = false;
        let mut x = Array1::zeros(2);
        let report = newton(&mut f, &mut x);
        assert!(report.fell_back);
        assert_eq!(report.method, Method::ConjugateGradient);
        assert_abs_diff_eq!(x[0], 0.1, epsilon = 1e-4);
        assert_abs_diff_eq!(x[1], 0.3, epsilon = 1e-4);
    }

    /// x ↦ -(x² - 1)², whose Hessian is positive near the origin.
    struct DoubleWell {
        x: f64,
        gradient: Array1<f64>,
        hessian: ndarray::Array2<f64>,
    }

    impl DiffFunction for DoubleWell {
        fn dimensions(&self) -> usize {
            1
        }
        fn output(&mut self, x: ArrayView1<'_, f64>) -> f64 {
            self.x = x[0];
            let s = self.x * self.x - 1.0;
            -s * s
        }
        fn compute_gradient(&mut self) {
            self.gradient[0] = -4.0 * self.x * (self.x * self.x - 1.0);
        }
        fn gradient(&self) -> ArrayView1<'_, f64> {
            self.gradient.view()
        }
        fn compute_hessian(&mut self) {
            self.hessian[[0, 0]] = 12.0 * self.x * self.x - 4.0;
        }
        fn negative_hessian(&self) -> Option<ArrayView2<'_, f64>> {
            Some(self.hessian.view())
        }
    }

    #[test]
    fn indefinite_hessian_switches_method() {
        let mut f = DoubleWell {
            x: 0.0,
            gradient: Array1::zeros(1),
            hessian: ndarray::Array2::zeros((1, 1)),
        };
        let mut x = array![0.2];
        let report = newton(&mut f, &mut x);
        assert!(report.fell_back);
        assert_abs_diff_eq!(x[0], 1.0, epsilon = 1e-3);
    }
}
