use super::{
    CG_EPSILON, DiffFunction, MAX_BETA, MAX_CG_ITERATIONS, MAX_SD_ITERATIONS, Method,
    OptimReport, line_opt,
};
use ndarray::Array1;

/// Moves `x` by `t·dir`, projecting each coordinate, and returns the squared
/// length of the move actually made.
fn apply_step<F: DiffFunction + ?Sized>(
    f: &F,
    x: &mut Array1<f64>,
    dir: &Array1<f64>,
    t: f64,
) -> f64 {
    let mut delta2 = 0.0;
    for (xi, &di) in x.iter_mut().zip(dir.iter()) {
        let new = f.normalize(*xi + t * di);
        let delta = new - *xi;
        *xi = new;
        delta2 += delta * delta;
    }
    delta2
}

/// Polak-Ribière conjugate gradient ascent.
///
/// The search direction restarts along the gradient every `dimensions`
/// iterations. Convergence is only checked on those restart iterations.
pub fn conjugate_gradient<F: DiffFunction + ?Sized>(
    f: &mut F,
    x: &mut Array1<f64>,
) -> OptimReport {
    let n = f.dimensions();
    if n == 0 {
        return OptimReport {
            method: Method::ConjugateGradient,
            iterations: 0,
            converged: true,
            fell_back: false,
        };
    }

    let mut previous = Array1::<f64>::zeros(n);
    let mut dir = Array1::<f64>::zeros(n);

    for iteration in 0..MAX_CG_ITERATIONS {
        f.output(x.view());
        f.compute_gradient();
        let g = f.gradient().to_owned();

        let cycle = iteration % n;
        if cycle == 0 {
            previous.assign(&g);
            dir.assign(&g);
        } else {
            let num = g.dot(&(&g - &previous));
            let den = previous.dot(&previous);
            let beta = if den == 0.0 { MAX_BETA } else { (num / den).min(MAX_BETA) };
            dir = &g + &(&dir * beta);
            previous.assign(&g);
        }

        // A zero component would pin that coordinate at a stationary point.
        let k = iteration % n;
        if dir[k] * dir[k] == 0.0 {
            dir[k] = if dir[k] >= 0.0 { 1.0 } else { -1.0 };
        }

        let t = line_opt(f, x.view(), dir.view());
        let delta2 = apply_step(f, x, &dir, t);
        if cycle == 0 && delta2 < CG_EPSILON {
            return OptimReport {
                method: Method::ConjugateGradient,
                iterations: iteration + 1,
                converged: true,
                fell_back: false,
            };
        }
    }

    log::debug!("conjugate gradient reached {MAX_CG_ITERATIONS} iterations");
    OptimReport {
        method: Method::ConjugateGradient,
        iterations: MAX_CG_ITERATIONS,
        converged: false,
        fell_back: false,
    }
}

/// Gradient ascent with a line search along each gradient.
pub fn steepest_descent<F: DiffFunction + ?Sized>(f: &mut F, x: &mut Array1<f64>) -> OptimReport {
    for iteration in 0..MAX_SD_ITERATIONS {
        f.output(x.view());
        f.compute_gradient();
        let g = f.gradient().to_owned();
        let t = line_opt(f, x.view(), g.view());
        if apply_step(f, x, &g, t) < CG_EPSILON {
            return OptimReport {
                method: Method::SteepestDescent,
                iterations: iteration + 1,
                converged: true,
                fell_back: false,
            };
        }
    }
    log::debug!("steepest descent reached {MAX_SD_ITERATIONS} iterations");
    OptimReport {
        method: Method::SteepestDescent,
        iterations: MAX_SD_ITERATIONS,
        converged: false,
        fell_back: false,
    }
}
