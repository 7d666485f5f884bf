use super::DiffFunction;
use ndarray::{Array1, ArrayView1};

const EPSILON: f64 = 1e-5;
const BIG: f64 = 1e4;

fn value_at<F: DiffFunction + ?Sized>(
    f: &mut F,
    x0: ArrayView1<'_, f64>,
    dir: ArrayView1<'_, f64>,
    t: f64,
) -> f64 {
    let point: Array1<f64> = &x0 + &(&dir * t);
    f.output(point.view())
}

/// One-dimensional maximization of `f(x0 + t·dir)` over `t ≥ 0`.
///
/// The first trial step is `t = 1/|dir|`. The step is halved until it beats
/// `t = 0` (returning 0 once it falls below 1e-5), then the far end of the
/// bracket is doubled until it gets worse (returning it outright past 1e4),
/// and one three-point parabolic step refines the bracket.
pub fn line_opt<F: DiffFunction + ?Sized>(
    f: &mut F,
    x0: ArrayView1<'_, f64>,
    dir: ArrayView1<'_, f64>,
) -> f64 {
    let norm2 = dir.dot(&dir);
    let scale = 1.0 / norm2.sqrt();
    if scale.is_infinite() {
        return 0.0;
    }

    let mut tx = [0.0, 0.0, scale];
    let mut tf = [value_at(f, x0, dir, 0.0), 0.0, value_at(f, x0, dir, scale)];

    loop {
        tx[1] = tx[2] * 0.5;
        tf[1] = value_at(f, x0, dir, tx[1]);
        if tx[1] < EPSILON {
            return 0.0;
        }
        if tf[1] <= tf[0] {
            tx[2] = tx[1];
            tf[2] = tf[1];
        } else {
            break;
        }
    }

    while tf[1] <= tf[2] {
        if tx[2] > BIG {
            return tx[2];
        }
        tx[1] = tx[2];
        tf[1] = tf[2];
        tx[2] = tx[1] * 2.0;
        tf[2] = value_at(f, x0, dir, tx[2]);
    }

    let bma = tx[1] - tx[0];
    let bmc = tx[1] - tx[2];
    let fbmfa = tf[1] - tf[0];
    let fbmfc = tf[1] - tf[2];
    let t = tx[1] - 0.5 * (bma * bma * fbmfc - bmc * bmc * fbmfa) / (bma * fbmfc - bmc * fbmfa);
    let refined = value_at(f, x0, dir, t);
    if refined > tf[1] { t } else { tx[1] }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::test_objectives::Paraboloid;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn parabola_is_solved_by_the_interpolation_step() {
        let mut f = Paraboloid::new(array![[2.0]], array![0.3]);
        let t = line_opt(&mut f, array![-0.6].view(), array![4.0].view());
        assert_abs_diff_eq!(-0.6 + t * 4.0, 0.3, epsilon = 1e-12);
    }

    #[test]
    fn zero_direction_and_descent_direction_return_zero() {
        let mut f = Paraboloid::new(array![[1.0, 0.0], [0.0, 1.0]], array![0.0, 0.0]);
        assert_eq!(line_opt(&mut f, array![0.5, 0.5].view(), array![0.0, 0.0].view()), 0.0);
        assert_eq!(line_opt(&mut f, array![0.5, 0.5].view(), array![1.0, 1.0].view()), 0.0);
    }

    #[test]
    fn far_optimum_is_reached_by_doubling() {
        let mut f = Paraboloid::new(array![[1e-6]], array![500.0]);
        let t = line_opt(&mut f, array![0.0].view(), array![1.0].view());
        assert!(t > 100.0, "step {t} did not expand");
    }
}
