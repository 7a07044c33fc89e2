//! The Levenberg-Marquardt loop and its Gauss-Jordan inner solver.
//!
//! The normal equations are accumulated in f64 from the models' analytic
//! derivatives. A damped step is solved with full-pivoting Gauss-Jordan
//! elimination, which doubles as the inversion routine for the final
//! covariance extraction.
use log::{debug, trace};

use super::shapes::MultiPeakModel;
use super::PeakFitError;

pub(crate) const DEFAULT_MAX_ITER: usize = 20;
const INITIAL_LAMBDA: f64 = 1e-3;
const LAMBDA_SHRINK: f64 = 0.1;
const LAMBDA_GROW: f64 = 10.0;
/// Consecutive small-improvement iterations required to declare
/// convergence.
const CONVERGED_ITERATIONS: usize = 4;
const PIVOT_EPSILON: f64 = 1e-30;

/// The flattened fit region: one N-dimensional point and one observed
/// height per sample, in row-major region order.
#[derive(Debug, Default, Clone)]
pub(crate) struct FitSamples {
    pub rank: usize,
    pub points: Vec<i32>,
    pub heights: Vec<f32>,
}

impl FitSamples {
    pub(crate) fn len(&self) -> usize {
        self.heights.len()
    }

    #[inline]
    pub(crate) fn point(&self, j: usize) -> &[i32] {
        &self.points[j * self.rank..(j + 1) * self.rank]
    }

    /// The default noise estimate: one twentieth of the strongest
    /// sample magnitude.
    pub(crate) fn default_noise(&self) -> f64 {
        self.heights
            .iter()
            .fold(0.0f32, |acc, y| acc.max(y.abs())) as f64
            * 0.05
    }
}

#[derive(Debug, Clone)]
pub(crate) struct LmFit {
    pub params: Vec<f64>,
    pub sigmas: Vec<f64>,
    pub chisq: f64,
    pub iterations: usize,
}

/// Solve `a * x = b` in place by Gauss-Jordan elimination with full
/// pivoting. On success `a` holds its own inverse and `b` the solution.
pub(crate) fn gauss_jordan(a: &mut [f64], n: usize, b: &mut [f64]) -> Result<(), PeakFitError> {
    debug_assert_eq!(a.len(), n * n);
    debug_assert_eq!(b.len(), n);

    let mut indxr = vec![0usize; n];
    let mut indxc = vec![0usize; n];
    let mut ipiv = vec![false; n];

    for i in 0..n {
        // Search the untouched submatrix for the largest pivot.
        let mut big = 0.0f64;
        let mut irow = 0;
        let mut icol = 0;
        for j in 0..n {
            if ipiv[j] {
                continue;
            }
            for k in 0..n {
                if !ipiv[k] && a[j * n + k].abs() >= big {
                    big = a[j * n + k].abs();
                    irow = j;
                    icol = k;
                }
            }
        }
        ipiv[icol] = true;

        if irow != icol {
            for k in 0..n {
                a.swap(irow * n + k, icol * n + k);
            }
            b.swap(irow, icol);
        }
        indxr[i] = irow;
        indxc[i] = icol;

        let pivot = a[icol * n + icol];
        if pivot.abs() < PIVOT_EPSILON {
            return Err(PeakFitError::Singular);
        }
        let pivinv = 1.0 / pivot;
        a[icol * n + icol] = 1.0;
        for k in 0..n {
            a[icol * n + k] *= pivinv;
        }
        b[icol] *= pivinv;

        for ll in 0..n {
            if ll == icol {
                continue;
            }
            let dum = a[ll * n + icol];
            a[ll * n + icol] = 0.0;
            for k in 0..n {
                a[ll * n + k] -= a[icol * n + k] * dum;
            }
            b[ll] -= b[icol] * dum;
        }
    }

    // Undo the column permutation implied by the pivoting.
    for l in (0..n).rev() {
        if indxr[l] != indxc[l] {
            for k in 0..n {
                a.swap(k * n + indxr[l], k * n + indxc[l]);
            }
        }
    }
    Ok(())
}

/// Accumulate the linearized normal equations and chi-square at `params`.
fn normal_equations(
    model: &MultiPeakModel<'_>,
    samples: &FitSamples,
    params: &[f64],
    dyda: &mut [f64],
) -> (Vec<f64>, Vec<f64>, f64) {
    let m = params.len();
    let mut alpha = vec![0.0f64; m * m];
    let mut beta = vec![0.0f64; m];
    let mut chisq = 0.0f64;

    for j in 0..samples.len() {
        let y_model = model.evaluate(samples.point(j), params, dyda);
        let dy = samples.heights[j] as f64 - y_model;
        for p in 0..m {
            for q in 0..=p {
                alpha[p * m + q] += dyda[p] * dyda[q];
            }
            beta[p] += dy * dyda[p];
        }
        chisq += dy * dy;
    }
    for p in 0..m {
        for q in p + 1..m {
            alpha[p * m + q] = alpha[q * m + p];
        }
    }
    (alpha, beta, chisq)
}

/// Run the damped Gauss-Newton iteration until the chi-square improves
/// by less than `0.1 * noise^2` four times in a row, or `max_iter` is
/// exhausted.
pub(crate) fn levenberg_marquardt(
    model: &MultiPeakModel<'_>,
    samples: &FitSamples,
    mut params: Vec<f64>,
    noise: f64,
    max_iter: usize,
) -> Result<LmFit, PeakFitError> {
    let m = params.len();
    let mut dyda = vec![0.0f64; m];
    let small_improvement = 0.1 * noise * noise;

    let (mut alpha, mut beta, mut chisq) = normal_equations(model, samples, &params, &mut dyda);
    let mut lambda = INITIAL_LAMBDA;
    let mut settled = 0usize;
    let mut converged = false;
    let mut iterations = 0usize;

    for iteration in 0..max_iter {
        iterations = iteration + 1;

        let mut damped = alpha.clone();
        for p in 0..m {
            damped[p * m + p] *= 1.0 + lambda;
        }
        let mut delta = beta.clone();
        gauss_jordan(&mut damped, m, &mut delta)?;

        let trial: Vec<f64> = params
            .iter()
            .zip(delta.iter())
            .map(|(a, d)| a + d)
            .collect();
        let (trial_alpha, trial_beta, trial_chisq) =
            normal_equations(model, samples, &trial, &mut dyda);

        trace!("iteration {iteration}: chisq {chisq:e} -> {trial_chisq:e}, lambda {lambda:e}");

        if trial_chisq <= chisq {
            let improvement = chisq - trial_chisq;
            params = trial;
            alpha = trial_alpha;
            beta = trial_beta;
            chisq = trial_chisq;
            lambda *= LAMBDA_SHRINK;
            settled = if improvement < small_improvement {
                settled + 1
            } else {
                0
            };
        } else {
            lambda *= LAMBDA_GROW;
            settled = 0;
        }
        if settled >= CONVERGED_ITERATIONS {
            converged = true;
            break;
        }
    }

    if !converged {
        return Err(PeakFitError::DidNotConverge(max_iter));
    }
    debug!("converged after {iterations} iterations, chisq {chisq:e}");

    // One undamped linearization at the final parameters; its inverse
    // diagonal scales the parameter uncertainties.
    let mut covar = alpha.clone();
    let mut scratch = beta.clone();
    gauss_jordan(&mut covar, m, &mut scratch)?;
    let sigmas: Vec<f64> = (0..m)
        .map(|p| (chisq * covar[p * m + p].max(0.0)).sqrt())
        .collect();

    Ok(LmFit {
        params,
        sigmas,
        chisq,
        iterations,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::peak_fit::shapes::PeakShapeKind;

    #[test]
    fn test_gauss_jordan_solves_and_inverts() {
        // a = [[2, 1], [1, 3]], b = [5, 10]; x = [1, 3].
        let mut a = vec![2.0, 1.0, 1.0, 3.0];
        let mut b = vec![5.0, 10.0];
        gauss_jordan(&mut a, 2, &mut b).unwrap();
        assert!((b[0] - 1.0).abs() < 1e-12);
        assert!((b[1] - 3.0).abs() < 1e-12);
        // Inverse of [[2,1],[1,3]] is [[0.6,-0.2],[-0.2,0.4]].
        assert!((a[0] - 0.6).abs() < 1e-12);
        assert!((a[1] + 0.2).abs() < 1e-12);
        assert!((a[2] + 0.2).abs() < 1e-12);
        assert!((a[3] - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_gauss_jordan_needs_pivoting() {
        // A zero in the leading position forces a row swap.
        let mut a = vec![0.0, 2.0, 4.0, 1.0];
        let mut b = vec![6.0, 9.0];
        gauss_jordan(&mut a, 2, &mut b).unwrap();
        // x solves 2y = 6, 4x + y = 9.
        assert!((b[0] - 1.5).abs() < 1e-12);
        assert!((b[1] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_gauss_jordan_detects_singular() {
        let mut a = vec![1.0, 2.0, 2.0, 4.0];
        let mut b = vec![1.0, 2.0];
        assert!(matches!(
            gauss_jordan(&mut a, 2, &mut b),
            Err(PeakFitError::Singular)
        ));
    }

    fn gaussian_samples(truth: &[f64], rank: usize, shape: &[i32]) -> FitSamples {
        let model = MultiPeakModel {
            kind: PeakShapeKind::Gaussian,
            rank,
            npeaks: truth.len() / (1 + 2 * rank),
            first: &[0; 2][..rank],
            last: shape,
        };
        let mut dyda = vec![0.0; truth.len()];
        let mut samples = FitSamples {
            rank,
            ..Default::default()
        };
        let mut point = vec![0i32; rank];
        loop {
            samples.points.extend_from_slice(&point);
            samples
                .heights
                .push(model.evaluate(&point, truth, &mut dyda) as f32);
            let mut axis = rank;
            loop {
                if axis == 0 {
                    return samples;
                }
                axis -= 1;
                point[axis] += 1;
                if point[axis] < shape[axis] {
                    break;
                }
                point[axis] = 0;
            }
        }
    }

    #[test]
    fn test_perfect_seed_stays_put() {
        let truth = vec![100.0, 5.0, 6.0, 2.5, 3.0];
        let shape = [11, 13];
        let samples = gaussian_samples(&truth, 2, &shape);
        let model = MultiPeakModel {
            kind: PeakShapeKind::Gaussian,
            rank: 2,
            npeaks: 1,
            first: &[0, 0],
            last: &shape,
        };
        let fit =
            levenberg_marquardt(&model, &samples, truth.clone(), 5.0, DEFAULT_MAX_ITER).unwrap();
        for (fitted, expected) in fit.params.iter().zip(truth.iter()) {
            assert!((fitted - expected).abs() < 1e-4, "{fitted} vs {expected}");
        }
        assert!(fit.chisq < 1e-6);
    }

    #[test]
    fn test_offset_seed_recovers_truth() {
        let truth = vec![100.0, 5.3, 6.4, 2.5, 3.0];
        let shape = [11, 13];
        let samples = gaussian_samples(&truth, 2, &shape);
        let model = MultiPeakModel {
            kind: PeakShapeKind::Gaussian,
            rank: 2,
            npeaks: 1,
            first: &[0, 0],
            last: &shape,
        };
        let seed = vec![90.0, 5.0, 6.0, 2.0, 2.5];
        let fit = levenberg_marquardt(&model, &samples, seed, 5.0, DEFAULT_MAX_ITER).unwrap();
        for (fitted, expected) in fit.params.iter().zip(truth.iter()) {
            assert!((fitted - expected).abs() < 1e-3, "{fitted} vs {expected}");
        }
        assert!(fit.iterations <= 10);
        assert!(fit.chisq < 1e-6);
        assert!(fit.sigmas.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_iteration_cap_reports_no_convergence() {
        let truth = vec![100.0, 5.3, 6.4, 2.5, 3.0];
        let shape = [11, 13];
        let samples = gaussian_samples(&truth, 2, &shape);
        let model = MultiPeakModel {
            kind: PeakShapeKind::Gaussian,
            rank: 2,
            npeaks: 1,
            first: &[0, 0],
            last: &shape,
        };
        let seed = vec![90.0, 5.0, 6.0, 2.0, 2.5];
        assert!(matches!(
            levenberg_marquardt(&model, &samples, seed, 5.0, 2),
            Err(PeakFitError::DidNotConverge(2))
        ));
    }
}
