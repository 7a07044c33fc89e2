//! Gaussian and Lorentzian peak models with analytic parameter
//! derivatives.
//!
//! Both shapes are parameterized by height, per-axis center position and
//! per-axis full width at half maximum, packed per peak as
//! `[h, p_0 .. p_{N-1}, w_0 .. w_{N-1}]`. A multi-peak model is the sum
//! of its peaks, so each sample's derivative vector is non-zero only
//! inside the owning peak's parameter block.
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::grid::MAX_RANK;

/// `4 ln 2`, the factor that turns a full width at half maximum into a
/// Gaussian exponent scale.
pub(crate) const FWHM_SCALE: f64 = 4.0 * std::f64::consts::LN_2;

/// Model value reported for every sample while any peak center sits
/// outside the fit region, repelling the optimizer back inside.
const OUT_OF_REGION_PENALTY: f64 = 1e20;

/// The peak shape fitted by the iterative fitter.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PeakShapeKind {
    /// `y = h * prod_i exp(-4 ln 2 * dx_i^2 / w_i^2)`
    #[default]
    Gaussian,
    /// `y = h * prod_i w_i^2 / (w_i^2 + 4 dx_i^2)`
    Lorentzian,
}

/// A sum of `npeaks` identical-kind shapes over an N-dimensional region.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MultiPeakModel<'m> {
    pub kind: PeakShapeKind,
    pub rank: usize,
    pub npeaks: usize,
    /// Fit region bounds, used only for the out-of-region repulsion.
    pub first: &'m [i32],
    pub last: &'m [i32],
}

impl MultiPeakModel<'_> {
    /// Number of parameters in the packed vector.
    pub(crate) fn param_len(&self) -> usize {
        self.npeaks * (1 + 2 * self.rank)
    }

    fn block_len(&self) -> usize {
        1 + 2 * self.rank
    }

    /// Whether any peak center has left the region by more than one cell
    /// on some axis.
    fn out_of_region(&self, params: &[f64]) -> bool {
        let stride = self.block_len();
        for k in 0..self.npeaks {
            for axis in 0..self.rank {
                let pos = params[k * stride + 1 + axis];
                if pos < (self.first[axis] - 1) as f64 || pos > self.last[axis] as f64 {
                    return true;
                }
            }
        }
        false
    }

    /// Evaluate the model at `point`, filling `dyda` with the partial
    /// derivative of the model value with respect to every parameter.
    pub(crate) fn evaluate(&self, point: &[i32], params: &[f64], dyda: &mut [f64]) -> f64 {
        dyda.fill(0.0);
        if self.out_of_region(params) {
            return OUT_OF_REGION_PENALTY;
        }

        let stride = self.block_len();
        let mut y = 0.0;
        for k in 0..self.npeaks {
            let base = k * stride;
            let block = &params[base..base + stride];
            match self.kind {
                PeakShapeKind::Gaussian => {
                    y += self.gaussian_peak(point, block, &mut dyda[base..base + stride]);
                }
                PeakShapeKind::Lorentzian => {
                    y += self.lorentzian_peak(point, block, &mut dyda[base..base + stride]);
                }
            }
        }
        y
    }

    fn gaussian_peak(&self, point: &[i32], block: &[f64], dyda: &mut [f64]) -> f64 {
        let height = block[0];
        let mut exponent = 0.0;
        for axis in 0..self.rank {
            let dx = point[axis] as f64 - block[1 + axis];
            let w = block[1 + self.rank + axis];
            exponent += FWHM_SCALE * (dx / w) * (dx / w);
        }
        let shape = (-exponent).exp();
        let peak_val = height * shape;

        dyda[0] = shape;
        for axis in 0..self.rank {
            let dx = point[axis] as f64 - block[1 + axis];
            let w = block[1 + self.rank + axis];
            dyda[1 + axis] = peak_val * 2.0 * FWHM_SCALE * dx / (w * w);
            dyda[1 + self.rank + axis] = peak_val * 2.0 * FWHM_SCALE * dx * dx / (w * w * w);
        }
        peak_val
    }

    fn lorentzian_peak(&self, point: &[i32], block: &[f64], dyda: &mut [f64]) -> f64 {
        let height = block[0];
        let mut denominators = [0.0f64; MAX_RANK];
        let mut shape = 1.0;
        for axis in 0..self.rank {
            let dx = point[axis] as f64 - block[1 + axis];
            let w = block[1 + self.rank + axis];
            let denom = w * w + 4.0 * dx * dx;
            denominators[axis] = denom;
            shape *= w * w / denom;
        }
        let peak_val = height * shape;

        dyda[0] = shape;
        for axis in 0..self.rank {
            let dx = point[axis] as f64 - block[1 + axis];
            let w = block[1 + self.rank + axis];
            let denom = denominators[axis];
            dyda[1 + axis] = peak_val * 8.0 * dx / denom;
            dyda[1 + self.rank + axis] = peak_val * 8.0 * dx * dx / (w * denom);
        }
        peak_val
    }
}
