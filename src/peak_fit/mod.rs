//! Sub-pixel peak refinement: a fast parabolic interpolator and an
//! iterative Gaussian/Lorentzian least-squares fitter.
//!
//! Both operate on a rectangular fit region of the grid and a list of
//! seed positions, usually the output of
//! [`PeakFinder`](crate::PeakFinder), and produce
//! [`FittedPeak`](crate::FittedPeak) records: height, fractional
//! position and full width at half maximum per axis.
//!
//! [`fit_parabolic`] treats each axis independently through the central
//! three-point cross, which is exact for quadratic profiles and cheap
//! enough to run on every picked peak interactively. [`fit_peaks`]
//! fits the full multi-peak shape model over the region with a damped
//! least-squares iteration and additionally recovers per-parameter
//! uncertainties from the final covariance.
mod lm;
mod shapes;

use log::debug;
use thiserror::Error;

use crate::grid::GridView;
use crate::peak::{FitUncertainty, FittedPeak};
use crate::peak_statistics::{half_height_crossing, sample_along, Parabola3};

use self::lm::{levenberg_marquardt, FitSamples};
use self::shapes::MultiPeakModel;

pub use self::shapes::PeakShapeKind;

/// All the ways peak fitting can fail
#[derive(Debug, Clone, Error)]
pub enum PeakFitError {
    #[error("fit request shape mismatch: {0}")]
    InvalidShape(&'static str),
    #[error("normal-equation matrix is singular")]
    Singular,
    #[error("fit did not converge within {0} iterations")]
    DidNotConverge(usize),
}

/// The axis-aligned region a fit draws its samples from:
/// `first[axis] <= p < last[axis]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FitRegion {
    pub first: Vec<i32>,
    pub last: Vec<i32>,
}

impl FitRegion {
    pub fn new(first: Vec<i32>, last: Vec<i32>) -> Self {
        Self { first, last }
    }

    fn validate(&self, grid: &GridView<'_>) -> Result<(), PeakFitError> {
        let rank = grid.rank();
        if self.first.len() != rank || self.last.len() != rank {
            return Err(PeakFitError::InvalidShape(
                "fit region must have one bound pair per grid axis",
            ));
        }
        for axis in 0..rank {
            let npts = grid.shape()[axis] as i32;
            if self.first[axis] < 0 || self.last[axis] > npts || self.first[axis] >= self.last[axis]
            {
                return Err(PeakFitError::InvalidShape(
                    "fit region does not lie inside the grid",
                ));
            }
        }
        Ok(())
    }
}

/// Hyperparameters for the iterative fitter
#[derive(Debug, Clone)]
pub struct FitSettings {
    /// The maximum number of damped iterations to attempt.
    pub max_iter: usize,
    /// The noise magnitude used for the convergence threshold; estimated
    /// from the region when not given.
    pub noise: Option<f32>,
}

impl FitSettings {
    pub fn max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn noise(mut self, noise: f32) -> Self {
        self.noise = Some(noise);
        self
    }
}

impl Default for FitSettings {
    fn default() -> Self {
        Self {
            max_iter: lm::DEFAULT_MAX_ITER,
            noise: None,
        }
    }
}

/// Refine each seed with an independent three-point parabola per axis.
///
/// Seeds snap to the nearest grid point, clipped one sample inside the
/// region so the stencil stays in bounds. An axis whose profile does not
/// curve downward there keeps its integer coordinate and reports a zero
/// linewidth. The reported height is the apex height of the last axis
/// that fit.
pub fn fit_parabolic(
    grid: &GridView<'_>,
    region: &FitRegion,
    seeds: &[Vec<f32>],
) -> Result<Vec<FittedPeak>, PeakFitError> {
    region.validate(grid)?;
    let rank = grid.rank();
    for axis in 0..rank {
        if region.last[axis] - region.first[axis] < 3 {
            return Err(PeakFitError::InvalidShape(
                "parabolic fitting needs a region at least three samples wide",
            ));
        }
    }

    let mut fitted = Vec::with_capacity(seeds.len());
    for seed in seeds {
        if seed.len() != rank {
            return Err(PeakFitError::InvalidShape(
                "seed positions must have one coordinate per grid axis",
            ));
        }
        let center: Vec<i32> = seed
            .iter()
            .enumerate()
            .map(|(axis, p)| {
                (p.round() as i32).clamp(region.first[axis] + 1, region.last[axis] - 2)
            })
            .collect();

        let mut height = grid.value_at(&center);
        let mut position: Vec<f32> = center.iter().map(|p| *p as f32).collect();
        let mut linewidth = vec![0.0f32; rank];

        for axis in 0..rank {
            let v_left = sample_along(grid, &center, axis, center[axis] - 1);
            let v_middle = sample_along(grid, &center, axis, center[axis]);
            let v_right = sample_along(grid, &center, axis, center[axis] + 1);
            let parabola = Parabola3::from_samples(v_left, v_middle, v_right);
            if !parabola.is_peak() {
                continue;
            }
            let Some(width) = parabola.half_height_width() else {
                continue;
            };
            position[axis] = center[axis] as f32 + parabola.apex_x();
            linewidth[axis] = width;
            height = parabola.apex_height();
        }

        fitted.push(FittedPeak::new(height, position, linewidth));
    }
    Ok(fitted)
}

/// Fit `seeds.len()` peaks of the chosen shape over the region with the
/// damped least-squares engine, returning refined records with
/// per-parameter uncertainties.
pub fn fit_peaks(
    grid: &GridView<'_>,
    region: &FitRegion,
    seeds: &[Vec<f32>],
    kind: PeakShapeKind,
    settings: &FitSettings,
) -> Result<Vec<FittedPeak>, PeakFitError> {
    region.validate(grid)?;
    let rank = grid.rank();
    if seeds.is_empty() {
        return Ok(Vec::new());
    }
    for seed in seeds {
        if seed.len() != rank {
            return Err(PeakFitError::InvalidShape(
                "seed positions must have one coordinate per grid axis",
            ));
        }
    }

    let samples = collect_region_samples(grid, region);
    let params = seed_parameters(grid, seeds, rank);
    let noise = settings
        .noise
        .map(|n| n as f64)
        .unwrap_or_else(|| samples.default_noise());

    let model = MultiPeakModel {
        kind,
        rank,
        npeaks: seeds.len(),
        first: &region.first,
        last: &region.last,
    };
    let fit = levenberg_marquardt(&model, &samples, params, noise, settings.max_iter)?;
    debug!(
        "fit {} {:?} peaks over {} samples in {} iterations, chisq {:e}",
        seeds.len(),
        kind,
        samples.len(),
        fit.iterations,
        fit.chisq
    );

    let stride = 1 + 2 * rank;
    let mut fitted = Vec::with_capacity(seeds.len());
    for k in 0..seeds.len() {
        let block = &fit.params[k * stride..(k + 1) * stride];
        let sigma = &fit.sigmas[k * stride..(k + 1) * stride];
        let mut peak = FittedPeak::new(
            block[0] as f32,
            block[1..1 + rank].iter().map(|p| *p as f32).collect(),
            block[1 + rank..].iter().map(|w| *w as f32).collect(),
        );
        peak.uncertainty = Some(FitUncertainty {
            height: sigma[0] as f32,
            position: sigma[1..1 + rank].iter().map(|s| *s as f32).collect(),
            linewidth: sigma[1 + rank..].iter().map(|s| *s as f32).collect(),
        });
        fitted.push(peak);
    }
    Ok(fitted)
}

/// Flatten the region row-major into paired sample points and heights.
fn collect_region_samples(grid: &GridView<'_>, region: &FitRegion) -> FitSamples {
    let rank = grid.rank();
    let npts: usize = (0..rank)
        .map(|axis| (region.last[axis] - region.first[axis]) as usize)
        .product();
    let mut samples = FitSamples {
        rank,
        points: Vec::with_capacity(npts * rank),
        heights: Vec::with_capacity(npts),
    };

    let mut point = region.first.clone();
    loop {
        samples.points.extend_from_slice(&point);
        samples.heights.push(grid.value_at(&point));
        let mut axis = rank;
        loop {
            if axis == 0 {
                return samples;
            }
            axis -= 1;
            point[axis] += 1;
            if point[axis] < region.last[axis] {
                break;
            }
            point[axis] = region.first[axis];
        }
    }
}

/// Initial parameters per peak: the sample height at the rounded seed,
/// the seed position itself, and the walked half-height width, doubling
/// one side when only one crossing exists.
fn seed_parameters(grid: &GridView<'_>, seeds: &[Vec<f32>], rank: usize) -> Vec<f64> {
    let stride = 1 + 2 * rank;
    let mut params = vec![0.0f64; seeds.len() * stride];
    for (k, seed) in seeds.iter().enumerate() {
        let center: Vec<i32> = seed
            .iter()
            .enumerate()
            .map(|(axis, p)| (p.round() as i32).clamp(0, grid.shape()[axis] as i32 - 1))
            .collect();
        let height = grid.value_at(&center);
        let find_maximum = height >= 0.0;

        let base = k * stride;
        params[base] = height as f64;
        for axis in 0..rank {
            params[base + 1 + axis] = seed[axis] as f64;
            params[base + 1 + rank + axis] =
                seed_linewidth(grid, &center, axis, height, find_maximum) as f64;
        }
    }
    params
}

fn seed_linewidth(
    grid: &GridView<'_>,
    center: &[i32],
    axis: usize,
    height: f32,
    find_maximum: bool,
) -> f32 {
    let forward = half_height_crossing(grid, center, axis, 1, height, find_maximum);
    let backward = half_height_crossing(grid, center, axis, -1, height, find_maximum);
    let width = match (forward, backward) {
        (Some(f), Some(b)) => f - b,
        (Some(f), None) => 2.0 * (f - center[axis] as f32),
        (None, Some(b)) => 2.0 * (center[axis] as f32 - b),
        (None, None) => 1.0,
    };
    if width > 0.0 {
        width
    } else {
        1.0
    }
}
